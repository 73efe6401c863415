use rocket::http::{ContentType, Status};
use rocket::response::{Responder, Response};
use rocket::Request;
use std::io::Cursor;

/// Maximum number of payload bytes kept on an integrity failure.
pub const EXCERPT_LIMIT: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    /// Malformed request body or an illegal package/file name.
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream {upstream} unavailable: {message}")]
    UpstreamUnavailable {
        upstream: String,
        status: Option<u16>,
        message: String,
    },
    #[error("{message} (payload starts with: {excerpt:?})")]
    Integrity { message: String, excerpt: String },
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("database error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn integrity(message: impl Into<String>, payload: &[u8]) -> Self {
        ApiError::Integrity {
            message: message.into(),
            excerpt: excerpt(payload),
        }
    }

    /// Upstream and transport problems may succeed on a later attempt, the rest will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::UpstreamUnavailable { .. } | ApiError::Integrity { .. }
        )
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::UpstreamUnavailable { .. } => Status::BadGateway,
            ApiError::Integrity { .. } => Status::BadGateway,
            ApiError::StorageError(_) => Status::InternalServerError,
            ApiError::DatabaseError(_) => Status::InternalServerError,
            ApiError::InternalServerError(_) => Status::InternalServerError,
        }
    }
}

/// Lossy UTF-8 rendering of at most `EXCERPT_LIMIT` bytes.
pub fn excerpt(payload: &[u8]) -> String {
    let end = payload.len().min(EXCERPT_LIMIT);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() }).to_string();

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::StorageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_excerpt_is_bounded() {
        let payload = vec![b'x'; 10_000];
        match ApiError::integrity("bad json", &payload) {
            ApiError::Integrity { excerpt, .. } => assert_eq!(excerpt.len(), EXCERPT_LIMIT),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_retryable_kinds() {
        let upstream = ApiError::UpstreamUnavailable {
            upstream: "npmjs".to_string(),
            status: Some(503),
            message: "returned status 503".to_string(),
        };
        assert!(upstream.is_retryable());
        assert_eq!(upstream.status(), Status::BadGateway);
        assert!(!ApiError::Conflict("exists".to_string()).is_retryable());
        assert!(!ApiError::BadRequest("bad name".to_string()).is_retryable());
    }
}
