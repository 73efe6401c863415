use crate::error::ApiError;
use rocket::serde::{Deserialize, Serialize};
use rocket::{
    State,
    http::Status,
    request::{FromRequest, Outcome, Request},
};

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

// npm login uses a CouchDB-style user document
#[derive(Deserialize, Debug)]
pub struct NpmUserDocument {
    pub name: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct NpmUserResponse {
    pub ok: bool,
    pub id: String,
    pub rev: String,
    pub token: String,
}

#[derive(Serialize, Debug)]
pub struct WhoamiResponse {
    pub username: String,
}

#[derive(Serialize, Debug)]
pub struct OkResponse {
    pub ok: bool,
}

/// Identity resolved from a `Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
    pub user_id: i32,
    pub is_admin: bool,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        use crate::services::AuthService;
        use crate::state::AppState;

        let state = match request.guard::<&State<AppState>>().await {
            Outcome::Success(state) => state,
            _ => {
                return Outcome::Error((
                    Status::InternalServerError,
                    ApiError::InternalServerError("Application state unavailable".to_string()),
                ));
            }
        };

        let Some(auth_value) = request.headers().get_one("Authorization") else {
            return Outcome::Error((
                Status::Unauthorized,
                ApiError::Unauthorized("Authorization header required".to_string()),
            ));
        };

        let Some(token) = auth_value.strip_prefix("Bearer ") else {
            return Outcome::Error((
                Status::Unauthorized,
                ApiError::Unauthorized("Invalid authorization format".to_string()),
            ));
        };

        match AuthService::validate_token(&state.database, token) {
            Ok(user) => Outcome::Success(AuthenticatedUser {
                is_admin: user.is_admin(),
                username: user.username,
                user_id: user.id,
            }),
            Err(e) => Outcome::Error((Status::Unauthorized, e)),
        }
    }
}

/// An authenticated user holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<AuthenticatedUser>().await {
            Outcome::Success(user) if user.is_admin => Outcome::Success(AdminUser(user)),
            Outcome::Success(user) => Outcome::Error((
                Status::Forbidden,
                ApiError::Forbidden(format!("User {} is not an administrator", user.username)),
            )),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}
