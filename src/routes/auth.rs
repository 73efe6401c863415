use crate::error::ApiError;
use crate::models::{
    AuthenticatedUser, LoginRequest, NpmUserDocument, NpmUserResponse, OkResponse, ROLE_DEVELOPER,
    RegisterRequest, WebhookEvent, WhoamiResponse,
};
use crate::services::AuthService;
use crate::state::AppState;
use log::{debug, info};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, put};

const COUCHDB_USER_PREFIX: &str = "org.couchdb.user:";

// npm login / adduser - PUT /-/user/org.couchdb.user:<name>
#[put("/-/user/<user_id>", data = "<user_doc>")]
pub async fn npm_login(
    user_id: &str,
    user_doc: Json<NpmUserDocument>,
    state: &State<AppState>,
) -> Result<(Status, Json<NpmUserResponse>), ApiError> {
    let username = user_id
        .strip_prefix(COUCHDB_USER_PREFIX)
        .ok_or_else(|| ApiError::BadRequest("Invalid user ID format".to_string()))?;

    if user_doc.name != username {
        return Err(ApiError::BadRequest("Username mismatch".to_string()));
    }

    let user_doc = user_doc.into_inner();
    if AuthService::get_user_by_username(&state.database, username)?.is_none() {
        if !state.config.allow_registration {
            return Err(ApiError::Forbidden("Registration is disabled".to_string()));
        }

        let email = user_doc
            .email
            .clone()
            .unwrap_or_else(|| format!("{username}@localhost"));
        let user = AuthService::register_user(
            &state.database,
            RegisterRequest {
                name: user_doc.name.clone(),
                email,
                password: user_doc.password.clone(),
                role: None,
            },
            ROLE_DEVELOPER,
        )?;
        info!("Registered npm user {}", user.username);
        state
            .webhooks
            .dispatch_async(
                WebhookEvent::UserCreated,
                serde_json::json!({ "username": user.username, "role": user.role }),
            )
            .await;
    }

    let (user, token) = AuthService::authenticate_user(
        &state.database,
        LoginRequest {
            name: user_doc.name,
            password: user_doc.password,
        },
    )?;
    debug!("Issued token for {}", user.username);

    Ok((
        Status::Created,
        Json(NpmUserResponse {
            ok: true,
            id: user_id.to_string(),
            rev: "1-0".to_string(),
            token,
        }),
    ))
}

#[get("/-/whoami")]
pub async fn npm_whoami(user: AuthenticatedUser) -> Json<WhoamiResponse> {
    Json(WhoamiResponse {
        username: user.username,
    })
}

// npm logout - DELETE /-/user/token/<token>
#[delete("/-/user/token/<token>")]
pub async fn npm_logout(token: &str, state: &State<AppState>) -> Result<Json<OkResponse>, ApiError> {
    let revoked = AuthService::revoke_token(&state.database, token)?;
    Ok(Json(OkResponse { ok: revoked }))
}
