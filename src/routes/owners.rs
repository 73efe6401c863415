use crate::error::ApiError;
use crate::models::{AuthenticatedUser, OkResponse};
use crate::routes::packages::package_name;
use crate::services::OwnershipService;
use crate::state::AppState;
use rocket::serde::json::Json;
use rocket::{State, delete, get, put};
use serde_json::{Map, Value, json};

// npm sends scoped names encoded into one segment: /-/package/@scope%2fname/collaborators

#[get("/-/package/<package>/collaborators")]
pub async fn list_collaborators(
    package: &str,
    state: &State<AppState>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let name = package_name(package)?;
    let collaborators = OwnershipService::list(&state.database, &name)?
        .into_iter()
        .map(|owner| {
            let entry = json!({ "name": owner.username, "email": owner.email });
            (owner.username, entry)
        })
        .collect();
    Ok(Json(collaborators))
}

#[put("/-/package/<package>/collaborators/<username>")]
pub async fn add_collaborator(
    package: &str,
    username: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let name = package_name(package)?;
    let owner = OwnershipService::add(&state.database, &name, username, &user)?;
    Ok(Json(json!({ "ok": true, "name": owner.username, "email": owner.email })))
}

#[delete("/-/package/<package>/collaborators/<username>")]
pub async fn remove_collaborator(
    package: &str,
    username: &str,
    user: AuthenticatedUser,
    state: &State<AppState>,
) -> Result<Json<OkResponse>, ApiError> {
    let name = package_name(package)?;
    OwnershipService::remove(&state.database, &name, username, &user)?;
    Ok(Json(OkResponse { ok: true }))
}
