use crate::error::ApiError;
use crate::models::{
    AdminUser, Deprecation, GcAnalysis, GcPolicy, GcRunReport, GcRunRequest, GcStats,
    NewDeprecation, NewWebhook, OwnerInfo, ROLE_ADMIN, ROLE_DEVELOPER, RegisterRequest,
    UpdateWebhook, User, Webhook, WebhookEvent, WebhookRequest, WebhookUpdateRequest,
};
use crate::routes::packages::package_name;
use crate::services::{AuthService, LocalStorage};
use crate::state::AppState;
use log::info;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{FromForm, State, delete, get, post, put};
use serde_json::{Value, json};

#[derive(FromForm, Debug, Default)]
pub struct GcQuery {
    pub days: Option<i64>,
    #[field(name = "minVersions")]
    pub min_versions: Option<i64>,
    #[field(name = "includeDeprecated")]
    pub include_deprecated: Option<bool>,
    #[field(name = "minPackageAgeDays")]
    pub min_package_age_days: Option<i64>,
}

impl From<GcQuery> for GcPolicy {
    fn from(query: GcQuery) -> Self {
        GcPolicy::from(GcRunRequest {
            dry_run: Some(true),
            max_inactive_days: query.days.unwrap_or_default(),
            min_versions_to_keep: query.min_versions.unwrap_or_default(),
            include_deprecated: query.include_deprecated.unwrap_or_default(),
            min_package_age_days: query.min_package_age_days.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct DeprecateRequest {
    #[serde(default)]
    pub version: Option<String>,
    pub reason: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRequest {
    pub username: String,
    #[serde(default = "default_can_publish")]
    pub can_publish: bool,
}

fn default_can_publish() -> bool {
    true
}

#[derive(Serialize, Debug)]
pub struct WebhookTestResponse {
    pub ok: bool,
    pub status: u16,
}

/// Resolves an admin path parameter to a package the registry knows about.
fn known_package(raw: &str, state: &AppState) -> Result<String, ApiError> {
    let name = package_name(raw)?;
    LocalStorage::validate_package_name(&name)?;

    let stored = state.storage.has(&name);
    if !stored && state.database.get_package_by_name(&name)?.is_none() {
        return Err(ApiError::NotFound(format!("Package '{name}' not found")));
    }
    if stored {
        let is_private = state
            .storage
            .get_metadata(&name)
            .map(|m| m.get(crate::services::registry::UPSTREAM_KEY).is_none())
            .unwrap_or(true);
        state.database.create_or_get_package(&name, None, is_private)?;
    }
    Ok(name)
}

// Garbage collection

#[get("/-/api/admin/gc/stats")]
pub async fn gc_stats(_admin: AdminUser, state: &State<AppState>) -> Result<Json<GcStats>, ApiError> {
    Ok(Json(state.gc.stats()?))
}

#[get("/-/api/admin/gc/analyze?<query..>")]
pub async fn gc_analyze(
    query: GcQuery,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<GcAnalysis>, ApiError> {
    Ok(Json(state.gc.analyze(&GcPolicy::from(query))?))
}

#[post("/-/api/admin/gc/run", data = "<request>")]
pub async fn gc_run(
    request: Json<GcRunRequest>,
    admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<GcRunReport>, ApiError> {
    let policy = GcPolicy::from(request.into_inner());
    info!("GC run requested by {} (dry run: {})", admin.0.username, policy.dry_run);
    Ok(Json(state.gc.run(&policy)?))
}

// Deprecation

#[post("/-/api/admin/packages/<package>/deprecate", data = "<request>")]
pub async fn deprecate_package(
    package: &str,
    request: Json<DeprecateRequest>,
    admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Deprecation>, ApiError> {
    let name = known_package(package, state)?;
    let request = request.into_inner();
    if request.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("A deprecation reason is required".to_string()));
    }

    let deprecation = state.database.deprecate(&NewDeprecation::new(
        name,
        request.version.unwrap_or_default(),
        request.reason,
        admin.0.username,
    ))?;
    Ok(Json(deprecation))
}

#[delete("/-/api/admin/packages/<package>/deprecate?<version>")]
pub async fn undeprecate_package(
    package: &str,
    version: Option<&str>,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let name = package_name(package)?;
    let removed = state.database.undeprecate(&name, version)?;
    Ok(Json(json!({ "ok": true, "removed": removed })))
}

// Ownership

#[get("/-/api/admin/packages/<package>/owners")]
pub async fn list_owners(
    package: &str,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Vec<OwnerInfo>>, ApiError> {
    let name = package_name(package)?;
    Ok(Json(state.database.get_owner_details(&name)?))
}

#[post("/-/api/admin/packages/<package>/owners", data = "<request>")]
pub async fn add_owner(
    package: &str,
    request: Json<OwnerRequest>,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Vec<OwnerInfo>>, ApiError> {
    let name = known_package(package, state)?;
    let user = AuthService::get_user_by_username(&state.database, &request.username)?
        .ok_or_else(|| ApiError::NotFound(format!("User '{}' not found", request.username)))?;

    state.database.set_owner(&name, user.id, request.can_publish)?;
    Ok(Json(state.database.get_owner_details(&name)?))
}

#[delete("/-/api/admin/packages/<package>/owners/<username>")]
pub async fn remove_owner(
    package: &str,
    username: &str,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Vec<OwnerInfo>>, ApiError> {
    let name = package_name(package)?;
    let user = AuthService::get_user_by_username(&state.database, username)?
        .ok_or_else(|| ApiError::NotFound(format!("User '{username}' not found")))?;

    if !state.database.remove_owner(&name, user.id)? {
        return Err(ApiError::NotFound(format!("{username} does not own {name}")));
    }
    Ok(Json(state.database.get_owner_details(&name)?))
}

// Users

#[post("/-/api/admin/users", data = "<request>")]
pub async fn create_user(
    request: Json<RegisterRequest>,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<(Status, Json<User>), ApiError> {
    let request = request.into_inner();
    let role = request.role.clone().unwrap_or_else(|| ROLE_DEVELOPER.to_string());
    if role != ROLE_ADMIN && role != ROLE_DEVELOPER {
        return Err(ApiError::BadRequest(format!("Unknown role '{role}'")));
    }

    let user = AuthService::register_user(&state.database, request, &role)?;
    state
        .webhooks
        .dispatch_async(
            WebhookEvent::UserCreated,
            json!({ "username": user.username, "role": user.role }),
        )
        .await;
    Ok((Status::Created, Json(user)))
}

#[delete("/-/api/admin/users/<username>")]
pub async fn delete_user(
    username: &str,
    admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if admin.0.username == username {
        return Err(ApiError::BadRequest("Administrators cannot delete themselves".to_string()));
    }
    if !AuthService::delete_user(&state.database, username)? {
        return Err(ApiError::NotFound(format!("User '{username}' not found")));
    }

    state
        .webhooks
        .dispatch_async(
            WebhookEvent::UserDeleted,
            json!({ "username": username, "operator": admin.0.username }),
        )
        .await;
    Ok(Json(json!({ "ok": true })))
}

// Webhooks

fn validate_webhook_url(url: &str) -> Result<(), ApiError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Webhook URL '{url}' must be http or https")))
    }
}

#[get("/-/api/admin/webhooks")]
pub async fn list_webhooks(
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Vec<Webhook>>, ApiError> {
    Ok(Json(state.database.list_webhooks()?))
}

#[post("/-/api/admin/webhooks", data = "<request>")]
pub async fn create_webhook(
    request: Json<WebhookRequest>,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<(Status, Json<Webhook>), ApiError> {
    validate_webhook_url(&request.url)?;
    let webhook = state
        .database
        .create_webhook(&NewWebhook::from_request(request.into_inner()))?;
    info!("Created webhook {} -> {}", webhook.id, webhook.url);
    Ok((Status::Created, Json(webhook)))
}

#[put("/-/api/admin/webhooks/<id>", data = "<request>")]
pub async fn update_webhook(
    id: i32,
    request: Json<WebhookUpdateRequest>,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Webhook>, ApiError> {
    if let Some(url) = request.url.as_deref() {
        validate_webhook_url(url)?;
    }

    let changes = UpdateWebhook::from(request.into_inner());
    let updated = if changes.is_empty() {
        state.database.get_webhook(id)?
    } else {
        state.database.update_webhook(id, &changes)?
    };

    updated
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Webhook {id} not found")))
}

#[delete("/-/api/admin/webhooks/<id>")]
pub async fn delete_webhook(
    id: i32,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<Value>, ApiError> {
    if !state.database.delete_webhook(id)? {
        return Err(ApiError::NotFound(format!("Webhook {id} not found")));
    }
    Ok(Json(json!({ "ok": true })))
}

#[post("/-/api/admin/webhooks/<id>/test")]
pub async fn test_webhook(
    id: i32,
    _admin: AdminUser,
    state: &State<AppState>,
) -> Result<Json<WebhookTestResponse>, ApiError> {
    let webhook = state
        .database
        .get_webhook(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Webhook {id} not found")))?;

    let status = state.webhooks.send_test(&webhook).await?;
    Ok(Json(WebhookTestResponse {
        ok: (200..300).contains(&status),
        status,
    }))
}
