use crate::error::ApiError;
use crate::models::{PackageSummary, SearchHit, SearchResponse, StorageStats};
use crate::state::AppState;
use rocket::serde::json::Json;
use rocket::{State, get};
use serde_json::{Value, json};

#[get("/-/health")]
pub async fn health_check(state: &State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "upstreams": state.router.sources().iter().map(|s| &s.name).collect::<Vec<_>>(),
        "pendingWebhooks": state.webhooks.pending(),
    }))
}

#[get("/-/api/packages")]
pub async fn list_packages(state: &State<AppState>) -> Result<Json<Vec<PackageSummary>>, ApiError> {
    Ok(Json(state.storage.list()?))
}

#[get("/-/api/stats")]
pub async fn storage_stats(state: &State<AppState>) -> Result<Json<StorageStats>, ApiError> {
    Ok(Json(state.storage.stats()?))
}

#[get("/-/api/search?<q>")]
pub async fn search_packages(q: Option<&str>, state: &State<AppState>) -> Result<Json<SearchResponse>, ApiError> {
    let packages: Vec<SearchHit> = state
        .storage
        .search(q.unwrap_or_default())?
        .into_iter()
        .map(SearchHit::from)
        .collect();

    Ok(Json(SearchResponse {
        total: packages.len(),
        packages,
    }))
}
