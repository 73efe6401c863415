pub mod config;
pub mod database;
pub mod error;
pub mod fairings;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod state;

use log::{error, info};
use rocket::Config;
use rocket::data::{Limits, ToByteUnit};
use rocket_cors::{AllowedOrigins, CorsOptions};
use std::sync::Arc;

pub use config::AppConfig;
pub use error::ApiError;
pub use fairings::{BackgroundWorkers, RequestLogger};
pub use services::DatabaseService;
pub use state::AppState;

use services::{
    AccessTracker, AuthService, GcEngine, LocalStorage, PublishCoordinator, UpstreamFetcher,
    UpstreamRouter, WebhookDispatcher,
};

/// Wires the store, database and background services for `config`.
pub fn build_state(config: AppConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let storage = Arc::new(LocalStorage::new(&config.storage_dir)?);

    if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let database = Arc::new(DatabaseService::new(&config.database_url)?);

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        AuthService::ensure_admin(&database, username, password)?;
    }

    let router = Arc::new(UpstreamRouter::new(&config.upstreams));
    let fetcher = Arc::new(UpstreamFetcher::new()?);
    let webhooks = Arc::new(WebhookDispatcher::new(Arc::clone(&database), &config.webhook)?);
    let publisher = Arc::new(PublishCoordinator::new(
        Arc::clone(&storage),
        Arc::clone(&database),
        Arc::clone(&webhooks),
    ));
    let gc = Arc::new(GcEngine::new(Arc::clone(&storage), Arc::clone(&database)));
    let access = Arc::new(AccessTracker::new(config.access_queue_capacity));

    info!(
        "Registry state ready: {} upstream(s), store at {}",
        router.sources().len(),
        storage.root().display()
    );

    Ok(AppState {
        config,
        storage,
        database,
        router,
        fetcher,
        publisher,
        gc,
        webhooks,
        access,
    })
}

pub fn build_rocket(state: AppState) -> Result<rocket::Rocket<rocket::Build>, Box<dyn std::error::Error>> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .to_cors()?;

    let rocket_config = Config {
        port: state.config.port,
        address: state.config.host.parse()?,
        // publish documents carry base64 tarballs
        limits: Limits::default().limit("json", 100.mebibytes()),
        ..Config::default()
    };

    Ok(rocket::custom(&rocket_config)
        .manage(state)
        .attach(cors)
        .attach(RequestLogger)
        .attach(BackgroundWorkers)
        .mount("/", routes::get_routes()))
}

pub fn create_rocket() -> Result<rocket::Rocket<rocket::Build>, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    let state = build_state(config).inspect_err(|e| error!("Failed to initialize registry: {e}"))?;
    build_rocket(state)
}
