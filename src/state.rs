use crate::config::AppConfig;
use crate::database::DatabaseService;
use crate::services::{
    AccessTracker, GcEngine, LocalStorage, PublishCoordinator, UpstreamFetcher, UpstreamRouter,
    WebhookDispatcher,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<LocalStorage>,
    pub database: Arc<DatabaseService>,
    pub router: Arc<UpstreamRouter>,
    pub fetcher: Arc<UpstreamFetcher>,
    pub publisher: Arc<PublishCoordinator>,
    pub gc: Arc<GcEngine>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub access: Arc<AccessTracker>,
}
