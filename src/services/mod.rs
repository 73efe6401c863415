pub mod access;
pub mod auth;
pub mod gc;
pub mod owners;
pub mod publish;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod upstream;
pub mod webhook;

pub use crate::database::DatabaseService;
pub use access::AccessTracker;
pub use auth::AuthService;
pub use gc::GcEngine;
pub use owners::OwnershipService;
pub use publish::{PackageLocks, PublishCoordinator};
pub use queue::WorkQueue;
pub use registry::RegistryService;
pub use storage::LocalStorage;
pub use upstream::{UpstreamFetcher, UpstreamRouter, UpstreamSource};
pub use webhook::WebhookDispatcher;
