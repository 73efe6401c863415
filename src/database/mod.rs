//! Database access for the registry
//!
//! - `connection`: pool construction, SQLite pragmas and embedded migrations
//! - `packages`, `versions`, `package_owners`, `deprecations`, `access_ledger`, `webhooks`:
//!   repository structs returning immutable value structs
//! - `service`: `DatabaseService`, the facade used by the rest of the crate

pub mod access_ledger;
pub mod connection;
pub mod deprecations;
pub mod package_owners;
pub mod packages;
pub mod service;
pub mod versions;
pub mod webhooks;

pub use connection::{DbConnection, DbPool, MIGRATIONS};
pub use service::DatabaseService;

pub use access_ledger::AccessLedgerOperations;
pub use deprecations::DeprecationOperations;
pub use package_owners::OwnerOperations;
pub use packages::PackageOperations;
pub use versions::VersionOperations;
pub use webhooks::WebhookOperations;
