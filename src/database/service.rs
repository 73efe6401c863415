use super::access_ledger::AccessLedgerOperations;
use super::connection::{DbConnection, DbPool, create_pool, get_connection_with_retry};
use super::deprecations::DeprecationOperations;
use super::package_owners::OwnerOperations;
use super::packages::PackageOperations;
use super::versions::VersionOperations;
use super::webhooks::WebhookOperations;
use crate::models::*;
use chrono::NaiveDateTime;

/// Facade over the repository structs; every method returns owned value structs.
#[derive(Debug)]
pub struct DatabaseService {
    pub pool: DbPool,
}

impl DatabaseService {
    pub fn new(database_url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = create_pool(database_url)?;
        Ok(Self { pool })
    }

    pub fn get_connection(&self) -> Result<DbConnection, diesel::r2d2::Error> {
        get_connection_with_retry(&self.pool)
    }

    // Package operations
    pub fn create_or_get_package(
        &self,
        name: &str,
        description: Option<String>,
        is_private: bool,
    ) -> Result<Package, diesel::result::Error> {
        PackageOperations::new(&self.pool).create_or_get_package(name, description, None, is_private)
    }

    pub fn upsert_package(
        &self,
        name: &str,
        description: Option<String>,
        latest: Option<String>,
        is_private: bool,
    ) -> Result<Package, diesel::result::Error> {
        PackageOperations::new(&self.pool).upsert_package(name, description, latest, is_private)
    }

    pub fn get_package_by_name(&self, name: &str) -> Result<Option<Package>, diesel::result::Error> {
        PackageOperations::new(&self.pool).get_package_by_name(name)
    }

    pub fn count_packages(&self) -> Result<i64, diesel::result::Error> {
        PackageOperations::new(&self.pool).count_packages()
    }

    pub fn delete_package_rows(&self, name: &str) -> Result<(), diesel::result::Error> {
        PackageOperations::new(&self.pool).delete_package_rows(name)
    }

    // Version operations
    pub fn record_versions(&self, versions: &[NewPackageVersion]) -> Result<usize, diesel::result::Error> {
        VersionOperations::new(&self.pool).record_versions(versions)
    }

    pub fn get_versions(&self, package_name: &str) -> Result<Vec<PackageVersion>, diesel::result::Error> {
        VersionOperations::new(&self.pool).get_versions(package_name)
    }

    pub fn count_versions(&self, package_name: &str) -> Result<i64, diesel::result::Error> {
        VersionOperations::new(&self.pool).count_versions(package_name)
    }

    pub fn count_all_versions(&self) -> Result<i64, diesel::result::Error> {
        VersionOperations::new(&self.pool).count_all_versions()
    }

    // Ownership operations
    pub fn get_owners(&self, package_name: &str) -> Result<Vec<PackageOwner>, diesel::result::Error> {
        OwnerOperations::new(&self.pool).get_owners(package_name)
    }

    pub fn get_owner_details(&self, package_name: &str) -> Result<Vec<OwnerInfo>, diesel::result::Error> {
        OwnerOperations::new(&self.pool).get_owner_details(package_name)
    }

    pub fn add_owner(
        &self,
        package_name: &str,
        user_id: i32,
        can_publish: bool,
    ) -> Result<bool, diesel::result::Error> {
        OwnerOperations::new(&self.pool).add_owner(package_name, user_id, can_publish)
    }

    pub fn set_owner(
        &self,
        package_name: &str,
        user_id: i32,
        can_publish: bool,
    ) -> Result<(), diesel::result::Error> {
        OwnerOperations::new(&self.pool).set_owner(package_name, user_id, can_publish)
    }

    pub fn remove_owner(&self, package_name: &str, user_id: i32) -> Result<bool, diesel::result::Error> {
        OwnerOperations::new(&self.pool).remove_owner(package_name, user_id)
    }

    // Deprecation operations
    pub fn deprecate(&self, deprecation: &NewDeprecation) -> Result<Deprecation, diesel::result::Error> {
        DeprecationOperations::new(&self.pool).deprecate(deprecation)
    }

    pub fn undeprecate(&self, package_name: &str, version: Option<&str>) -> Result<usize, diesel::result::Error> {
        DeprecationOperations::new(&self.pool).undeprecate(package_name, version)
    }

    pub fn is_deprecated(&self, package_name: &str) -> Result<bool, diesel::result::Error> {
        DeprecationOperations::new(&self.pool).is_deprecated(package_name)
    }

    pub fn get_deprecations(&self, package_name: &str) -> Result<Vec<Deprecation>, diesel::result::Error> {
        DeprecationOperations::new(&self.pool).get_deprecations(package_name)
    }

    pub fn count_deprecated_packages(&self) -> Result<i64, diesel::result::Error> {
        DeprecationOperations::new(&self.pool).count_deprecated_packages()
    }

    // Access ledger operations
    /// Records a read of `package_name`, creating its package row if this is the first sighting.
    pub fn record_access(&self, package_name: &str) -> Result<(), diesel::result::Error> {
        self.create_or_get_package(package_name, None, false)?;
        AccessLedgerOperations::new(&self.pool).record_access(package_name)
    }

    pub fn ensure_ledger_entry(&self, package_name: &str) -> Result<(), diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).ensure_entry(package_name)
    }

    pub fn get_ledger_entry(&self, package_name: &str) -> Result<Option<AccessLedgerEntry>, diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).get_entry(package_name)
    }

    pub fn inactive_since(&self, cutoff: NaiveDateTime) -> Result<Vec<AccessLedgerEntry>, diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).inactive_since(cutoff)
    }

    pub fn set_marked_for_gc(&self, package_name: &str, marked: bool) -> Result<(), diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).set_marked(package_name, marked)
    }

    pub fn marked_for_gc(&self) -> Result<Vec<AccessLedgerEntry>, diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).marked_entries()
    }

    pub fn set_ledger_timestamps(
        &self,
        package_name: &str,
        last_accessed_at: Option<NaiveDateTime>,
        created_at: NaiveDateTime,
    ) -> Result<(), diesel::result::Error> {
        AccessLedgerOperations::new(&self.pool).set_timestamps(package_name, last_accessed_at, created_at)
    }

    // Webhook operations
    pub fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, diesel::result::Error> {
        WebhookOperations::new(&self.pool).create_webhook(webhook)
    }

    pub fn list_webhooks(&self) -> Result<Vec<Webhook>, diesel::result::Error> {
        WebhookOperations::new(&self.pool).list_webhooks()
    }

    pub fn enabled_webhooks(&self) -> Result<Vec<Webhook>, diesel::result::Error> {
        WebhookOperations::new(&self.pool).enabled_webhooks()
    }

    pub fn get_webhook(&self, id: i32) -> Result<Option<Webhook>, diesel::result::Error> {
        WebhookOperations::new(&self.pool).get_webhook(id)
    }

    pub fn update_webhook(&self, id: i32, changes: &UpdateWebhook) -> Result<Option<Webhook>, diesel::result::Error> {
        WebhookOperations::new(&self.pool).update_webhook(id, changes)
    }

    pub fn delete_webhook(&self, id: i32) -> Result<bool, diesel::result::Error> {
        WebhookOperations::new(&self.pool).delete_webhook(id)
    }

    pub fn mark_webhook_delivered(&self, id: i32) -> Result<(), diesel::result::Error> {
        WebhookOperations::new(&self.pool).mark_delivered(id)
    }
}
