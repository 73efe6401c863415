use super::connection::{DbPool, connect};
use crate::models::package::*;
use crate::schema::{access_ledger, package_deprecations, package_owners, package_versions, packages};
use diesel::prelude::*;

/// Package record operations
pub struct PackageOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> PackageOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Returns the existing row for `name` or inserts a new one.
    pub fn create_or_get_package(
        &self,
        name: &str,
        description: Option<String>,
        latest: Option<String>,
        is_private: bool,
    ) -> Result<Package, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::insert_or_ignore_into(packages::table)
            .values(&NewPackage::new(
                name.to_string(),
                description,
                latest,
                is_private,
            ))
            .execute(&mut conn)?;

        packages::table
            .filter(packages::name.eq(name))
            .select(Package::as_select())
            .first(&mut conn)
    }

    /// Upserts the package row and refreshes its description and latest version.
    pub fn upsert_package(
        &self,
        name: &str,
        description: Option<String>,
        latest: Option<String>,
        is_private: bool,
    ) -> Result<Package, diesel::result::Error> {
        let existing = self.create_or_get_package(name, description.clone(), latest.clone(), is_private)?;
        let mut conn = connect(self.pool)?;

        let changes = UpdatePackage {
            description: description.filter(|d| !d.is_empty()),
            latest,
            updated_at: chrono::Utc::now().naive_utc(),
        };

        diesel::update(packages::table.filter(packages::id.eq(existing.id)))
            .set(&changes)
            .returning(Package::as_returning())
            .get_result(&mut conn)
    }

    pub fn get_package_by_name(&self, name: &str) -> Result<Option<Package>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        packages::table
            .filter(packages::name.eq(name))
            .select(Package::as_select())
            .first(&mut conn)
            .optional()
    }

    pub fn count_packages(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = connect(self.pool)?;
        packages::table.count().get_result(&mut conn)
    }

    /// Removes a package and every row that refers to it in one transaction.
    pub fn delete_package_rows(&self, name: &str) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        conn.transaction(|conn| {
            diesel::delete(package_versions::table.filter(package_versions::package_name.eq(name)))
                .execute(conn)?;
            diesel::delete(package_owners::table.filter(package_owners::package_name.eq(name)))
                .execute(conn)?;
            diesel::delete(
                package_deprecations::table.filter(package_deprecations::package_name.eq(name)),
            )
            .execute(conn)?;
            diesel::delete(access_ledger::table.filter(access_ledger::package_name.eq(name)))
                .execute(conn)?;
            diesel::delete(packages::table.filter(packages::name.eq(name))).execute(conn)?;
            Ok(())
        })
    }
}
