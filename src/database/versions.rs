use super::connection::{DbPool, connect};
use crate::models::package::*;
use crate::schema::package_versions;
use diesel::prelude::*;

/// Package version operations
pub struct VersionOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> VersionOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Inserts version rows, skipping versions that are already recorded.
    pub fn record_versions(
        &self,
        versions: &[NewPackageVersion],
    ) -> Result<usize, diesel::result::Error> {
        if versions.is_empty() {
            return Ok(0);
        }

        let mut conn = connect(self.pool)?;

        conn.transaction(|conn| {
            let mut inserted = 0;
            for version in versions {
                inserted += diesel::insert_or_ignore_into(package_versions::table)
                    .values(version)
                    .execute(conn)?;
            }
            Ok(inserted)
        })
    }

    pub fn get_versions(&self, package_name: &str) -> Result<Vec<PackageVersion>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        package_versions::table
            .filter(package_versions::package_name.eq(package_name))
            .order(package_versions::created_at.asc())
            .select(PackageVersion::as_select())
            .load(&mut conn)
    }

    pub fn count_versions(&self, package_name: &str) -> Result<i64, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        package_versions::table
            .filter(package_versions::package_name.eq(package_name))
            .count()
            .get_result(&mut conn)
    }

    pub fn count_all_versions(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = connect(self.pool)?;
        package_versions::table.count().get_result(&mut conn)
    }
}
