use super::connection::{DbPool, connect};
use crate::models::package::*;
use crate::schema::package_deprecations;
use diesel::prelude::*;
use diesel::upsert::excluded;

/// Package deprecation operations
pub struct DeprecationOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> DeprecationOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Records a deprecation, replacing the reason and actor of an existing one.
    pub fn deprecate(&self, deprecation: &NewDeprecation) -> Result<Deprecation, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::insert_into(package_deprecations::table)
            .values(deprecation)
            .on_conflict((package_deprecations::package_name, package_deprecations::version))
            .do_update()
            .set((
                package_deprecations::reason.eq(excluded(package_deprecations::reason)),
                package_deprecations::deprecated_by.eq(excluded(package_deprecations::deprecated_by)),
                package_deprecations::deprecated_at.eq(excluded(package_deprecations::deprecated_at)),
            ))
            .returning(Deprecation::as_returning())
            .get_result(&mut conn)
    }

    /// Removes one version's deprecation, or every deprecation of the package when `version` is `None`.
    pub fn undeprecate(
        &self,
        package_name: &str,
        version: Option<&str>,
    ) -> Result<usize, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        let mut query = diesel::delete(package_deprecations::table)
            .filter(package_deprecations::package_name.eq(package_name))
            .into_boxed();
        if let Some(version) = version {
            query = query.filter(package_deprecations::version.eq(version));
        }

        query.execute(&mut conn)
    }

    pub fn is_deprecated(&self, package_name: &str) -> Result<bool, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        let count: i64 = package_deprecations::table
            .filter(package_deprecations::package_name.eq(package_name))
            .count()
            .get_result(&mut conn)?;

        Ok(count > 0)
    }

    pub fn get_deprecations(&self, package_name: &str) -> Result<Vec<Deprecation>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        package_deprecations::table
            .filter(package_deprecations::package_name.eq(package_name))
            .select(Deprecation::as_select())
            .load(&mut conn)
    }

    /// Number of distinct packages with at least one deprecation row.
    pub fn count_deprecated_packages(&self) -> Result<i64, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        package_deprecations::table
            .select(diesel::dsl::count_distinct(package_deprecations::package_name))
            .get_result(&mut conn)
    }
}
