use super::connection::{DbPool, connect};
use crate::models::package::*;
use crate::schema::{package_owners, users};
use diesel::prelude::*;

/// Package ownership operations
pub struct OwnerOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> OwnerOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub fn get_owners(&self, package_name: &str) -> Result<Vec<PackageOwner>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        package_owners::table
            .filter(package_owners::package_name.eq(package_name))
            .select(PackageOwner::as_select())
            .load(&mut conn)
    }

    /// Owners with their usernames and emails.
    pub fn get_owner_details(
        &self,
        package_name: &str,
    ) -> Result<Vec<OwnerInfo>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        let rows: Vec<(String, String, bool)> = package_owners::table
            .inner_join(users::table)
            .filter(package_owners::package_name.eq(package_name))
            .order(users::username.asc())
            .select((users::username, users::email, package_owners::can_publish))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(username, email, can_publish)| OwnerInfo {
                username,
                email,
                can_publish,
            })
            .collect())
    }

    /// Adds an owner row. An existing row for the same user is left untouched.
    pub fn add_owner(
        &self,
        package_name: &str,
        user_id: i32,
        can_publish: bool,
    ) -> Result<bool, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        let inserted = diesel::insert_or_ignore_into(package_owners::table)
            .values(&NewPackageOwner::new(package_name.to_string(), user_id, can_publish))
            .execute(&mut conn)?;

        Ok(inserted > 0)
    }

    /// Inserts or updates the owner row with the given publish right.
    pub fn set_owner(
        &self,
        package_name: &str,
        user_id: i32,
        can_publish: bool,
    ) -> Result<(), diesel::result::Error> {
        if self.add_owner(package_name, user_id, can_publish)? {
            return Ok(());
        }

        let mut conn = connect(self.pool)?;
        diesel::update(
            package_owners::table
                .filter(package_owners::package_name.eq(package_name))
                .filter(package_owners::user_id.eq(user_id)),
        )
        .set(package_owners::can_publish.eq(can_publish))
        .execute(&mut conn)?;

        Ok(())
    }

    pub fn remove_owner(&self, package_name: &str, user_id: i32) -> Result<bool, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        let removed = diesel::delete(
            package_owners::table
                .filter(package_owners::package_name.eq(package_name))
                .filter(package_owners::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;

        Ok(removed > 0)
    }
}
