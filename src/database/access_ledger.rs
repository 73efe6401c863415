use super::connection::{DbPool, connect};
use crate::models::ledger::*;
use crate::schema::access_ledger;
use chrono::NaiveDateTime;
use diesel::prelude::*;

/// Access ledger operations
pub struct AccessLedgerOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> AccessLedgerOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Bumps the access count and stamps the access time, creating the entry on first use.
    pub fn record_access(&self, package_name: &str) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;
        let now = chrono::Utc::now().naive_utc();

        diesel::insert_into(access_ledger::table)
            .values(&NewAccessLedgerEntry::accessed(package_name.to_string()))
            .on_conflict(access_ledger::package_name)
            .do_update()
            .set((
                access_ledger::last_accessed_at.eq(Some(now)),
                access_ledger::access_count.eq(access_ledger::access_count + 1),
                access_ledger::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    /// Creates an untouched entry for a new package; existing entries are kept.
    pub fn ensure_entry(&self, package_name: &str) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::insert_or_ignore_into(access_ledger::table)
            .values(&NewAccessLedgerEntry::published(package_name.to_string()))
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn get_entry(&self, package_name: &str) -> Result<Option<AccessLedgerEntry>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        access_ledger::table
            .filter(access_ledger::package_name.eq(package_name))
            .select(AccessLedgerEntry::as_select())
            .first(&mut conn)
            .optional()
    }

    /// Entries never accessed or last accessed before `cutoff`, ordered by name.
    pub fn inactive_since(
        &self,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<AccessLedgerEntry>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        access_ledger::table
            .filter(
                access_ledger::last_accessed_at
                    .is_null()
                    .or(access_ledger::last_accessed_at.lt(cutoff)),
            )
            .order(access_ledger::package_name.asc())
            .select(AccessLedgerEntry::as_select())
            .load(&mut conn)
    }

    /// Commits or clears the pending-deletion tombstone.
    pub fn set_marked(&self, package_name: &str, marked: bool) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;
        let now = chrono::Utc::now().naive_utc();

        diesel::update(access_ledger::table.filter(access_ledger::package_name.eq(package_name)))
            .set((
                access_ledger::marked_for_gc.eq(marked),
                access_ledger::marked_at.eq(marked.then_some(now)),
                access_ledger::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn marked_entries(&self) -> Result<Vec<AccessLedgerEntry>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        access_ledger::table
            .filter(access_ledger::marked_for_gc.eq(true))
            .select(AccessLedgerEntry::as_select())
            .load(&mut conn)
    }

    /// Overrides timestamps; used to age entries in tests and by operators importing history.
    pub fn set_timestamps(
        &self,
        package_name: &str,
        last_accessed_at: Option<NaiveDateTime>,
        created_at: NaiveDateTime,
    ) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::update(access_ledger::table.filter(access_ledger::package_name.eq(package_name)))
            .set((
                access_ledger::last_accessed_at.eq(last_accessed_at),
                access_ledger::created_at.eq(created_at),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
