use crate::schema::access_ledger;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rocket::serde::Serialize;

/// Per-package access recency used by garbage collection.
#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = access_ledger)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccessLedgerEntry {
    pub id: i32,
    pub package_name: String,
    pub last_accessed_at: Option<NaiveDateTime>,
    pub access_count: i32,
    pub marked_for_gc: bool,
    pub marked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = access_ledger)]
pub struct NewAccessLedgerEntry {
    pub package_name: String,
    pub last_accessed_at: Option<NaiveDateTime>,
    pub access_count: i32,
    pub marked_for_gc: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewAccessLedgerEntry {
    /// Entry for a package read for the first time.
    pub fn accessed(package_name: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            package_name,
            last_accessed_at: Some(now),
            access_count: 1,
            marked_for_gc: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Entry for a freshly published package that nobody has read yet.
    pub fn published(package_name: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            package_name,
            last_accessed_at: None,
            access_count: 0,
            marked_for_gc: false,
            created_at: now,
            updated_at: now,
        }
    }
}
