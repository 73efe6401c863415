use crate::schema::{package_deprecations, package_owners, package_versions, packages};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rocket::serde::{Deserialize, Serialize};

// Package record - one row per package name known to the registry
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Package {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub latest: Option<String>,
    pub is_private: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = packages)]
pub struct NewPackage {
    pub name: String,
    pub description: Option<String>,
    pub latest: Option<String>,
    pub is_private: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = packages)]
pub struct UpdatePackage {
    pub description: Option<String>,
    pub latest: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl NewPackage {
    pub fn new(
        name: String,
        description: Option<String>,
        latest: Option<String>,
        is_private: bool,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            name,
            description,
            latest,
            is_private,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = package_versions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PackageVersion {
    pub id: i32,
    pub package_name: String,
    pub version: String,
    pub tarball: Option<String>,
    pub shasum: Option<String>,
    pub publisher: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = package_versions)]
pub struct NewPackageVersion {
    pub package_name: String,
    pub version: String,
    pub tarball: Option<String>,
    pub shasum: Option<String>,
    pub publisher: Option<String>,
    pub created_at: NaiveDateTime,
}

impl NewPackageVersion {
    pub fn new(
        package_name: String,
        version: String,
        tarball: Option<String>,
        shasum: Option<String>,
        publisher: Option<String>,
    ) -> Self {
        Self {
            package_name,
            version,
            tarball,
            shasum,
            publisher,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Builds version rows from the `versions` map of a metadata document.
    pub fn from_metadata(
        package_name: &str,
        metadata: &serde_json::Value,
        publisher: Option<&str>,
    ) -> Vec<Self> {
        let Some(versions) = metadata.get("versions").and_then(|v| v.as_object()) else {
            return Vec::new();
        };

        versions
            .iter()
            .map(|(version, descriptor)| {
                let dist = descriptor.get("dist");
                let tarball = dist
                    .and_then(|d| d.get("tarball"))
                    .and_then(|t| t.as_str())
                    .and_then(|t| t.rsplit('/').next())
                    .map(str::to_string);
                let shasum = dist
                    .and_then(|d| d.get("shasum"))
                    .and_then(|s| s.as_str())
                    .map(str::to_string);
                Self::new(
                    package_name.to_string(),
                    version.clone(),
                    tarball,
                    shasum,
                    publisher.map(str::to_string),
                )
            })
            .collect()
    }
}

// Ownership row: grants a user the right to publish new versions
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = package_owners)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PackageOwner {
    pub id: i32,
    pub package_name: String,
    pub user_id: i32,
    pub can_publish: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = package_owners)]
pub struct NewPackageOwner {
    pub package_name: String,
    pub user_id: i32,
    pub can_publish: bool,
    pub created_at: NaiveDateTime,
}

impl NewPackageOwner {
    pub fn new(package_name: String, user_id: i32, can_publish: bool) -> Self {
        Self {
            package_name,
            user_id,
            can_publish,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Owner row joined with the owning user's public fields.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInfo {
    pub username: String,
    pub email: String,
    pub can_publish: bool,
}

// An empty version deprecates the whole package
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = package_deprecations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Deprecation {
    pub id: i32,
    pub package_name: String,
    pub version: String,
    pub reason: String,
    pub deprecated_by: String,
    pub deprecated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = package_deprecations)]
pub struct NewDeprecation {
    pub package_name: String,
    pub version: String,
    pub reason: String,
    pub deprecated_by: String,
    pub deprecated_at: NaiveDateTime,
}

impl NewDeprecation {
    pub fn new(package_name: String, version: String, reason: String, deprecated_by: String) -> Self {
        Self {
            package_name,
            version,
            reason,
            deprecated_by,
            deprecated_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Listing entry derived from a stored metadata document.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    pub description: String,
    pub latest: String,
    pub updated_at: String,
    pub private: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub description: String,
}

impl From<PackageSummary> for SearchHit {
    fn from(summary: PackageSummary) -> Self {
        Self {
            name: summary.name,
            description: summary.description,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub packages: Vec<SearchHit>,
    pub total: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_packages: u64,
    pub total_size: u64,
}
