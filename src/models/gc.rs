use rocket::serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_INACTIVE_DAYS: i64 = 180;
pub const DEFAULT_MIN_VERSIONS_TO_KEEP: i64 = 5;

/// Eviction policy. `min_package_age_days` of zero disables the age guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPolicy {
    pub max_inactive_days: i64,
    pub min_versions_to_keep: i64,
    pub dry_run: bool,
    pub include_deprecated: bool,
    pub min_package_age_days: i64,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            max_inactive_days: DEFAULT_MAX_INACTIVE_DAYS,
            min_versions_to_keep: DEFAULT_MIN_VERSIONS_TO_KEEP,
            dry_run: true,
            include_deprecated: false,
            min_package_age_days: 0,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GcRunRequest {
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub max_inactive_days: i64,
    #[serde(default)]
    pub min_versions_to_keep: i64,
    #[serde(default)]
    pub include_deprecated: bool,
    #[serde(default)]
    pub min_package_age_days: i64,
}

impl From<GcRunRequest> for GcPolicy {
    fn from(request: GcRunRequest) -> Self {
        let defaults = GcPolicy::default();
        Self {
            max_inactive_days: positive_or(request.max_inactive_days, defaults.max_inactive_days),
            min_versions_to_keep: positive_or(
                request.min_versions_to_keep,
                defaults.min_versions_to_keep,
            ),
            dry_run: request.dry_run.unwrap_or(defaults.dry_run),
            include_deprecated: request.include_deprecated,
            min_package_age_days: request.min_package_age_days.max(0),
        }
    }
}

fn positive_or(value: i64, default: i64) -> i64 {
    if value > 0 { value } else { default }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcCandidate {
    pub package_name: String,
    pub last_accessed: String,
    pub access_count: i32,
    pub version_count: i64,
    pub size: u64,
    pub is_deprecated: bool,
    pub reason: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcPolicySummary {
    pub max_inactive_days: i64,
    pub min_versions_to_keep: i64,
    pub include_deprecated: bool,
    pub min_package_age_days: i64,
}

impl From<&GcPolicy> for GcPolicySummary {
    fn from(policy: &GcPolicy) -> Self {
        Self {
            max_inactive_days: policy.max_inactive_days,
            min_versions_to_keep: policy.min_versions_to_keep,
            include_deprecated: policy.include_deprecated,
            min_package_age_days: policy.min_package_age_days,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct GcAnalysis {
    pub candidates: Vec<GcCandidate>,
    pub policy: GcPolicySummary,
}

/// Outcome of a GC run. A non-empty `errors` list is a partial failure.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcRunReport {
    pub ok: bool,
    pub dry_run: bool,
    pub deleted: Vec<String>,
    pub deleted_count: usize,
    pub deleted_size: u64,
    pub errors: Vec<String>,
}

impl GcRunReport {
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcStats {
    pub total_packages: i64,
    pub total_versions: i64,
    pub total_size: u64,
    pub deprecated_packages: i64,
    pub old_packages: i64,
    pub old_packages_size: u64,
}
