use crate::database::DatabaseService;
use crate::error::ApiError;
use crate::models::{
    AccessLedgerEntry, DEFAULT_MAX_INACTIVE_DAYS, GcAnalysis, GcCandidate, GcPolicy, GcPolicySummary,
    GcRunReport, GcStats,
};
use crate::services::storage::LocalStorage;
use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use std::sync::Arc;

/// Evicts packages nobody has read for a while.
///
/// Deletion is mark-then-sweep: the ledger row is tombstoned before the directory goes,
/// and the database rows are removed only after the files are gone. `reconcile` finishes
/// any sweep interrupted between the two.
#[derive(Debug)]
pub struct GcEngine {
    storage: Arc<LocalStorage>,
    database: Arc<DatabaseService>,
}

impl GcEngine {
    pub fn new(storage: Arc<LocalStorage>, database: Arc<DatabaseService>) -> Self {
        Self { storage, database }
    }

    /// Read-only evaluation of `policy`.
    pub fn analyze(&self, policy: &GcPolicy) -> Result<GcAnalysis, ApiError> {
        let now = chrono::Utc::now().naive_utc();
        Ok(GcAnalysis {
            candidates: self.candidates(policy, now)?,
            policy: GcPolicySummary::from(policy),
        })
    }

    pub fn run(&self, policy: &GcPolicy) -> Result<GcRunReport, ApiError> {
        let now = chrono::Utc::now().naive_utc();
        let candidates = self.candidates(policy, now)?;

        let mut report = GcRunReport {
            dry_run: policy.dry_run,
            ..Default::default()
        };

        if policy.dry_run {
            for candidate in &candidates {
                report.deleted.push(format!("{} (dry run)", candidate.package_name));
                report.deleted_size += candidate.size;
            }
            report.deleted_count = candidates.len();
            report.ok = true;
            info!(
                "GC dry run: {} candidate(s), {} bytes reclaimable",
                report.deleted_count, report.deleted_size
            );
            return Ok(report);
        }

        for candidate in candidates {
            match self.sweep(&candidate.package_name) {
                Ok(()) => {
                    report.deleted_size += candidate.size;
                    report.deleted.push(candidate.package_name);
                }
                Err(e) => {
                    warn!("GC failed for {}: {e}", candidate.package_name);
                    report.errors.push(format!("{}: {e}", candidate.package_name));
                }
            }
        }

        report.deleted_count = report.deleted.len();
        report.ok = !report.is_partial_failure();
        info!(
            "GC removed {} package(s), {} bytes, {} error(s)",
            report.deleted_count,
            report.deleted_size,
            report.errors.len()
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<GcStats, ApiError> {
        let now = chrono::Utc::now().naive_utc();
        let old = self
            .database
            .inactive_since(days_before(now, DEFAULT_MAX_INACTIVE_DAYS, "maxInactiveDays")?)?;

        let old_packages_size = old
            .iter()
            .map(|entry| self.size_of(&entry.package_name))
            .sum();

        Ok(GcStats {
            total_packages: self.database.count_packages()?,
            total_versions: self.database.count_all_versions()?,
            total_size: self.storage.stats()?.total_size,
            deprecated_packages: self.database.count_deprecated_packages()?,
            old_packages: old.len() as i64,
            old_packages_size,
        })
    }

    /// Completes sweeps left behind by an interrupted run. Returns how many were finished.
    pub fn reconcile(&self) -> Result<usize, ApiError> {
        let pending = self.database.marked_for_gc()?;
        let mut finished = 0;

        for entry in pending {
            let name = entry.package_name;
            let result = self
                .storage
                .delete_package(&name)
                .and_then(|_| self.database.delete_package_rows(&name).map_err(ApiError::from));
            match result {
                Ok(()) => {
                    info!("Finished interrupted GC of {name}");
                    finished += 1;
                }
                Err(e) => warn!("Could not finish interrupted GC of {name}: {e}"),
            }
        }

        Ok(finished)
    }

    fn sweep(&self, name: &str) -> Result<(), ApiError> {
        self.database.set_marked_for_gc(name, true)?;

        if let Err(e) = self.storage.delete_package(name) {
            if let Err(unmark) = self.database.set_marked_for_gc(name, false) {
                warn!("Could not clear GC mark on {name}: {unmark}");
            }
            return Err(e);
        }

        self.database.delete_package_rows(name)?;
        debug!("GC swept {name}");
        Ok(())
    }

    fn candidates(&self, policy: &GcPolicy, now: NaiveDateTime) -> Result<Vec<GcCandidate>, ApiError> {
        let cutoff = days_before(now, policy.max_inactive_days, "maxInactiveDays")?;
        let min_created = if policy.min_package_age_days > 0 {
            Some(days_before(now, policy.min_package_age_days, "minPackageAgeDays")?)
        } else {
            None
        };

        let mut candidates = Vec::new();
        for entry in self.database.inactive_since(cutoff)? {
            if min_created.is_some_and(|limit| entry.created_at > limit) {
                continue;
            }

            let version_count = self.database.count_versions(&entry.package_name)?;
            if version_count <= policy.min_versions_to_keep {
                continue;
            }

            let is_deprecated = self.database.is_deprecated(&entry.package_name)?;
            if is_deprecated && !policy.include_deprecated {
                continue;
            }

            candidates.push(self.describe(entry, version_count, is_deprecated, policy));
        }

        Ok(candidates)
    }

    fn describe(
        &self,
        entry: AccessLedgerEntry,
        version_count: i64,
        is_deprecated: bool,
        policy: &GcPolicy,
    ) -> GcCandidate {
        let (last_accessed, reason) = match entry.last_accessed_at {
            Some(at) => (
                at.and_utc().to_rfc3339(),
                format!(
                    "not accessed in {} days, {version_count} versions",
                    policy.max_inactive_days
                ),
            ),
            None => (
                "never".to_string(),
                format!("never accessed, {version_count} versions"),
            ),
        };

        GcCandidate {
            size: self.size_of(&entry.package_name),
            package_name: entry.package_name,
            last_accessed,
            access_count: entry.access_count,
            version_count,
            is_deprecated,
            reason,
        }
    }

    fn size_of(&self, name: &str) -> u64 {
        self.storage.package_size(name).unwrap_or_else(|e| {
            warn!("Could not size {name}: {e}");
            0
        })
    }
}

/// `now` minus `days`, or BadRequest when the result is not a representable date.
fn days_before(now: NaiveDateTime, days: i64, field: &str) -> Result<NaiveDateTime, ApiError> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| ApiError::BadRequest(format!("{field} value {days} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDeprecation, NewPackageVersion};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        engine: GcEngine,
        storage: Arc<LocalStorage>,
        database: Arc<DatabaseService>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).unwrap());
        let url = dir.path().join("gc.db");
        let database = Arc::new(DatabaseService::new(url.to_str().unwrap()).unwrap());
        Fixture {
            engine: GcEngine::new(Arc::clone(&storage), Arc::clone(&database)),
            storage,
            database,
            _dir: dir,
        }
    }

    /// Stores a package with `versions` versions, last read `idle_days` ago.
    fn seed(fx: &Fixture, name: &str, versions: usize, idle_days: Option<i64>, age_days: i64) {
        let now = chrono::Utc::now().naive_utc();
        let version_map: serde_json::Map<String, serde_json::Value> = (0..versions)
            .map(|i| (format!("1.0.{i}"), json!({ "version": format!("1.0.{i}") })))
            .collect();
        let metadata = json!({ "name": name, "versions": version_map });

        fx.storage.save_metadata_value(name, &metadata).unwrap();
        fx.storage.save_tarball(name, "pkg-1.0.0.tgz", b"bytes").unwrap();
        fx.database.create_or_get_package(name, None, true).unwrap();
        fx.database
            .record_versions(&NewPackageVersion::from_metadata(name, &metadata, None))
            .unwrap();
        fx.database.ensure_ledger_entry(name).unwrap();
        fx.database
            .set_ledger_timestamps(
                name,
                idle_days.map(|days| now - Duration::days(days)),
                now - Duration::days(age_days),
            )
            .unwrap();
    }

    fn policy(dry_run: bool) -> GcPolicy {
        GcPolicy {
            dry_run,
            ..Default::default()
        }
    }

    #[test]
    fn test_analyze_is_repeatable_and_pure() {
        let fx = fixture();
        seed(&fx, "stale", 6, Some(400), 500);
        seed(&fx, "fresh", 6, Some(1), 500);
        seed(&fx, "untouched", 7, None, 500);

        let first = fx.engine.analyze(&GcPolicy::default()).unwrap();
        let second = fx.engine.analyze(&GcPolicy::default()).unwrap();

        let names: Vec<_> = first.candidates.iter().map(|c| c.package_name.as_str()).collect();
        assert_eq!(names, vec!["stale", "untouched"]);
        assert_eq!(first.candidates, second.candidates);
        assert_eq!(first.candidates[1].last_accessed, "never");
        assert!(first.candidates[0].size > 0);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let fx = fixture();
        seed(&fx, "stale", 6, Some(400), 500);

        let report = fx.engine.run(&policy(true)).unwrap();

        assert!(report.ok && report.dry_run);
        assert_eq!(report.deleted, vec!["stale (dry run)".to_string()]);
        assert!(fx.storage.has("stale"));
        assert_eq!(fx.engine.analyze(&GcPolicy::default()).unwrap().candidates.len(), 1);
    }

    #[test]
    fn test_version_floor_protects_small_packages() {
        let fx = fixture();
        seed(&fx, "tiny", 3, Some(10_000), 10_000);

        let report = fx.engine.run(&policy(false)).unwrap();

        assert_eq!(report.deleted_count, 0);
        assert!(fx.storage.has("tiny"));
    }

    #[test]
    fn test_run_evicts_files_then_rows() {
        let fx = fixture();
        seed(&fx, "stale", 6, Some(400), 500);
        seed(&fx, "fresh", 6, Some(1), 500);

        let report = fx.engine.run(&policy(false)).unwrap();

        assert!(report.ok);
        assert_eq!(report.deleted, vec!["stale".to_string()]);
        assert!(report.deleted_size > 0);
        assert!(!fx.storage.has("stale"));
        assert!(fx.database.get_package_by_name("stale").unwrap().is_none());
        assert!(fx.database.get_ledger_entry("stale").unwrap().is_none());
        assert_eq!(fx.database.count_versions("stale").unwrap(), 0);
        assert!(fx.storage.has("fresh"));
    }

    #[test]
    fn test_one_failed_deletion_does_not_stop_the_batch() {
        let fx = fixture();
        seed(&fx, "stuck", 6, Some(400), 500);
        seed(&fx, "stale", 6, Some(400), 500);

        // A plain file where the package directory should be makes removal fail.
        let stuck_dir = fx.storage.root().join("stuck");
        std::fs::remove_dir_all(&stuck_dir).unwrap();
        std::fs::write(&stuck_dir, b"not a directory").unwrap();

        let report = fx.engine.run(&policy(false)).unwrap();

        assert!(!report.ok);
        assert!(report.is_partial_failure());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("stuck: "));
        assert_eq!(report.deleted, vec!["stale".to_string()]);

        assert!(!fx.storage.has("stale"));
        assert!(fx.database.get_package_by_name("stale").unwrap().is_none());

        assert!(fx.database.get_package_by_name("stuck").unwrap().is_some());
        assert_eq!(fx.database.count_versions("stuck").unwrap(), 6);
        let ledger = fx.database.get_ledger_entry("stuck").unwrap().unwrap();
        assert!(!ledger.marked_for_gc);
        assert!(fx.database.marked_for_gc().unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_days_are_rejected() {
        let fx = fixture();
        seed(&fx, "stale", 6, Some(400), 500);

        let huge_window = GcPolicy {
            max_inactive_days: 100_000_000,
            ..Default::default()
        };
        assert!(matches!(fx.engine.analyze(&huge_window), Err(ApiError::BadRequest(_))));
        assert!(matches!(fx.engine.run(&huge_window), Err(ApiError::BadRequest(_))));

        let huge_age = GcPolicy {
            min_package_age_days: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(fx.engine.analyze(&huge_age), Err(ApiError::BadRequest(_))));
        assert!(fx.storage.has("stale"));
    }

    #[test]
    fn test_deprecated_packages_need_opt_in() {
        let fx = fixture();
        seed(&fx, "old", 6, Some(400), 500);
        fx.database
            .deprecate(&NewDeprecation::new("old".into(), String::new(), "use new".into(), "root".into()))
            .unwrap();

        assert!(fx.engine.analyze(&GcPolicy::default()).unwrap().candidates.is_empty());

        let with_deprecated = GcPolicy {
            include_deprecated: true,
            ..Default::default()
        };
        let candidates = fx.engine.analyze(&with_deprecated).unwrap().candidates;
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_deprecated);
    }

    #[test]
    fn test_min_package_age_guard() {
        let fx = fixture();
        seed(&fx, "young", 6, None, 2);

        assert_eq!(fx.engine.analyze(&GcPolicy::default()).unwrap().candidates.len(), 1);

        let guarded = GcPolicy {
            min_package_age_days: 7,
            ..Default::default()
        };
        assert!(fx.engine.analyze(&guarded).unwrap().candidates.is_empty());
    }

    #[test]
    fn test_reconcile_finishes_marked_sweeps() {
        let fx = fixture();
        seed(&fx, "halfway", 6, Some(400), 500);
        fx.database.set_marked_for_gc("halfway", true).unwrap();
        fx.storage.delete_package("halfway").unwrap();

        assert_eq!(fx.engine.reconcile().unwrap(), 1);
        assert!(fx.database.get_package_by_name("halfway").unwrap().is_none());
        assert_eq!(fx.engine.reconcile().unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let fx = fixture();
        seed(&fx, "stale", 6, Some(400), 500);
        seed(&fx, "fresh", 2, Some(1), 500);

        let stats = fx.engine.stats().unwrap();
        assert_eq!(stats.total_packages, 2);
        assert_eq!(stats.total_versions, 8);
        assert_eq!(stats.old_packages, 1);
        assert!(stats.old_packages_size > 0);
        assert!(stats.total_size >= stats.old_packages_size);
    }
}
