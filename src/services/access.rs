use crate::database::DatabaseService;
use crate::services::queue::WorkQueue;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

/// Records package reads into the access ledger off the request path.
#[derive(Debug)]
pub struct AccessTracker {
    queue: WorkQueue<String>,
}

impl AccessTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: WorkQueue::new("access-ledger", capacity),
        }
    }

    /// Starts a single writer so ledger upserts never contend with each other.
    pub fn start(&self, database: Arc<DatabaseService>) {
        self.queue.start(1, move |package: String| {
            let database = Arc::clone(&database);
            async move {
                let name = package.clone();
                let result = tokio::task::spawn_blocking(move || database.record_access(&package)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Failed to record access for {name}: {e}"),
                    Err(e) => warn!("Access ledger task for {name} panicked: {e}"),
                }
            }
        });
    }

    pub fn record(&self, package: &str) -> bool {
        self.queue.submit(package.to_string())
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    pub async fn wait_idle_timeout(&self, limit: Duration) -> bool {
        self.queue.wait_idle_timeout(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_recorded_reads_reach_the_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let url = temp_dir.path().join("access.db");
        let database = Arc::new(DatabaseService::new(url.to_str().unwrap()).unwrap());

        let tracker = AccessTracker::new(8);
        tracker.start(Arc::clone(&database));

        for _ in 0..3 {
            assert!(tracker.record("leftpad"));
        }
        tracker.wait_idle().await;

        let entry = database.get_ledger_entry("leftpad").unwrap().unwrap();
        assert_eq!(entry.access_count, 3);
        assert_eq!(tracker.pending(), 0);
    }
}
