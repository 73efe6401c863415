use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded channel drained by a fixed set of worker tasks.
///
/// Submitting never blocks: when the channel is full the job is dropped and logged.
/// `wait_idle` resolves once every accepted job has been handled.
#[derive(Debug)]
pub struct WorkQueue<J> {
    name: &'static str,
    sender: mpsc::Sender<J>,
    receiver: Mutex<Option<mpsc::Receiver<J>>>,
    in_flight: Arc<InFlight>,
}

impl<J: Send + 'static> WorkQueue<J> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            name,
            sender,
            receiver: Mutex::new(Some(receiver)),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Queues a job. Returns false when it was dropped.
    pub fn submit(&self, job: J) -> bool {
        self.in_flight.begin();
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.in_flight.finish();
                warn!("{} queue is full, dropping job", self.name);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.in_flight.finish();
                warn!("{} queue is closed, dropping job", self.name);
                false
            }
        }
    }

    /// Spawns `workers` tasks on the current runtime. Only the first call has any effect.
    pub fn start<F, Fut>(&self, workers: usize, handler: F) -> bool
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let receiver = match self.receiver.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(receiver) = receiver else {
            return false;
        };

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handler = Arc::new(handler);

        for worker in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let in_flight = Arc::clone(&self.in_flight);
            let name = self.name;

            tokio::spawn(async move {
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(job) = job else {
                        break;
                    };
                    handler(job).await;
                    in_flight.finish();
                }
                debug!("{name} worker {worker} stopped");
            });
        }

        debug!("Started {} {} workers", workers.max(1), self.name);
        true
    }

    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits for the queue to drain; returns false if `limit` elapsed first.
    pub async fn wait_idle_timeout(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_idle()).await.is_ok()
    }
}
