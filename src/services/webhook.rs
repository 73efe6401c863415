use crate::config::WebhookConfig;
use crate::database::DatabaseService;
use crate::error::ApiError;
use crate::models::{Webhook, WebhookEvent};
use crate::services::queue::WorkQueue;
use hmac::{Hmac, Mac};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

pub const EVENT_HEADER: &str = "X-Cellar-Event";
pub const SIGNATURE_HEADER: &str = "X-Cellar-Signature";
const USER_AGENT: &str = "Cellar-Webhook/1.0";

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    timestamp: String,
    payload: &'a Value,
}

/// Hex encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, ApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::InternalServerError(format!("Invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn build_envelope(event: WebhookEvent, payload: &Value) -> Result<String, ApiError> {
    serde_json::to_string(&Envelope {
        event: event.as_str(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        payload,
    })
    .map_err(|e| ApiError::InternalServerError(format!("Failed to encode webhook envelope: {e}")))
}

/// One pending POST of an envelope to one subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub webhook_id: i32,
    pub url: String,
    pub secret: String,
    pub event: WebhookEvent,
    pub body: String,
}

impl Delivery {
    fn for_webhook(webhook: &Webhook, event: WebhookEvent, body: &str) -> Self {
        Self {
            webhook_id: webhook.id,
            url: webhook.url.clone(),
            secret: webhook.secret.clone(),
            event,
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Deliverer {
    client: reqwest::Client,
    database: Arc<DatabaseService>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Deliverer {
    async fn send_once(&self, delivery: &Delivery) -> Result<u16, String> {
        let mut request = self
            .client
            .post(&delivery.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(EVENT_HEADER, delivery.event.as_str())
            .body(delivery.body.clone());

        if !delivery.secret.is_empty() {
            let signature = sign(&delivery.secret, delivery.body.as_bytes()).map_err(|e| e.to_string())?;
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }

    async fn record_success(&self, delivery: &Delivery) {
        let database = Arc::clone(&self.database);
        let webhook_id = delivery.webhook_id;
        let recorded =
            tokio::task::spawn_blocking(move || database.mark_webhook_delivered(webhook_id)).await;
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to record delivery for webhook {webhook_id}: {e}"),
            Err(e) => warn!("Failed to record delivery for webhook {webhook_id}: {e}"),
        }
    }

    /// Tries up to `max_attempts` times with a fixed delay; failures are only logged.
    async fn deliver(&self, delivery: Delivery) {
        for attempt in 1..=self.max_attempts {
            match self.send_once(&delivery).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!(
                        "Delivered {} to webhook {} on attempt {attempt}",
                        delivery.event, delivery.webhook_id
                    );
                    self.record_success(&delivery).await;
                    return;
                }
                Ok(status) => warn!(
                    "Webhook {} answered {status} for {} (attempt {attempt}/{})",
                    delivery.webhook_id, delivery.event, self.max_attempts
                ),
                Err(e) => warn!(
                    "Webhook {} delivery of {} failed (attempt {attempt}/{}): {e}",
                    delivery.webhook_id, delivery.event, self.max_attempts
                ),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(
            "Giving up on webhook {} for {} after {} attempts",
            delivery.webhook_id, delivery.event, self.max_attempts
        );
    }
}

/// Fans events out to enabled subscriptions through a bounded delivery queue.
#[derive(Debug)]
pub struct WebhookDispatcher {
    deliverer: Deliverer,
    workers: usize,
    queue: WorkQueue<Delivery>,
}

impl WebhookDispatcher {
    pub fn new(database: Arc<DatabaseService>, config: &WebhookConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ApiError::InternalServerError(format!("Failed to build webhook client: {e}")))?;

        Ok(Self {
            deliverer: Deliverer {
                client,
                database,
                max_attempts: config.max_attempts.max(1),
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
            workers: config.workers,
            queue: WorkQueue::new("webhook", config.queue_capacity),
        })
    }

    /// Spawns the delivery workers on the current runtime.
    pub fn start(&self) {
        let deliverer = self.deliverer.clone();
        self.queue.start(self.workers, move |delivery| {
            let deliverer = deliverer.clone();
            async move { deliverer.deliver(delivery).await }
        });
    }

    /// Queues one delivery per interested subscription and returns how many were queued.
    pub fn dispatch(&self, event: WebhookEvent, payload: Value) -> usize {
        let body = match build_envelope(event, &payload) {
            Ok(body) => body,
            Err(e) => {
                error!("Dropping {event} notification: {e}");
                return 0;
            }
        };

        let webhooks = match self.deliverer.database.enabled_webhooks() {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!("Failed to load webhooks for {event}: {e}");
                return 0;
            }
        };

        let queued = webhooks
            .iter()
            .filter(|webhook| webhook.accepts(event))
            .filter(|webhook| self.queue.submit(Delivery::for_webhook(webhook, event, &body)))
            .count();

        if queued > 0 {
            info!("Queued {event} for {queued} webhook(s)");
        }
        queued
    }

    /// `dispatch` with the subscription lookup moved to the blocking pool.
    pub async fn dispatch_async(self: &Arc<Self>, event: WebhookEvent, payload: Value) -> usize {
        let dispatcher = Arc::clone(self);
        match tokio::task::spawn_blocking(move || dispatcher.dispatch(event, payload)).await {
            Ok(queued) => queued,
            Err(e) => {
                error!("Dispatch of {event} failed: {e}");
                0
            }
        }
    }

    /// Sends a single `webhook:test` envelope right away and returns the response status.
    pub async fn send_test(&self, webhook: &Webhook) -> Result<u16, ApiError> {
        let payload = serde_json::json!({
            "message": "This is a test webhook",
            "webhook": webhook.name,
        });
        let body = build_envelope(WebhookEvent::Test, &payload)?;
        let delivery = Delivery::for_webhook(webhook, WebhookEvent::Test, &body);

        let status = self
            .deliverer
            .send_once(&delivery)
            .await
            .map_err(|message| ApiError::UpstreamUnavailable {
                upstream: webhook.url.clone(),
                status: None,
                message,
            })?;

        if (200..300).contains(&status) {
            self.deliverer.record_success(&delivery).await;
        }
        Ok(status)
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
