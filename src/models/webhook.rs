use crate::schema::webhooks;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rocket::serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    PackagePublished,
    PackageUnpublished,
    UserCreated,
    UserDeleted,
    Test,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::PackagePublished => "package:published",
            WebhookEvent::PackageUnpublished => "package:unpublished",
            WebhookEvent::UserCreated => "user:created",
            WebhookEvent::UserDeleted => "user:deleted",
            WebhookEvent::Test => "webhook:test",
        }
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = webhooks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: i32,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub events: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub last_delivery_at: Option<NaiveDateTime>,
}

impl Webhook {
    /// An empty allow-list subscribes to every event.
    pub fn accepts(&self, event: WebhookEvent) -> bool {
        let events = self.events.trim();
        events.is_empty()
            || events
                .split(',')
                .any(|candidate| candidate.trim() == event.as_str())
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = webhooks)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub events: String,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = webhooks)]
pub struct UpdateWebhook {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct WebhookRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize, Debug)]
pub struct WebhookUpdateRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

impl NewWebhook {
    pub fn from_request(request: WebhookRequest) -> Self {
        Self {
            name: request.name,
            url: request.url,
            secret: request.secret,
            events: request.events.join(","),
            enabled: request.enabled,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

impl UpdateWebhook {
    /// Diesel rejects an update with nothing to set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.secret.is_none()
            && self.events.is_none()
            && self.enabled.is_none()
    }
}

impl From<WebhookUpdateRequest> for UpdateWebhook {
    fn from(request: WebhookUpdateRequest) -> Self {
        Self {
            name: request.name,
            url: request.url,
            secret: request.secret,
            events: request.events.map(|events| events.join(",")),
            enabled: request.enabled,
        }
    }
}
