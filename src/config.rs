use log::{info, warn};
use serde::Deserialize;
use std::env;

const DEFAULT_UPSTREAM_URL: &str = "https://registry.npmjs.org";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const LEGACY_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// One entry of the `CELLAR_UPSTREAMS` list.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub timeout_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            retry_delay_ms: 5000,
            timeout_secs: 10,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub host: String,
    pub scheme: String,
    pub base_url: Option<String>,
    pub storage_dir: String,
    pub database_url: String,
    pub upstreams: Vec<UpstreamConfig>,
    pub allow_registration: bool,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub webhook: WebhookConfig,
    pub access_queue_capacity: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4873,
            host: "0.0.0.0".to_string(),
            scheme: "http".to_string(),
            base_url: None,
            storage_dir: "./data".to_string(),
            database_url: "./data/cellar.db".to_string(),
            upstreams: vec![UpstreamConfig {
                name: "npmjs".to_string(),
                url: DEFAULT_UPSTREAM_URL.to_string(),
                scope: String::new(),
                timeout_seconds: DEFAULT_UPSTREAM_TIMEOUT_SECS,
                enabled: true,
            }],
            allow_registration: false,
            admin_username: None,
            admin_password: None,
            webhook: WebhookConfig::default(),
            access_queue_capacity: 1024,
            shutdown_grace_secs: 5,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

/// Drops disabled entries and normalises URLs and timeouts.
pub fn normalize_upstreams(entries: Vec<UpstreamConfig>) -> Vec<UpstreamConfig> {
    entries
        .into_iter()
        .filter(|entry| entry.enabled)
        .map(|mut entry| {
            entry.url = entry.url.trim_end_matches('/').to_string();
            if entry.timeout_seconds == 0 {
                entry.timeout_seconds = DEFAULT_UPSTREAM_TIMEOUT_SECS;
            }
            entry
        })
        .collect()
}

/// Resolves the upstream list from a JSON list, a legacy single URL, or the built-in default.
pub fn parse_upstreams(list: Option<&str>, legacy: Option<&str>) -> Vec<UpstreamConfig> {
    if let Some(raw) = list {
        match serde_json::from_str::<Vec<UpstreamConfig>>(raw) {
            Ok(entries) => return normalize_upstreams(entries),
            Err(e) => warn!("Ignoring CELLAR_UPSTREAMS, invalid JSON: {e}"),
        }
    }

    if let Some(url) = legacy.filter(|url| !url.trim().is_empty()) {
        return normalize_upstreams(vec![UpstreamConfig {
            name: "default".to_string(),
            url: url.trim().to_string(),
            scope: String::new(),
            timeout_seconds: LEGACY_UPSTREAM_TIMEOUT_SECS,
            enabled: true,
        }]);
    }

    AppConfig::default().upstreams
}

impl AppConfig {
    pub fn get_scheme(&self) -> &str {
        &self.scheme
    }

    pub fn from_env() -> Self {
        let port = env_parse("CELLAR_PORT", 4873u16);
        let host = env::var("CELLAR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let scheme = env::var("CELLAR_SCHEME").unwrap_or_else(|_| {
            if port == 443 {
                "https".to_string()
            } else {
                "http".to_string()
            }
        });

        let base_url = env::var("CELLAR_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let storage_dir = env::var("CELLAR_STORAGE_DIR").unwrap_or_else(|_| "./data".to_string());
        let database_url = env::var("CELLAR_DATABASE_URL")
            .unwrap_or_else(|_| format!("{storage_dir}/cellar.db"));

        let upstreams = parse_upstreams(
            env::var("CELLAR_UPSTREAMS").ok().as_deref(),
            env::var("CELLAR_UPSTREAM").ok().as_deref(),
        );

        let allow_registration = env_parse("CELLAR_ALLOW_REGISTRATION", false);
        let admin_username = env::var("CELLAR_ADMIN_USERNAME").ok();
        let admin_password = env::var("CELLAR_ADMIN_PASSWORD").ok();

        let defaults = WebhookConfig::default();
        let webhook = WebhookConfig {
            workers: env_parse("CELLAR_WEBHOOK_WORKERS", defaults.workers).max(1),
            queue_capacity: env_parse("CELLAR_WEBHOOK_QUEUE", defaults.queue_capacity).max(1),
            retry_delay_ms: env_parse("CELLAR_WEBHOOK_RETRY_DELAY_MS", defaults.retry_delay_ms),
            timeout_secs: env_parse("CELLAR_WEBHOOK_TIMEOUT_SECS", defaults.timeout_secs),
            max_attempts: defaults.max_attempts,
        };

        let access_queue_capacity = env_parse("CELLAR_ACCESS_QUEUE", 1024usize).max(1);
        let shutdown_grace_secs = env_parse("CELLAR_SHUTDOWN_GRACE_SECS", 5u64);

        info!("Configuration loaded:");
        info!("  Host: {host}");
        info!("  Port: {port}");
        info!("  Scheme: {scheme}");
        info!("  Base URL: {}", base_url.as_deref().unwrap_or("(from Host header)"));
        info!("  Storage Directory: {storage_dir}");
        info!("  Database URL: {database_url}");
        for upstream in &upstreams {
            let scope = if upstream.scope.is_empty() {
                "(default)"
            } else {
                upstream.scope.as_str()
            };
            info!(
                "  Upstream: {} {} scope={scope} timeout={}s",
                upstream.name, upstream.url, upstream.timeout_seconds
            );
        }
        info!("  Registration Allowed: {allow_registration}");
        info!(
            "  Webhooks: {} workers, queue {}, retry delay {}ms",
            webhook.workers, webhook.queue_capacity, webhook.retry_delay_ms
        );

        Self {
            port,
            host,
            scheme,
            base_url,
            storage_dir,
            database_url,
            upstreams,
            allow_registration,
            admin_username,
            admin_password,
            webhook,
            access_queue_capacity,
            shutdown_grace_secs,
        }
    }
}
