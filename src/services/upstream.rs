use crate::config::UpstreamConfig;
use crate::error::ApiError;
use log::{debug, info, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use std::collections::HashMap;
use std::time::Duration;

pub const METADATA_LIMIT: usize = 50 * 1024 * 1024;
pub const TARBALL_LIMIT: usize = 500 * 1024 * 1024;

/// Characters left as-is inside one path segment; `/` is always escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=');

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSource {
    pub name: String,
    pub url: String,
    /// Empty for the default source.
    pub scope: String,
    pub timeout: Duration,
}

impl From<&UpstreamConfig> for UpstreamSource {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            scope: config.scope.clone(),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
        }
    }
}

/// Picks the upstream that answers for a package name.
#[derive(Debug)]
pub struct UpstreamRouter {
    sources: Vec<UpstreamSource>,
    scopes: HashMap<String, usize>,
    default: Option<usize>,
}

impl UpstreamRouter {
    /// Builds the routing table from enabled entries. The first default and the first
    /// source for each scope win; later duplicates are ignored with a warning.
    pub fn new(configs: &[UpstreamConfig]) -> Self {
        let mut sources = Vec::new();
        let mut scopes = HashMap::new();
        let mut default = None;

        for config in configs.iter().filter(|c| c.enabled) {
            let source = UpstreamSource::from(config);

            if source.scope.is_empty() {
                if default.is_some() {
                    warn!("Ignoring upstream {}: a default upstream is already configured", source.name);
                    continue;
                }
                default = Some(sources.len());
            } else {
                if scopes.contains_key(&source.scope) {
                    warn!("Ignoring upstream {}: scope {} is already routed", source.name, source.scope);
                    continue;
                }
                scopes.insert(source.scope.clone(), sources.len());
            }

            info!(
                "Upstream {} -> {} ({})",
                source.name,
                source.url,
                if source.scope.is_empty() { "default" } else { source.scope.as_str() }
            );
            sources.push(source);
        }

        if default.is_none() {
            warn!("No default upstream configured; unscoped packages will not be proxied");
        }

        Self {
            sources,
            scopes,
            default,
        }
    }

    pub fn sources(&self) -> &[UpstreamSource] {
        &self.sources
    }

    pub fn default_source(&self) -> Option<&UpstreamSource> {
        self.default.map(|index| &self.sources[index])
    }

    /// Scoped names route by their `@scope` segment, everything else to the default.
    pub fn resolve(&self, package: &str) -> Result<&UpstreamSource, ApiError> {
        if let Some(scope) = scope_of(package) {
            if let Some(&index) = self.scopes.get(scope) {
                return Ok(&self.sources[index]);
            }
        }

        self.default_source().ok_or_else(|| {
            ApiError::NotFound(format!("no upstream configured for package '{package}'"))
        })
    }
}

fn scope_of(package: &str) -> Option<&str> {
    if !package.starts_with('@') {
        return None;
    }
    package.find('/').map(|index| &package[..index])
}

/// Stateless reader of upstream metadata and tarballs.
#[derive(Debug, Clone)]
pub struct UpstreamFetcher {
    client: reqwest::Client,
    metadata_limit: usize,
    tarball_limit: usize,
}

impl UpstreamFetcher {
    pub fn new() -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cellar/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(|e| ApiError::InternalServerError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            metadata_limit: METADATA_LIMIT,
            tarball_limit: TARBALL_LIMIT,
        }
    }

    pub fn with_limits(mut self, metadata_limit: usize, tarball_limit: usize) -> Self {
        self.metadata_limit = metadata_limit;
        self.tarball_limit = tarball_limit;
        self
    }

    /// `{base}/{segment}/{segment}` with every segment percent-encoded.
    pub fn package_url(source: &UpstreamSource, package: &str) -> String {
        let encoded = package
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{encoded}", source.url)
    }

    pub fn tarball_url(source: &UpstreamSource, package: &str, filename: &str) -> String {
        format!(
            "{}/-/{}",
            Self::package_url(source, package),
            utf8_percent_encode(filename, PATH_SEGMENT)
        )
    }

    /// Fetches and validates a metadata document; the bytes returned always parse as JSON.
    pub async fn fetch_metadata(&self, source: &UpstreamSource, package: &str) -> Result<Vec<u8>, ApiError> {
        let url = Self::package_url(source, package);
        let not_found = ApiError::NotFound(format!("package '{package}' not found"));
        let body = self.get(source, &url, self.metadata_limit, not_found).await?;

        if body.is_empty() {
            return Err(ApiError::integrity(
                format!("empty metadata response from upstream {}", source.name),
                &body,
            ));
        }

        if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
            return Err(ApiError::integrity(
                format!("malformed metadata for '{package}' from upstream {}", source.name),
                &body,
            ));
        }

        debug!("Fetched metadata for {package} from {} ({} bytes)", source.name, body.len());
        Ok(body)
    }

    pub async fn fetch_tarball(
        &self,
        source: &UpstreamSource,
        package: &str,
        filename: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let url = Self::tarball_url(source, package, filename);
        let not_found = ApiError::NotFound(format!("tarball '{filename}' of '{package}' not found"));
        let body = self.get(source, &url, self.tarball_limit, not_found).await?;

        debug!("Fetched tarball {filename} from {} ({} bytes)", source.name, body.len());
        Ok(body)
    }

    async fn get(
        &self,
        source: &UpstreamSource,
        url: &str,
        limit: usize,
        not_found: ApiError,
    ) -> Result<Vec<u8>, ApiError> {
        let unavailable = |status: Option<u16>, message: String| ApiError::UpstreamUnavailable {
            upstream: source.name.clone(),
            status,
            message,
        };

        debug!("GET {url} via upstream {}", source.name);
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .timeout(source.timeout)
            .send()
            .await
            .map_err(|e| unavailable(None, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found);
        }
        if !status.is_success() {
            return Err(unavailable(
                Some(status.as_u16()),
                format!("upstream {} returned status {}", source.name, status.as_u16()),
            ));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| unavailable(None, format!("failed reading response body: {e}")))?
        {
            if body.len() + chunk.len() > limit {
                return Err(ApiError::integrity(
                    format!("response from upstream {} exceeds {limit} bytes", source.name),
                    &body,
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}
