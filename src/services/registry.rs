use crate::error::ApiError;
use crate::models::NewPackageVersion;
use crate::services::storage::LocalStorage;
use crate::state::AppState;
use log::{debug, info, warn};
use serde_json::Value;

/// Marks metadata that was cached from an upstream rather than published here.
pub const UPSTREAM_KEY: &str = "_upstream";

/// Pull-through read path for metadata and tarballs.
pub struct RegistryService;

impl RegistryService {
    /// Points every `versions.*.dist.tarball` at this server.
    pub fn rewrite_tarball_urls(metadata: &mut Value, package: &str, base_url: &str) {
        let base = base_url.trim_end_matches('/');
        let Some(versions) = metadata.get_mut("versions").and_then(Value::as_object_mut) else {
            return;
        };

        for (version, descriptor) in versions.iter_mut() {
            let Some(dist) = descriptor.get_mut("dist").and_then(Value::as_object_mut) else {
                continue;
            };
            let Some(filename) = dist
                .get("tarball")
                .and_then(Value::as_str)
                .and_then(|url| url.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
            else {
                continue;
            };

            let rewritten = format!("{base}/{package}/-/{filename}");
            debug!("Rewrote tarball URL for {package}@{version} -> {rewritten}");
            dist.insert("tarball".to_string(), Value::String(rewritten));
        }
    }

    /// Serves metadata from the store, reading through to the upstream on a miss.
    pub async fn get_package_metadata(
        package: &str,
        base_url: &str,
        state: &AppState,
    ) -> Result<Value, ApiError> {
        LocalStorage::validate_package_name(package)?;

        let mut metadata = match state.storage.get_metadata(package) {
            Ok(metadata) => {
                debug!("Store hit for {package}");
                metadata
            }
            Err(ApiError::NotFound(_)) => Self::fetch_and_cache_metadata(package, state).await?,
            Err(e) => return Err(e),
        };

        state.access.record(package);
        Self::rewrite_tarball_urls(&mut metadata, package, base_url);
        Ok(metadata)
    }

    pub async fn get_package_tarball(
        package: &str,
        filename: &str,
        state: &AppState,
    ) -> Result<Vec<u8>, ApiError> {
        LocalStorage::validate_package_name(package)?;
        LocalStorage::validate_filename(filename)?;

        if state.storage.has_tarball(package, filename) {
            debug!("Store hit for tarball {package}/-/{filename}");
            return state.storage.get_tarball(package, filename);
        }

        let source = state.router.resolve(package)?;
        let data = state.fetcher.fetch_tarball(source, package, filename).await?;

        if let Err(e) = state.storage.save_tarball(package, filename, &data) {
            warn!("Failed to cache tarball {filename} of {package}: {e}");
        }

        info!(
            "Proxied tarball {package}/-/{filename} from {} ({} bytes)",
            source.name,
            data.len()
        );
        Ok(data)
    }

    async fn fetch_and_cache_metadata(package: &str, state: &AppState) -> Result<Value, ApiError> {
        let source = state.router.resolve(package)?;
        let body = state.fetcher.fetch_metadata(source, package).await?;

        let mut metadata: Value = serde_json::from_slice(&body).map_err(|e| {
            ApiError::integrity(format!("malformed metadata for '{package}': {e}"), &body)
        })?;
        let Some(document) = metadata.as_object_mut() else {
            return Err(ApiError::integrity(
                format!("metadata for '{package}' from {} is not an object", source.name),
                &body,
            ));
        };
        document.insert(UPSTREAM_KEY.to_string(), Value::String(source.name.clone()));

        state.storage.save_metadata_value(package, &metadata)?;
        Self::record_cached_package(package, &metadata, state);

        info!("Cached metadata for {package} from upstream {}", source.name);
        Ok(metadata)
    }

    /// Mirrors a cached package into the database so GC and stats can see it.
    fn record_cached_package(package: &str, metadata: &Value, state: &AppState) {
        let description = metadata
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = state
            .database
            .create_or_get_package(package, description, false)
            .and_then(|_| {
                state
                    .database
                    .record_versions(&NewPackageVersion::from_metadata(package, metadata, None))
            });

        if let Err(e) = result {
            warn!("Failed to record cached package {package}: {e}");
        }
    }
}
