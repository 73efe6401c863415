use crate::error::ApiError;
use crate::models::{PackageSummary, StorageStats};
use log::{debug, info, warn};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const METADATA_FILE: &str = "metadata.json";
const TARBALLS_DIR: &str = "tarballs";

/// On-disk package store rooted at `<base>/packages`.
///
/// Layout: `<root>/<package-name>/metadata.json` and `<root>/<package-name>/tarballs/<file>`.
/// Writes go to a temporary sibling and are renamed into place, so readers see either
/// the previous or the new file.
#[derive(Debug)]
pub struct LocalStorage {
    packages_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let packages_dir = base.as_ref().join("packages");
        fs::create_dir_all(&packages_dir)?;
        let packages_dir = packages_dir.canonicalize()?;

        info!("Package store initialized at: {}", packages_dir.display());
        Ok(Self { packages_dir })
    }

    pub fn root(&self) -> &Path {
        &self.packages_dir
    }

    /// Accepts `name` or `@scope/name` and nothing that could address another
    /// package's directory or anything outside the store.
    pub fn validate_package_name(name: &str) -> Result<(), ApiError> {
        if name.is_empty() {
            return Err(ApiError::BadRequest("package name must not be empty".to_string()));
        }
        if name.starts_with('/') || name.starts_with('\\') || Path::new(name).is_absolute() {
            return Err(ApiError::BadRequest(format!(
                "package name '{name}' must not be an absolute path"
            )));
        }
        if name.contains('\\') {
            return Err(ApiError::BadRequest(format!(
                "package name '{name}' must not contain backslashes"
            )));
        }

        let segments: Vec<&str> = name.split('/').collect();
        for segment in &segments {
            validate_segment("package name", name, segment)?;
        }

        match segments.as_slice() {
            [single] if !single.starts_with('@') => Ok(()),
            [scope, package] if scope.len() > 1 && scope.starts_with('@') && !package.starts_with('@') => {
                Ok(())
            }
            _ => Err(ApiError::BadRequest(format!(
                "package name '{name}' must be 'name' or '@scope/name'"
            ))),
        }
    }

    pub fn validate_filename(filename: &str) -> Result<(), ApiError> {
        if filename.contains('/') || filename.contains('\\') {
            return Err(ApiError::BadRequest(format!(
                "filename '{filename}' must not contain path separators"
            )));
        }
        validate_segment("filename", filename, filename)
    }

    /// Resolves `candidate` through any existing symlinks and requires the result to stay
    /// strictly inside the package directory.
    fn contain(&self, candidate: PathBuf) -> Result<PathBuf, ApiError> {
        let mut existing = candidate.as_path();
        let mut missing = Vec::new();

        let resolved = loop {
            match existing.canonicalize() {
                Ok(resolved) => break resolved,
                Err(_) => {
                    let name = existing.file_name().ok_or_else(|| {
                        ApiError::BadRequest(format!("invalid path '{}'", candidate.display()))
                    })?;
                    missing.push(name.to_owned());
                    existing = existing.parent().ok_or_else(|| {
                        ApiError::BadRequest(format!("invalid path '{}'", candidate.display()))
                    })?;
                }
            }
        };

        let mut full = resolved;
        for component in missing.iter().rev() {
            full.push(component);
        }

        if full == self.packages_dir || !full.starts_with(&self.packages_dir) {
            warn!("Rejected path outside the package store: {}", candidate.display());
            return Err(ApiError::BadRequest(format!(
                "path '{}' escapes the package store",
                candidate.display()
            )));
        }
        Ok(full)
    }

    fn package_dir(&self, name: &str) -> Result<PathBuf, ApiError> {
        Self::validate_package_name(name)?;
        self.contain(self.packages_dir.join(name))
    }

    fn metadata_path(&self, name: &str) -> Result<PathBuf, ApiError> {
        let dir = self.package_dir(name)?;
        self.contain(dir.join(METADATA_FILE))
    }

    fn tarball_path(&self, name: &str, filename: &str) -> Result<PathBuf, ApiError> {
        Self::validate_filename(filename)?;
        let dir = self.package_dir(name)?;
        self.contain(dir.join(TARBALLS_DIR).join(filename))
    }

    /// True when the package has a metadata document that parses.
    pub fn has(&self, name: &str) -> bool {
        self.get_metadata(name).is_ok()
    }

    /// Reads the metadata document. A corrupt document is deleted and reported as not found.
    pub fn get_metadata(&self, name: &str) -> Result<Value, ApiError> {
        let path = self.metadata_path(name)?;

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ApiError::NotFound(format!("package '{name}' not found")));
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&data) {
            Ok(metadata) if metadata.is_object() => Ok(metadata),
            _ => {
                let failure = ApiError::integrity(format!("corrupt metadata for '{name}'"), &data);
                warn!("{failure}; removing {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove corrupt metadata {}: {e}", path.display());
                }
                Err(ApiError::NotFound(format!("package '{name}' not found")))
            }
        }
    }

    /// Validates and atomically replaces the metadata document.
    pub fn save_metadata(&self, name: &str, data: &[u8]) -> Result<(), ApiError> {
        let path = self.metadata_path(name)?;

        match serde_json::from_slice::<Value>(data) {
            Ok(metadata) if metadata.is_object() => {}
            _ => {
                return Err(ApiError::integrity(
                    format!("refusing to store malformed metadata for '{name}'"),
                    data,
                ));
            }
        }

        write_atomic(&path, data)?;
        debug!("Saved metadata for {name} ({} bytes)", data.len());
        Ok(())
    }

    pub fn save_metadata_value(&self, name: &str, metadata: &Value) -> Result<(), ApiError> {
        let data = serde_json::to_vec(metadata)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to encode metadata: {e}")))?;
        self.save_metadata(name, &data)
    }

    pub fn has_tarball(&self, name: &str, filename: &str) -> bool {
        self.tarball_path(name, filename)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    pub fn get_tarball(&self, name: &str, filename: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.tarball_path(name, filename)?;

        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ApiError::NotFound(format!("tarball '{filename}' of '{name}' not found"))
            } else {
                e.into()
            }
        })
    }

    pub fn save_tarball(&self, name: &str, filename: &str, data: &[u8]) -> Result<(), ApiError> {
        let path = self.tarball_path(name, filename)?;
        write_atomic(&path, data)?;
        debug!("Saved tarball {filename} for {name} ({} bytes)", data.len());
        Ok(())
    }

    /// Removes the package directory. Returns false when nothing was stored.
    pub fn delete_package(&self, name: &str) -> Result<bool, ApiError> {
        let dir = self.package_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)?;

        // Drop an emptied scope directory; a non-empty one stays.
        if let Some(parent) = dir.parent() {
            if parent != self.packages_dir {
                let _ = fs::remove_dir(parent);
            }
        }

        info!("Deleted package {name} from storage");
        Ok(true)
    }

    pub fn delete_tarball(&self, name: &str, filename: &str) -> Result<(), ApiError> {
        let path = self.tarball_path(name, filename)?;

        fs::remove_file(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ApiError::NotFound(format!("tarball '{filename}' of '{name}' not found"))
            } else {
                e.into()
            }
        })?;

        info!("Deleted tarball {filename} of {name}");
        Ok(())
    }

    /// Total bytes stored for a package; zero when absent.
    pub fn package_size(&self, name: &str) -> Result<u64, ApiError> {
        let dir = self.package_dir(name)?;
        Ok(directory_size(&dir))
    }

    /// Summaries of every stored package, sorted by name.
    pub fn list(&self) -> Result<Vec<PackageSummary>, ApiError> {
        let mut summaries = Vec::new();

        for entry in WalkDir::new(&self.packages_dir)
            .into_iter()
            .filter_entry(|entry| !is_tarball_dir(entry.path()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() || entry.file_name() != METADATA_FILE {
                continue;
            }

            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let Ok(relative) = dir.strip_prefix(&self.packages_dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.is_empty() {
                continue;
            }

            let metadata = match fs::read(entry.path())
                .ok()
                .and_then(|data| serde_json::from_slice::<Value>(&data).ok())
            {
                Some(metadata) => metadata,
                None => {
                    warn!("Skipping unreadable metadata while listing: {name}");
                    continue;
                }
            };

            let updated_at = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|modified| chrono::DateTime::<chrono::Utc>::from(modified).to_rfc3339())
                .unwrap_or_default();

            summaries.push(PackageSummary {
                description: metadata
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                latest: metadata
                    .get("dist-tags")
                    .and_then(|tags| tags.get("latest"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                private: metadata.get("_upstream").is_none(),
                updated_at,
                name,
            });
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Stored packages whose name contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Result<Vec<PackageSummary>, ApiError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ApiError::BadRequest("search query must not be empty".to_string()));
        }

        Ok(self
            .list()?
            .into_iter()
            .filter(|summary| summary.name.to_lowercase().contains(&needle))
            .collect())
    }

    pub fn stats(&self) -> Result<StorageStats, ApiError> {
        let mut stats = StorageStats::default();

        for entry in WalkDir::new(&self.packages_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() == METADATA_FILE && !is_tarball_dir(entry.path().parent().unwrap_or(entry.path())) {
                stats.total_packages += 1;
            }
            stats.total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }

        Ok(stats)
    }
}

fn validate_segment(kind: &str, value: &str, segment: &str) -> Result<(), ApiError> {
    if segment.is_empty() {
        return Err(ApiError::BadRequest(format!("{kind} '{value}' has an empty path segment")));
    }
    if segment.contains('\0') {
        return Err(ApiError::BadRequest(format!("{kind} must not contain null bytes")));
    }
    if segment == "." || segment == ".." {
        return Err(ApiError::BadRequest(format!(
            "{kind} '{value}' must not contain relative path segments"
        )));
    }
    if !matches!(
        Path::new(segment).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    ) {
        return Err(ApiError::BadRequest(format!("invalid {kind} '{value}'")));
    }
    Ok(())
}

/// A `tarballs` directory that sits next to a metadata document.
fn is_tarball_dir(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == TARBALLS_DIR)
        && path
            .parent()
            .is_some_and(|parent| parent.join(METADATA_FILE).is_file())
}

fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ApiError> {
    let parent = path
        .parent()
        .ok_or_else(|| ApiError::StorageError(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
