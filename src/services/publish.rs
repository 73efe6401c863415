use crate::database::DatabaseService;
use crate::error::ApiError;
use crate::models::{AuthenticatedUser, NewPackageVersion, NpmPublishRequest, NpmPublishResponse, WebhookEvent};
use crate::services::storage::LocalStorage;
use crate::services::webhook::WebhookDispatcher;
use base64::prelude::*;
use log::{debug, info, warn};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Process-lifetime registry of per-package locks.
///
/// Entries are created on first use and never removed, so a waiter can never end up
/// holding a lock that a later caller no longer sees in the map.
#[derive(Debug, Default)]
pub struct PackageLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Waits for exclusive access to `name`. Distinct names never contend.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        self.handle(name).lock_owned().await
    }

    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialized publish and unpublish of packages into the local store.
#[derive(Debug)]
pub struct PublishCoordinator {
    storage: Arc<LocalStorage>,
    database: Arc<DatabaseService>,
    webhooks: Arc<WebhookDispatcher>,
    locks: PackageLocks,
}

impl PublishCoordinator {
    pub fn new(
        storage: Arc<LocalStorage>,
        database: Arc<DatabaseService>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            storage,
            database,
            webhooks,
            locks: PackageLocks::new(),
        }
    }

    pub fn locks(&self) -> &PackageLocks {
        &self.locks
    }

    pub async fn publish(
        &self,
        name: &str,
        request: NpmPublishRequest,
        actor: &AuthenticatedUser,
    ) -> Result<NpmPublishResponse, ApiError> {
        LocalStorage::validate_package_name(name)?;

        if request.name != name {
            return Err(ApiError::BadRequest(format!(
                "Package name mismatch: URL has '{name}' but document has '{}'",
                request.name
            )));
        }
        if request.versions.is_empty() {
            return Err(ApiError::BadRequest("No versions provided in publish request".to_string()));
        }
        let new_versions = request.versions.len();

        let guard = self.locks.acquire(name).await;
        debug!("Publishing {name} as {}", actor.username);

        let (storage, database) = (Arc::clone(&self.storage), Arc::clone(&self.database));
        let (package, publisher) = (name.to_string(), actor.clone());
        let merged = run_blocking(move || {
            publish_locked(&storage, &database, &package, &request, &publisher)
        })
        .await?;
        drop(guard);

        let version_count = merged
            .get("versions")
            .and_then(Value::as_object)
            .map_or(0, Map::len);
        info!(
            "Published {name} ({new_versions} new version(s)) by {}",
            actor.username
        );

        self.webhooks
            .dispatch_async(
                WebhookEvent::PackagePublished,
                json!({
                    "package": name,
                    "publisher": actor.username,
                    "versions": merged.get("dist-tags").cloned().unwrap_or_else(|| json!({})),
                }),
            )
            .await;

        Ok(NpmPublishResponse {
            ok: true,
            id: name.to_string(),
            rev: format!("{version_count}-{name}"),
            success: true,
        })
    }

    /// Removes one tarball, or the whole package when `filename` is `None`.
    pub async fn unpublish(
        &self,
        name: &str,
        filename: Option<&str>,
        actor: &AuthenticatedUser,
    ) -> Result<(), ApiError> {
        LocalStorage::validate_package_name(name)?;
        if let Some(filename) = filename {
            LocalStorage::validate_filename(filename)?;
        }

        let guard = self.locks.acquire(name).await;

        let (storage, database) = (Arc::clone(&self.storage), Arc::clone(&self.database));
        let (package, file, operator) = (name.to_string(), filename.map(str::to_string), actor.clone());
        run_blocking(move || {
            unpublish_locked(&storage, &database, &package, file.as_deref(), &operator)
        })
        .await?;
        drop(guard);

        if filename.is_none() {
            self.webhooks
                .dispatch_async(
                    WebhookEvent::PackageUnpublished,
                    json!({ "package": name, "operator": actor.username }),
                )
                .await;
        }
        Ok(())
    }
}

/// Runs store and database work off the async executor.
async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("Publish task failed: {e}")))?
}

/// Publish steps that run while the package lock is held. Returns the merged metadata.
fn publish_locked(
    storage: &LocalStorage,
    database: &DatabaseService,
    name: &str,
    request: &NpmPublishRequest,
    actor: &AuthenticatedUser,
) -> Result<Value, ApiError> {
    let existing = match storage.get_metadata(name) {
        Ok(metadata) => Some(metadata),
        Err(ApiError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    let is_new = existing.is_none();

    if !is_new {
        check_publish_permission(database, name, actor)?;
    }

    if let Some(conflict) = existing.as_ref().and_then(|m| first_existing_version(m, request)) {
        return Err(ApiError::Conflict(format!(
            "Version {conflict} of {name} already exists"
        )));
    }

    let attachments = decode_attachments(request)?;

    // A new package gets its owner row before any file exists, so it is never
    // visible without one.
    if is_new {
        let claimed = database
            .upsert_package(name, None, None, true)
            .and_then(|_| database.add_owner(name, actor.user_id, true));
        if let Err(e) = claimed {
            discard_new_package(storage, database, name);
            return Err(e.into());
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let written = attachments
        .iter()
        .try_for_each(|(filename, data)| storage.save_tarball(name, filename, data))
        .and_then(|()| {
            let merged = merge_metadata(existing, request, &actor.username, &now);
            storage.save_metadata_value(name, &merged).map(|()| merged)
        });
    let merged = match written {
        Ok(merged) => merged,
        Err(e) => {
            if is_new {
                discard_new_package(storage, database, name);
            }
            return Err(e);
        }
    };

    let latest = merged
        .get("dist-tags")
        .and_then(|tags| tags.get("latest"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let description = merged
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    database.upsert_package(name, description, latest, true)?;
    database.record_versions(&NewPackageVersion::from_metadata(name, &merged, Some(&actor.username)))?;
    database.ensure_ledger_entry(name)?;
    Ok(merged)
}

fn discard_new_package(storage: &LocalStorage, database: &DatabaseService, name: &str) {
    if let Err(e) = storage.delete_package(name) {
        warn!("Failed to remove partial publish of {name}: {e}");
    }
    if let Err(e) = database.delete_package_rows(name) {
        warn!("Failed to remove rows of failed publish {name}: {e}");
    }
}

fn unpublish_locked(
    storage: &LocalStorage,
    database: &DatabaseService,
    name: &str,
    filename: Option<&str>,
    actor: &AuthenticatedUser,
) -> Result<(), ApiError> {
    let metadata = storage.get_metadata(name)?;
    if !actor.is_admin && !is_maintainer(&metadata, &actor.username) {
        return Err(ApiError::Forbidden(format!(
            "User {} is not a maintainer of {name}",
            actor.username
        )));
    }

    if let Some(filename) = filename {
        storage.delete_tarball(name, filename)?;
        info!("Unpublished {name}/-/{filename} by {}", actor.username);
        return Ok(());
    }

    storage.delete_package(name)?;
    database.delete_package_rows(name)?;
    info!("Unpublished {name} by {}", actor.username);
    Ok(())
}

fn check_publish_permission(
    database: &DatabaseService,
    name: &str,
    actor: &AuthenticatedUser,
) -> Result<(), ApiError> {
    if actor.is_admin {
        return Ok(());
    }

    let owners = database.get_owners(name)?;
    // No owner rows: the package is open to any authenticated publisher.
    if owners.is_empty()
        || owners
            .iter()
            .any(|owner| owner.user_id == actor.user_id && owner.can_publish)
    {
        return Ok(());
    }

    Err(ApiError::Forbidden(format!(
        "User {} does not have permission to publish {name}",
        actor.username
    )))
}

fn first_existing_version<'a>(existing: &Value, request: &'a NpmPublishRequest) -> Option<&'a str> {
    let versions = existing.get("versions").and_then(Value::as_object)?;
    request
        .versions
        .keys()
        .find(|version| versions.contains_key(version.as_str()))
        .map(String::as_str)
}

fn decode_attachments(request: &NpmPublishRequest) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    request
        .attachments
        .iter()
        .map(|(filename, attachment)| {
            // npm names attachments "<name>-<version>.tgz"; scoped names keep their scope prefix.
            let basename = filename.rsplit('/').next().unwrap_or(filename);
            LocalStorage::validate_filename(basename)?;
            let data = BASE64_STANDARD.decode(attachment.data.as_bytes()).map_err(|e| {
                ApiError::BadRequest(format!("Attachment {filename} is not valid base64: {e}"))
            })?;
            Ok((basename.to_string(), data))
        })
        .collect()
}

fn with_object(doc: &mut Map<String, Value>, key: &str, update: impl FnOnce(&mut Map<String, Value>)) {
    if !doc.get(key).is_some_and(Value::is_object) {
        doc.insert(key.to_string(), Value::Object(Map::new()));
    }
    if let Some(Value::Object(map)) = doc.get_mut(key) {
        update(map);
    }
}

/// Folds an incoming publish document into the stored metadata.
pub fn merge_metadata(
    existing: Option<Value>,
    request: &NpmPublishRequest,
    actor: &str,
    now: &str,
) -> Value {
    let is_new = existing.is_none();
    let mut doc = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    doc.insert("_id".to_string(), json!(request.name));
    doc.insert("name".to_string(), json!(request.name));
    // Published packages are local from now on.
    doc.remove("_upstream");

    with_object(&mut doc, "versions", |versions| {
        for (version, descriptor) in &request.versions {
            versions.insert(version.clone(), descriptor.clone());
        }
    });

    with_object(&mut doc, "dist-tags", |tags| {
        for (tag, version) in &request.dist_tags {
            tags.insert(tag.clone(), json!(version));
        }
    });

    with_object(&mut doc, "time", |time| {
        for version in request.versions.keys() {
            time.insert(version.clone(), json!(now));
        }
        if is_new || !time.contains_key("created") {
            time.insert("created".to_string(), json!(now));
        }
        time.insert("modified".to_string(), json!(now));
    });

    let maintainers = doc.entry("maintainers").or_insert_with(|| json!([]));
    if !maintainers.is_array() {
        *maintainers = json!([]);
    }
    if let Value::Array(list) = maintainers {
        if !list.iter().any(|m| maintainer_name(m) == Some(actor)) {
            list.push(json!({ "name": actor }));
        }
    }

    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        doc.insert("description".to_string(), json!(description));
    }
    if let Some(readme) = request.readme.as_deref().filter(|r| !r.is_empty()) {
        doc.insert("readme".to_string(), json!(readme));
    }

    Value::Object(doc)
}

fn maintainer_name(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(name) => Some(name.as_str()),
        other => other.get("name").and_then(Value::as_str),
    }
}

pub fn is_maintainer(metadata: &Value, username: &str) -> bool {
    metadata
        .get("maintainers")
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|m| maintainer_name(m) == Some(username)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::models::{RegisterRequest, ROLE_ADMIN, ROLE_DEVELOPER};
    use crate::services::AuthService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        storage: Arc<LocalStorage>,
        database: Arc<DatabaseService>,
        coordinator: PublishCoordinator,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).unwrap());
        let url = dir.path().join("publish.db");
        let database = Arc::new(DatabaseService::new(url.to_str().unwrap()).unwrap());
        let webhooks =
            Arc::new(WebhookDispatcher::new(Arc::clone(&database), &WebhookConfig::default()).unwrap());
        let coordinator =
            PublishCoordinator::new(Arc::clone(&storage), Arc::clone(&database), webhooks);
        Fixture {
            storage,
            database,
            coordinator,
            _dir: dir,
        }
    }

    fn user(database: &DatabaseService, name: &str, role: &str) -> AuthenticatedUser {
        let created = AuthService::register_user(
            database,
            RegisterRequest {
                name: name.to_string(),
                email: format!("{name}@example.com"),
                password: "password".to_string(),
                role: None,
            },
            role,
        )
        .unwrap();
        AuthenticatedUser {
            username: created.username.clone(),
            user_id: created.id,
            is_admin: created.is_admin(),
        }
    }

    fn publish_doc(name: &str, version: &str) -> NpmPublishRequest {
        let filename = format!("{}-{version}.tgz", name.rsplit('/').next().unwrap());
        serde_json::from_value(json!({
            "_id": name,
            "name": name,
            "description": "pads strings",
            "dist-tags": { "latest": version },
            "versions": {
                version: {
                    "name": name,
                    "version": version,
                    "dist": { "tarball": format!("http://localhost/{name}/-/{filename}") }
                }
            },
            "_attachments": {
                filename: {
                    "content_type": "application/octet-stream",
                    "data": BASE64_STANDARD.encode(format!("tarball {version}")),
                    "length": 12
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_same_name_critical_sections_are_serialized() {
        let locks = Arc::new(PackageLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let (locks, active, peak) = (Arc::clone(&locks), Arc::clone(&active), Arc::clone(&peak));
                tokio::spawn(async move {
                    let _guard = locks.acquire("leftpad").await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_names_do_not_block() {
        let locks = PackageLocks::new();
        let _held = locks.acquire("leftpad").await;

        let other = tokio::time::timeout(Duration::from_millis(200), locks.acquire("rightpad")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_new_package_makes_publisher_sole_owner() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);

        let response = fx
            .coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.rev, "1-leftpad");

        let owners = fx.database.get_owners("leftpad").unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, alice.user_id);
        assert!(owners[0].can_publish);

        let metadata = fx.storage.get_metadata("leftpad").unwrap();
        assert_eq!(metadata["dist-tags"]["latest"], "1.0.0");
        assert!(is_maintainer(&metadata, "alice"));
        assert!(metadata["time"]["modified"].is_string());
        assert_eq!(fx.storage.get_tarball("leftpad", "leftpad-1.0.0.tgz").unwrap(), b"tarball 1.0.0");
        assert_eq!(fx.database.count_versions("leftpad").unwrap(), 1);
        assert!(fx.database.get_ledger_entry("leftpad").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_first_publish_leaves_no_ownerless_package() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);
        let bob = user(&fx.database, "bob", ROLE_DEVELOPER);

        // A file where the tarballs directory belongs makes the tarball write fail.
        let package_dir = fx.storage.root().join("leftpad");
        std::fs::create_dir_all(&package_dir).unwrap();
        std::fs::write(package_dir.join("tarballs"), b"in the way").unwrap();

        let result = fx
            .coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
            .await;
        assert!(result.is_err());
        assert!(!package_dir.exists());
        assert!(fx.database.get_package_by_name("leftpad").unwrap().is_none());
        assert!(fx.database.get_owners("leftpad").unwrap().is_empty());

        // The name is still free; the next publisher becomes its owner.
        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &bob)
            .await
            .unwrap();
        let owners = fx.database.get_owners("leftpad").unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, bob.user_id);
    }

    #[tokio::test]
    async fn test_conflict_leaves_store_untouched() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);
        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
            .await
            .unwrap();

        let metadata_path = fx.storage.root().join("leftpad").join("metadata.json");
        let before = std::fs::read(&metadata_path).unwrap();

        let mut again = publish_doc("leftpad", "1.0.0");
        for attachment in again.attachments.values_mut() {
            attachment.data = BASE64_STANDARD.encode("different bytes");
        }
        let err = fx.coordinator.publish("leftpad", again, &alice).await.unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(std::fs::read(&metadata_path).unwrap(), before);
        assert_eq!(fx.storage.get_tarball("leftpad", "leftpad-1.0.0.tgz").unwrap(), b"tarball 1.0.0");
    }

    #[tokio::test]
    async fn test_concurrent_publish_of_same_version_yields_one_conflict() {
        let fx = Arc::new(fixture());
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let (fx, alice) = (Arc::clone(&fx), alice.clone());
                tokio::spawn(async move {
                    fx.coordinator
                        .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ApiError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden_and_admin_is_not() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);
        let bob = user(&fx.database, "bob", ROLE_DEVELOPER);
        let root = user(&fx.database, "root", ROLE_ADMIN);

        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
            .await
            .unwrap();

        let err = fx
            .coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.1"), &bob)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(!fx.storage.has_tarball("leftpad", "leftpad-1.0.1.tgz"));

        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.1"), &root)
            .await
            .unwrap();
        let metadata = fx.storage.get_metadata("leftpad").unwrap();
        assert_eq!(metadata["versions"].as_object().unwrap().len(), 2);
        assert_eq!(metadata["dist-tags"]["latest"], "1.0.1");
    }

    #[tokio::test]
    async fn test_package_without_owner_rows_is_open() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);
        let bob = user(&fx.database, "bob", ROLE_DEVELOPER);

        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.0.0"), &alice)
            .await
            .unwrap();
        fx.database.remove_owner("leftpad", alice.user_id).unwrap();

        fx.coordinator
            .publish("leftpad", publish_doc("leftpad", "1.1.0"), &bob)
            .await
            .unwrap();
        assert!(is_maintainer(&fx.storage.get_metadata("leftpad").unwrap(), "bob"));
    }

    #[tokio::test]
    async fn test_unpublish_rules() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);
        let bob = user(&fx.database, "bob", ROLE_DEVELOPER);

        fx.coordinator
            .publish("@acme/widget", publish_doc("@acme/widget", "1.0.0"), &alice)
            .await
            .unwrap();

        let err = fx.coordinator.unpublish("@acme/widget", None, &bob).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        fx.coordinator
            .unpublish("@acme/widget", Some("widget-1.0.0.tgz"), &alice)
            .await
            .unwrap();
        assert!(!fx.storage.has_tarball("@acme/widget", "widget-1.0.0.tgz"));
        assert!(fx.storage.has("@acme/widget"));

        fx.coordinator.unpublish("@acme/widget", None, &alice).await.unwrap();
        assert!(!fx.storage.has("@acme/widget"));
        assert!(fx.database.get_package_by_name("@acme/widget").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal_rejected_before_locking() {
        let fx = fixture();
        let alice = user(&fx.database, "alice", ROLE_DEVELOPER);

        let err = fx
            .coordinator
            .publish("../../etc", publish_doc("../../etc", "1.0.0"), &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(fx.coordinator.locks().is_empty());
    }

    #[test]
    fn test_merge_preserves_existing_tags_and_description() {
        let existing = json!({
            "name": "leftpad",
            "description": "old",
            "dist-tags": { "latest": "1.0.0", "beta": "1.1.0-beta" },
            "versions": { "1.0.0": {} },
            "maintainers": [{ "name": "alice", "email": "alice@example.com" }],
            "_upstream": "npmjs"
        });
        let mut request = publish_doc("leftpad", "1.2.0");
        request.description = Some(String::new());

        let merged = merge_metadata(Some(existing), &request, "alice", "2025-01-01T00:00:00Z");

        assert_eq!(merged["description"], "old");
        assert_eq!(merged["dist-tags"]["beta"], "1.1.0-beta");
        assert_eq!(merged["dist-tags"]["latest"], "1.2.0");
        assert_eq!(merged["maintainers"].as_array().unwrap().len(), 1);
        assert_eq!(merged["time"]["1.2.0"], "2025-01-01T00:00:00Z");
        assert!(merged.get("_upstream").is_none());
    }
}
