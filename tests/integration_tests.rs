use base64::prelude::*;
use cellar::config::{UpstreamConfig, WebhookConfig};
use cellar::services::webhook::{SIGNATURE_HEADER, sign};
use cellar::{AppConfig, AppState};
use httpmock::prelude::*;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::{Value, json};
use serial_test::serial;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

const ADMIN: (&str, &str) = ("root", "root-password");
const HOOK_SECRET: &str = "hook-secret";

struct TestRegistry {
    rocket: rocket::Rocket<rocket::Build>,
    temp_dir: TempDir,
}

fn upstream(name: &str, url: String, scope: &str) -> UpstreamConfig {
    UpstreamConfig {
        name: name.to_string(),
        url,
        scope: scope.to_string(),
        timeout_seconds: 5,
        enabled: true,
    }
}

fn create_test_registry(upstreams: Vec<UpstreamConfig>) -> TestRegistry {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let test_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);

    let config = AppConfig {
        storage_dir: temp_dir.path().join("data").to_string_lossy().into_owned(),
        database_url: temp_dir
            .path()
            .join(format!("test_{test_id}.db"))
            .to_string_lossy()
            .into_owned(),
        upstreams,
        allow_registration: true,
        admin_username: Some(ADMIN.0.to_string()),
        admin_password: Some(ADMIN.1.to_string()),
        webhook: WebhookConfig {
            retry_delay_ms: 10,
            timeout_secs: 2,
            ..WebhookConfig::default()
        },
        ..AppConfig::default()
    };

    let state = cellar::build_state(config).expect("Failed to build state");
    let rocket = cellar::build_rocket(state).expect("Failed to build rocket");
    TestRegistry { rocket, temp_dir }
}

fn login(client: &Client, name: &str, password: &str) -> String {
    let response = client
        .put(format!("/-/user/org.couchdb.user:{name}"))
        .header(ContentType::JSON)
        .body(json!({ "name": name, "password": password, "email": format!("{name}@example.com") }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Created);
    let body: Value = response.into_json().expect("login response");
    body["token"].as_str().expect("token").to_string()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn publish_body(name: &str, version: &str) -> String {
    let filename = format!("{}-{version}.tgz", name.rsplit('/').next().unwrap());
    json!({
        "_id": name,
        "name": name,
        "description": "pads strings on the left",
        "dist-tags": { "latest": version },
        "versions": {
            version: {
                "name": name,
                "version": version,
                "dist": {
                    "shasum": "abc123",
                    "tarball": format!("http://localhost:4873/{name}/-/{filename}")
                }
            }
        },
        "_attachments": {
            filename: {
                "content_type": "application/octet-stream",
                "data": BASE64_STANDARD.encode(format!("tarball of {version}")),
                "length": 16
            }
        }
    })
    .to_string()
}

#[test]
#[serial]
fn test_health_check() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");

    let response = client.get("/-/health").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().expect("json body");
    assert_eq!(body["status"], "ok");
}

#[test]
#[serial]
fn test_publish_scenario() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");
    let bob = login(&client, "bob", "bob-password");
    let root = login(&client, ADMIN.0, ADMIN.1);

    // First publish creates the package and makes alice its owner
    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::Created);
    let body: Value = response.into_json().expect("publish response");
    assert_eq!(body["ok"], true);

    let owners: Value = client
        .get("/-/api/admin/packages/leftpad/owners")
        .header(bearer(&root))
        .dispatch()
        .into_json()
        .expect("owners");
    assert_eq!(owners.as_array().unwrap().len(), 1);
    assert_eq!(owners[0]["username"], "alice");

    let metadata: Value = client
        .get("/leftpad")
        .header(Header::new("Host", "registry.test"))
        .dispatch()
        .into_json()
        .expect("metadata");
    assert_eq!(
        metadata["versions"]["1.0.0"]["dist"]["tarball"],
        "http://registry.test/leftpad/-/leftpad-1.0.0.tgz"
    );

    let tarball = client.get("/leftpad/-/leftpad-1.0.0.tgz").dispatch();
    assert_eq!(tarball.status(), Status::Ok);
    assert_eq!(tarball.into_bytes().unwrap(), b"tarball of 1.0.0");

    // Same version again is a conflict and changes nothing
    let metadata_path = registry.temp_dir.path().join("data/packages/leftpad/metadata.json");
    let before = std::fs::read(&metadata_path).unwrap();
    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::Conflict);
    assert_eq!(std::fs::read(&metadata_path).unwrap(), before);

    // bob does not own the package
    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&bob))
        .body(publish_body("leftpad", "1.0.1"))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    // Unpublish: bob is not a maintainer, alice is
    let response = client.delete("/leftpad").header(bearer(&bob)).dispatch();
    assert_eq!(response.status(), Status::Forbidden);
    let response = client.delete("/leftpad/-rev/1-leftpad").header(bearer(&alice)).dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(!metadata_path.exists());
}

#[test]
#[serial]
fn test_publish_requires_token() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");

    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
#[serial]
fn test_traversal_names_are_rejected() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");

    let response = client
        .put("/..%2F..%2Fetc")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("../../etc", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    assert!(!registry.temp_dir.path().join("etc").exists());

    let response = client.get("/leftpad/-/..%2F..%2Fsecret").dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
#[serial]
fn test_read_through_caches_metadata_and_tarballs() {
    let server = MockServer::start();
    let metadata_mock = server.mock(|when, then| {
        when.method(GET).path("/lodash");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "lodash",
                "dist-tags": { "latest": "4.17.21" },
                "versions": {
                    "4.17.21": {
                        "dist": { "tarball": "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz" }
                    }
                }
            }));
    });
    let tarball_mock = server.mock(|when, then| {
        when.method(GET).path("/lodash/-/lodash-4.17.21.tgz");
        then.status(200).body("lodash bytes");
    });

    let registry = create_test_registry(vec![upstream("npmjs", server.base_url(), "")]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");

    for _ in 0..2 {
        let metadata: Value = client
            .get("/lodash")
            .header(Header::new("Host", "localhost:4873"))
            .dispatch()
            .into_json()
            .expect("metadata");
        assert_eq!(metadata["_upstream"], "npmjs");
        assert_eq!(
            metadata["versions"]["4.17.21"]["dist"]["tarball"],
            "http://localhost:4873/lodash/-/lodash-4.17.21.tgz"
        );

        let tarball = client.get("/lodash/-/lodash-4.17.21.tgz").dispatch();
        assert_eq!(tarball.into_bytes().unwrap(), b"lodash bytes");
    }

    metadata_mock.assert_hits(1);
    tarball_mock.assert_hits(1);

    let listing: Value = client.get("/-/api/packages").dispatch().into_json().expect("listing");
    assert_eq!(listing[0]["name"], "lodash");
    assert_eq!(listing[0]["private"], false);
}

#[test]
#[serial]
fn test_scoped_packages_route_to_their_upstream() {
    let public = MockServer::start();
    let private = MockServer::start();
    let public_mock = public.mock(|when, then| {
        when.method(GET).path("/@other/thing");
        then.status(200).json_body(json!({ "name": "@other/thing", "versions": {} }));
    });
    let private_mock = private.mock(|when, then| {
        when.method(GET).path("/@acme/widget");
        then.status(200).json_body(json!({ "name": "@acme/widget", "versions": {} }));
    });

    let registry = create_test_registry(vec![
        upstream("npmjs", public.base_url(), ""),
        upstream("acme", private.base_url(), "@acme"),
    ]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");

    let acme: Value = client.get("/@acme/widget").dispatch().into_json().expect("acme");
    assert_eq!(acme["_upstream"], "acme");
    let other: Value = client.get("/@other%2fthing").dispatch().into_json().expect("other");
    assert_eq!(other["_upstream"], "npmjs");

    private_mock.assert_hits(1);
    public_mock.assert_hits(1);
}

#[test]
#[serial]
fn test_upstream_failures_map_to_statuses() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(GET).path("/flaky");
        then.status(503);
    });
    server.mock(|when, then| {
        when.method(GET).path("/garbage");
        then.status(200).body("<html>not json</html>");
    });

    let registry = create_test_registry(vec![upstream("npmjs", server.base_url(), "")]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");

    assert_eq!(client.get("/missing").dispatch().status(), Status::NotFound);
    assert_eq!(client.get("/flaky").dispatch().status(), Status::BadGateway);

    let response = client.get("/garbage").dispatch();
    assert_eq!(response.status(), Status::BadGateway);
    let body: Value = response.into_json().expect("error body");
    assert!(body["error"].as_str().unwrap().contains("not json"));
}

#[test]
#[serial]
fn test_corrupt_metadata_is_refetched() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/leftpad");
        then.status(200).json_body(json!({ "name": "leftpad", "versions": {} }));
    });

    let registry = create_test_registry(vec![upstream("npmjs", server.base_url(), "")]);
    let metadata_path = registry.temp_dir.path().join("data/packages/leftpad/metadata.json");
    std::fs::create_dir_all(metadata_path.parent().unwrap()).unwrap();
    std::fs::write(&metadata_path, b"{ truncated").unwrap();

    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let response = client.get("/leftpad").dispatch();

    assert_eq!(response.status(), Status::Ok);
    mock.assert_hits(1);
    let stored: Value = serde_json::from_slice(&std::fs::read(&metadata_path).unwrap()).unwrap();
    assert_eq!(stored["name"], "leftpad");
}

#[test]
#[serial]
fn test_admin_surface_requires_admin_role() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");
    let root = login(&client, ADMIN.0, ADMIN.1);

    let response = client.get("/-/api/admin/gc/stats").header(bearer(&alice)).dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    let response = client.get("/-/api/admin/gc/stats").header(bearer(&root)).dispatch();
    assert_eq!(response.status(), Status::Ok);

    client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch();

    let analysis: Value = client
        .get("/-/api/admin/gc/analyze?days=30&minVersions=0")
        .header(bearer(&root))
        .dispatch()
        .into_json()
        .expect("analysis");
    assert_eq!(analysis["policy"]["maxInactiveDays"], 30);
    assert_eq!(analysis["policy"]["minVersionsToKeep"], 5);
    assert!(analysis["candidates"].as_array().unwrap().is_empty());

    let report: Value = client
        .post("/-/api/admin/gc/run")
        .header(ContentType::JSON)
        .header(bearer(&root))
        .body(json!({}).to_string())
        .dispatch()
        .into_json()
        .expect("report");
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["ok"], true);

    let response = client
        .post("/-/api/admin/packages/leftpad/deprecate")
        .header(ContentType::JSON)
        .header(bearer(&root))
        .body(json!({ "reason": "use padStart" }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .post("/-/api/admin/packages/unknown/deprecate")
        .header(ContentType::JSON)
        .header(bearer(&root))
        .body(json!({ "reason": "gone" }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);

    let stats: Value = client
        .get("/-/api/admin/gc/stats")
        .header(bearer(&root))
        .dispatch()
        .into_json()
        .expect("stats");
    assert_eq!(stats["totalPackages"], 1);
    assert_eq!(stats["deprecatedPackages"], 1);
}

#[test]
#[serial]
fn test_registration_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let config = AppConfig {
        storage_dir: temp_dir.path().join("data").to_string_lossy().into_owned(),
        database_url: temp_dir.path().join("closed.db").to_string_lossy().into_owned(),
        upstreams: vec![],
        ..AppConfig::default()
    };
    assert!(!config.allow_registration);

    let rocket = cellar::build_rocket(cellar::build_state(config).unwrap()).unwrap();
    let client = Client::tracked(rocket).expect("valid rocket instance");
    let response = client
        .put("/-/user/org.couchdb.user:mallory")
        .header(ContentType::JSON)
        .body(json!({ "name": "mallory", "password": "x" }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);
}

#[test]
#[serial]
fn test_search_matches_stored_package_names() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");

    for (path, name) in [("/leftpad", "leftpad"), ("/@acme/padkit", "@acme/padkit"), ("/lodash", "lodash")] {
        let response = client
            .put(path)
            .header(ContentType::JSON)
            .header(bearer(&alice))
            .body(publish_body(name, "1.0.0"))
            .dispatch();
        assert_eq!(response.status(), Status::Created);
    }

    let body: Value = client
        .get("/-/api/search?q=PAD")
        .dispatch()
        .into_json()
        .expect("search results");
    assert_eq!(body["total"], 2);
    assert_eq!(body["packages"][0]["name"], "@acme/padkit");
    assert_eq!(body["packages"][1]["name"], "leftpad");
    assert_eq!(body["packages"][1]["description"], "pads strings on the left");

    let none: Value = client.get("/-/api/search?q=zzz").dispatch().into_json().expect("empty");
    assert_eq!(none["total"], 0);

    assert_eq!(client.get("/-/api/search?q=").dispatch().status(), Status::BadRequest);
    assert_eq!(client.get("/-/api/search").dispatch().status(), Status::BadRequest);
}

#[test]
#[serial]
fn test_owners_manage_collaborators() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");
    let bob = login(&client, "bob", "bob-password");

    let response = client
        .put("/@acme/widget")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("@acme/widget", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::Created);

    let collaborators = "/-/package/@acme%2Fwidget/collaborators";

    // bob cannot add himself to a package he does not own
    let response = client
        .put(format!("{collaborators}/bob"))
        .header(bearer(&bob))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .put(format!("{collaborators}/bob"))
        .header(bearer(&alice))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let listed: Value = client.get(collaborators).dispatch().into_json().expect("collaborators");
    assert_eq!(listed["alice"]["name"], "alice");
    assert_eq!(listed["bob"]["email"], "bob@example.com");

    // As an owner bob may now publish
    let response = client
        .put("/@acme/widget")
        .header(ContentType::JSON)
        .header(bearer(&bob))
        .body(publish_body("@acme/widget", "1.0.1"))
        .dispatch();
    assert_eq!(response.status(), Status::Created);

    // Owners cannot drop themselves, but can drop each other
    let response = client
        .delete(format!("{collaborators}/alice"))
        .header(bearer(&alice))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .delete(format!("{collaborators}/alice"))
        .header(bearer(&bob))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let listed: Value = client.get(collaborators).dispatch().into_json().expect("collaborators");
    assert!(listed.get("alice").is_none());
    assert!(listed.get("bob").is_some());

    let response = client.put(format!("{collaborators}/bob")).dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        client.get("/-/package/ghost/collaborators").dispatch().status(),
        Status::NotFound
    );
}

#[test]
#[serial]
fn test_nested_package_names_are_rejected() {
    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).expect("valid rocket instance");
    let alice = login(&client, "alice", "alice-password");
    let bob = login(&client, "bob", "bob-password");

    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::Created);

    let response = client
        .put("/leftpad%2Ftarballs")
        .header(ContentType::JSON)
        .header(bearer(&bob))
        .body(publish_body("leftpad/tarballs", "1.0.0"))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);

    let response = client.delete("/leftpad%2Ftarballs").header(bearer(&bob)).dispatch();
    assert_eq!(response.status(), Status::BadRequest);

    let tarball = client.get("/leftpad/-/leftpad-1.0.0.tgz").dispatch();
    assert_eq!(tarball.status(), Status::Ok);
    assert_eq!(client.get("/leftpad/-/metadata.json").dispatch().status(), Status::NotFound);
}

fn signed_with_hook_secret(req: &HttpMockRequest) -> bool {
    let Some(body) = req.body.as_deref() else {
        return false;
    };
    let Ok(expected) = sign(HOOK_SECRET, body) else {
        return false;
    };
    req.headers.as_ref().is_some_and(|headers| {
        headers
            .iter()
            .any(|(key, value)| key.eq_ignore_ascii_case(SIGNATURE_HEADER) && *value == expected)
    })
}

#[rocket::async_test]
#[serial]
async fn test_publish_fires_signed_webhook() {
    use rocket::local::asynchronous::Client;

    let receiver = MockServer::start_async().await;
    let hook_mock = receiver
        .mock_async(|when, then| {
            when.method(POST)
                .path("/hooks")
                .header("x-cellar-event", "package:published")
                .body_contains("\"package\":\"leftpad\"")
                .matches(signed_with_hook_secret);
            then.status(200);
        })
        .await;
    let test_mock = receiver
        .mock_async(|when, then| {
            when.method(POST)
                .path("/hooks")
                .header("x-cellar-event", "webhook:test");
            then.status(202);
        })
        .await;

    let registry = create_test_registry(vec![]);
    let client = Client::tracked(registry.rocket).await.expect("valid rocket instance");

    let login = |name: &'static str, password: &'static str| {
        let client = &client;
        async move {
            let response = client
                .put(format!("/-/user/org.couchdb.user:{name}"))
                .header(ContentType::JSON)
                .body(json!({ "name": name, "password": password }).to_string())
                .dispatch()
                .await;
            let body: Value = response.into_json().await.expect("login response");
            body["token"].as_str().expect("token").to_string()
        }
    };
    let root = login(ADMIN.0, ADMIN.1).await;
    let alice = login("alice", "alice-password").await;

    let created: Value = client
        .post("/-/api/admin/webhooks")
        .header(ContentType::JSON)
        .header(bearer(&root))
        .body(
            json!({
                "name": "ci",
                "url": receiver.url("/hooks"),
                "secret": HOOK_SECRET,
                "events": ["package:published"]
            })
            .to_string(),
        )
        .dispatch()
        .await
        .into_json()
        .await
        .expect("webhook");
    assert!(created.get("secret").is_none());

    let response = client
        .put("/leftpad")
        .header(ContentType::JSON)
        .header(bearer(&alice))
        .body(publish_body("leftpad", "1.0.0"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let state = client.rocket().state::<AppState>().expect("state");
    state.webhooks.wait_idle().await;
    hook_mock.assert_hits_async(1).await;

    let tested: Value = client
        .post(format!("/-/api/admin/webhooks/{}/test", created["id"]))
        .header(bearer(&root))
        .dispatch()
        .await
        .into_json()
        .await
        .expect("test response");
    assert_eq!(tested["ok"], true);
    assert_eq!(tested["status"], 202);
    test_mock.assert_hits_async(1).await;
}
