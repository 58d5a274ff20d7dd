//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! fetch cache and the full crawl cycle end-to-end.

use availability_crawler::config::{
    load_config_with_hash, load_manifest_urls, Config, CrawlerConfig, FetchOptions, FetchPolicy,
    ManifestEntry, OutputConfig, UserAgentConfig,
};
use availability_crawler::crawler::{
    build_http_client, Coordinator, FetchSource, ManifestOutcome, ResourceFetcher,
};
use availability_crawler::state::{Jurisdiction, LeafKind};
use availability_crawler::storage::{RunStatus, SqliteStorage, Storage};
use availability_crawler::CrawlerError;
use chrono::{DateTime, TimeZone, Utc};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const T: i64 = 1_600_000_000;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Creates a test configuration with the given manifests
fn create_test_config(manifests: Vec<String>, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_manifests: 2,
            ..CrawlerConfig::default()
        },
        fetch: FetchOptions::default(),
        user_agent: user_agent(),
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        manifests: manifests
            .into_iter()
            .map(|url| ManifestEntry { url })
            .collect(),
    }
}

fn create_fetcher() -> (ResourceFetcher, Arc<Mutex<SqliteStorage>>) {
    let policy = FetchPolicy::default();
    let client = build_http_client(&user_agent(), policy.request_timeout).unwrap();
    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    (
        ResourceFetcher::new(client, Arc::clone(&storage), policy),
        storage,
    )
}

/// Builds a manifest document; each output is (type, path, comma-separated states)
fn manifest_body(base_url: &str, outputs: &[(&str, &str, &str)]) -> String {
    let output: Vec<serde_json::Value> = outputs
        .iter()
        .map(|(kind, url, states)| {
            let states: Vec<&str> = states.split(',').filter(|s| !s.is_empty()).collect();
            serde_json::json!({
                "type": kind,
                "url": format!("{}{}", base_url, url),
                "extension": { "state": states },
            })
        })
        .collect();

    serde_json::json!({
        "transactionTime": "2021-04-01T12:00:00Z",
        "request": format!("{}/$bulk-publish", base_url),
        "output": output,
        "error": [],
    })
    .to_string()
}

async fn mount_body(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fresh_cache_entry_served_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slots.ndjson"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"resourceType\":\"Slot\"}\n")
                .insert_header("cache-control", "max-age=600"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, _storage) = create_fetcher();
    let url = format!("{}/slots.ndjson", server.uri());
    let options = FetchOptions::default();

    let first = fetcher.fetch(&url, at(T), &options).await.unwrap();
    assert_eq!(first.source, FetchSource::Network);

    for offset in [1, 120, 599] {
        let cached = fetcher.fetch(&url, at(T + offset), &options).await.unwrap();
        assert_eq!(cached.source, FetchSource::Cache);
        assert_eq!(cached.body, first.body);
        assert_eq!(cached.status_code, 200);
        assert_eq!(cached.polling_hint_sec, Some((600 - offset) as u64));
    }
}

#[tokio::test]
async fn test_max_age_overrides_expires_and_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/locations.ndjson"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("loc")
                .insert_header("cache-control", "public, max-age=60")
                .insert_header("expires", "Wed, 21 Oct 2037 07:28:00 GMT"),
        )
        .mount(&server)
        .await;

    let (fetcher, storage) = create_fetcher();
    let url = format!("{}/locations.ndjson", server.uri());

    let fetched = fetcher
        .fetch(&url, at(T), &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(fetched.polling_hint_sec, Some(60));

    let entry = storage.lock().unwrap().get_cache_entry(&url).unwrap().unwrap();
    assert_eq!(entry.fetch_at, at(T));
    assert_eq!(entry.expires_at, at(T + 60));
}

#[tokio::test]
async fn test_not_modified_refreshes_entry_and_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schedules.ndjson"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("original schedules")
                .insert_header("etag", "\"v1\"")
                .insert_header("cache-control", "max-age=60"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schedules.ndjson"))
        .and(header_exists("If-None-Match"))
        .and(header_exists("If-Modified-Since"))
        .respond_with(ResponseTemplate::new(304).insert_header("cache-control", "max-age=300"))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, storage) = create_fetcher();
    let url = format!("{}/schedules.ndjson", server.uri());
    let options = FetchOptions::default();

    fetcher.fetch(&url, at(T), &options).await.unwrap();

    let revalidated = fetcher.fetch(&url, at(T + 200), &options).await.unwrap();
    assert_eq!(revalidated.source, FetchSource::Revalidated);
    assert_eq!(revalidated.body, "original schedules");

    let storage = storage.lock().unwrap();
    let entry = storage.get_cache_entry(&url).unwrap().unwrap();
    assert_eq!(entry.data, "original schedules");
    assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
    assert_eq!(entry.fetch_at, at(T + 200));
    assert_eq!(entry.expires_at, at(T + 500));

    let attempts = storage.get_fetch_attempts(&url).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].status_code, 304);
}

#[tokio::test]
async fn test_second_fetch_inside_window_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slots.ndjson"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slots")
                .insert_header("cache-control", "max-age=0"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, storage) = create_fetcher();
    let url = format!("{}/slots.ndjson", server.uri());
    let options = FetchOptions::default();

    fetcher.fetch(&url, at(T), &options).await.unwrap();

    let err = fetcher.fetch(&url, at(T + 30), &options).await.unwrap_err();
    match err {
        CrawlerError::RateLimited { elapsed_secs, .. } => assert_eq!(elapsed_secs, 30),
        other => panic!("Expected RateLimited, got {:?}", other),
    }

    assert_eq!(
        storage.lock().unwrap().get_fetch_attempts(&url).unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_crawl_manifest_writes_one_row_per_descriptor() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    let body = manifest_body(
        &base_url,
        &[
            ("Location", "/locations-1.ndjson", "MA,ZZ"),
            ("Location", "/locations-2.ndjson", ""),
            ("Schedule", "/schedules.ndjson", "ma, NY "),
            ("Slot", "/slots.ndjson", "MA"),
        ],
    );
    mount_body(&server, "/$bulk-publish", &body).await;
    mount_body(&server, "/locations-1.ndjson", "loc-1").await;
    mount_body(&server, "/locations-2.ndjson", "loc-2").await;
    mount_body(&server, "/schedules.ndjson", "sched").await;
    Mock::given(method("GET"))
        .and(path("/slots.ndjson"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let manifest_url = format!("{}/$bulk-publish", base_url);
    let config = create_test_config(vec![manifest_url], db_path.to_str().unwrap());

    let coordinator = Coordinator::new(config).expect("Failed to create coordinator");
    let manifest = coordinator.register_configured_manifests().unwrap().remove(0);

    let outcome = coordinator
        .crawl_manifest(&manifest, at(T))
        .await
        .expect("Leaf failures must not escape");
    let ManifestOutcome::Crawled {
        manifest_fetch_id,
        leaves_recorded,
    } = outcome
    else {
        panic!("Expected Crawled, got {:?}", outcome);
    };
    assert_eq!(leaves_recorded, 4);

    let storage = SqliteStorage::new(&db_path).expect("Failed to open DB");
    assert_eq!(storage.count_manifest_fetches(false).unwrap(), 1);

    let mut rows = Vec::new();
    for kind in LeafKind::ALL {
        rows.extend(storage.get_leaf_fetches(kind, manifest_fetch_id).unwrap());
    }
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.iter().filter(|r| r.contents.is_some()).count(), 3);
    assert!(rows
        .iter()
        .all(|r| r.manifest_fetch_id == manifest_fetch_id));

    let slots = storage
        .get_leaf_fetches(LeafKind::Slot, manifest_fetch_id)
        .unwrap();
    assert_eq!(slots[0].status_code, 500);
    assert!(slots[0].contents.is_none());
}

#[tokio::test]
async fn test_unknown_jurisdiction_code_dropped() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    let body = manifest_body(
        &base_url,
        &[("Location", "/locations.ndjson", "MA,ZZ")],
    );
    mount_body(&server, "/$bulk-publish", &body).await;
    mount_body(&server, "/locations.ndjson", "loc").await;

    let storage = SqliteStorage::new_in_memory().unwrap();
    let config = create_test_config(vec![format!("{}/$bulk-publish", base_url)], ":memory:");
    let coordinator = Coordinator::with_storage(config, storage).unwrap();
    let manifest = coordinator.register_configured_manifests().unwrap().remove(0);

    coordinator.crawl_manifest(&manifest, at(T)).await.unwrap();

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    let ma = Jurisdiction::from_code("MA").unwrap();
    assert_eq!(storage.count_jurisdiction_tags().unwrap(), vec![(ma, 1)]);
}

#[tokio::test]
async fn test_polling_hint_gates_next_manifest_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$bulk-publish"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"transactionTime": "2021-04-01T12:00:00Z", "output": []}"#)
                .insert_header("cache-control", "max-age=300"),
        )
        .mount(&server)
        .await;

    let storage = SqliteStorage::new_in_memory().unwrap();
    let config = create_test_config(vec![format!("{}/$bulk-publish", server.uri())], ":memory:");
    let coordinator = Coordinator::with_storage(config, storage).unwrap();
    let manifest = coordinator.register_configured_manifests().unwrap().remove(0);

    coordinator.crawl_manifest(&manifest, at(T)).await.unwrap();

    for offset in [0, 1, 150, 299] {
        assert!(
            !coordinator
                .should_fetch_manifest(&manifest, at(T + offset))
                .unwrap(),
            "manifest should not be due {}s after the fetch",
            offset
        );
    }
    assert!(coordinator.should_fetch_manifest(&manifest, at(T + 300)).unwrap());
    assert!(coordinator.should_fetch_manifest(&manifest, at(T + 3_600)).unwrap());
}

#[tokio::test]
async fn test_full_run_from_config_file() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    let body = manifest_body(
        &base_url,
        &[
            ("Location", "/locations.ndjson", "CA"),
            ("Slot", "/slots.ndjson", "CA,NV"),
        ],
    );
    Mock::given(method("GET"))
        .and(path("/$bulk-publish"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("cache-control", "max-age=3600"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_body(&server, "/locations.ndjson", "loc").await;
    mount_body(&server, "/slots.ndjson", "slots").await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config_path = dir.path().join("crawler.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[crawler]
max-concurrent-manifests = 2

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{}"

[[manifest]]
url = "{}/$bulk-publish"
"#,
            db_path.display(),
            base_url
        ),
    )
    .unwrap();

    let (config, hash) = load_config_with_hash(&config_path).expect("Failed to load config");
    let coordinator = Coordinator::new(config)
        .unwrap()
        .with_config_hash(&hash);

    let summary = coordinator.run().await.expect("Crawl failed");
    assert!(summary.run_id.is_some());
    assert_eq!(summary.totals().fetched, 3);
    assert_eq!(summary.manifests_not_due, 0);

    // The polling hint keeps the manifest out of an immediate second run
    let second = coordinator.run().await.expect("Second crawl failed");
    assert_eq!(second.manifests_not_due, 1);
    assert_eq!(second.totals().total(), 0);

    let storage = SqliteStorage::new(&db_path).expect("Failed to open DB");
    assert_eq!(storage.count_manifest_fetches(true).unwrap(), 1);
    assert_eq!(storage.count_leaf_fetches(LeafKind::Location, true).unwrap(), 1);
    assert_eq!(storage.count_leaf_fetches(LeafKind::Slot, true).unwrap(), 1);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, hash);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_storage_failure_in_one_manifest_fails_the_run() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    let broken = manifest_body(
        &base_url,
        &[
            ("Slot", "/a/slots.ndjson", "MA"),
            ("Location", "/a/locations.ndjson", "MA"),
        ],
    );
    let healthy = manifest_body(&base_url, &[("Location", "/b/locations.ndjson", "NY")]);
    mount_body(&server, "/a/$bulk-publish", &broken).await;
    mount_body(&server, "/b/$bulk-publish", &healthy).await;
    mount_body(&server, "/a/slots.ndjson", "slots").await;
    mount_body(&server, "/a/locations.ndjson", "loc-a").await;
    mount_body(&server, "/b/locations.ndjson", "loc-b").await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(
        vec![
            format!("{}/a/$bulk-publish", base_url),
            format!("{}/b/$bulk-publish", base_url),
        ],
        db_path.to_str().unwrap(),
    );
    let coordinator = Coordinator::new(config).expect("Failed to create coordinator");

    // Slot rows can no longer be written
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch("DROP TABLE slot_fetch_states; DROP TABLE slot_fetches;")
        .unwrap();
    drop(conn);

    let err = coordinator
        .run()
        .await
        .expect_err("Storage failure must fail the run");
    assert!(err.is_storage(), "unexpected error: {}", err);

    let storage = SqliteStorage::new(&db_path).expect("Failed to open DB");
    assert_eq!(storage.count_manifest_fetches(true).unwrap(), 2);
    assert_eq!(storage.count_leaf_fetches(LeafKind::Location, true).unwrap(), 1);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_unreachable_manifest_recorded_with_status_zero() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config(
        vec!["http://127.0.0.1:1/$bulk-publish".to_string()],
        db_path.to_str().unwrap(),
    );
    config.crawler.request_timeout = 2;

    let coordinator = Coordinator::new(config).unwrap();
    let summary = coordinator.run().await.expect("Transport errors are not fatal");
    assert_eq!(summary.totals().failed, 1);

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    let manifest = storage.load_known_manifests().unwrap().remove(0);
    let record = storage
        .last_manifest_fetch(manifest.id, false)
        .unwrap()
        .unwrap();
    assert_eq!(record.status_code, 0);
    assert!(record.contents.is_none());
}

#[tokio::test]
async fn test_manifest_list_file_registration() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# publishers").unwrap();
    writeln!(file, "https://a.example.com/$bulk-publish").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "https://b.example.com/manifest.json").unwrap();

    let urls = load_manifest_urls(file.path()).unwrap();
    assert_eq!(urls.len(), 2);

    let storage = SqliteStorage::new_in_memory().unwrap();
    let coordinator =
        Coordinator::with_storage(create_test_config(vec![], ":memory:"), storage).unwrap();
    coordinator.register_manifests(&urls).unwrap();
    coordinator.register_manifests(&urls).unwrap();

    let plan = coordinator.plan(Utc::now()).unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.iter().all(|entry| entry.due));
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slots.ndjson"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slots")
                .insert_header("cache-control", "max-age=600")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, _storage) = create_fetcher();
    let url = format!("{}/slots.ndjson", server.uri());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let fetcher = fetcher.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            fetcher.fetch(&url, at(T), &FetchOptions::default()).await
        }));
    }

    let mut sources = Vec::new();
    for handle in handles {
        sources.push(handle.await.unwrap().unwrap().source);
    }
    assert_eq!(
        sources.iter().filter(|s| **s == FetchSource::Network).count(),
        1
    );
}
