//! End-to-end crawl scenarios against mock servers

use crate::common::{hits, html_page, mount_page, test_config, RecordingStorage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiki_harvest::config::StorageBackend;
use wiki_harvest::crawler::{run_crawl, Coordinator};
use wiki_harvest::extract::HtmlExtractor;
use wiki_harvest::storage::{open_storage, RunStatus, SqliteStorage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_depth_and_authority_scoping() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;
    let base = server.uri();

    // a -> b (same host), a -> c (other host), b -> d (too deep)
    mount_page(
        &server,
        "/a",
        html_page(
            "A",
            &[format!("{}/b", base), format!("{}/c", other.uri())],
            &[],
        ),
        1,
    )
    .await;
    mount_page(&server, "/b", html_page("B", &[format!("{}/d", base)], &[]), 1).await;
    mount_page(&server, "/d", html_page("D", &[], &[]), 0).await;
    mount_page(&other, "/c", html_page("C", &[], &[]), 0).await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/a", base), 1),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.generations, 2);

    let mut urls = storage.page_urls();
    urls.sort();
    assert_eq!(urls, vec![format!("{}/a", base), format!("{}/b", base)]);
    assert_eq!(storage.reports().len(), 1);
}

#[tokio::test]
async fn test_diamond_fetches_each_page_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let shared = format!("{}/img/shared.png", base);

    mount_page(
        &server,
        "/s",
        html_page("S", &[format!("{}/l", base), format!("{}/r", base)], &[]),
        1,
    )
    .await;
    for side in ["/l", "/r"] {
        mount_page(
            &server,
            side,
            html_page(side, &[format!("{}/d", base)], &[shared.clone()]),
            1,
        )
        .await;
    }
    mount_page(
        &server,
        "/d",
        html_page("D", &[format!("{}/s", base)], &[shared.clone()]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/shared.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 32]))
        .expect(1)
        .mount(&server)
        .await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/s", base), 3),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_visited, 4);
    assert_eq!(report.resources_downloaded, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(storage.page_urls().len(), 4);
    assert_eq!(storage.resource("shared.png").map(|b| b.len()), Some(32));
}

#[tokio::test]
async fn test_depth_zero_fetches_only_seed() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/seed",
        html_page("Seed", &[format!("{}/child", base)], &[]),
        1,
    )
    .await;
    mount_page(&server, "/child", html_page("Child", &[], &[]), 0).await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/seed", base), 0),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.generations, 1);
    assert_eq!(storage.page_urls(), vec![format!("{}/seed", base)]);
}

#[tokio::test]
async fn test_directory_seed_resolves_relative_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/docs/",
        html_page("Docs", &["intro".to_string()], &[]),
        1,
    )
    .await;
    mount_page(&server, "/docs/intro", html_page("Intro", &[], &[]), 1).await;
    mount_page(&server, "/docs", html_page("Docs", &[], &[]), 0).await;
    mount_page(&server, "/intro", html_page("Intro", &[], &[]), 0).await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/docs/", base), 1),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.errors, 0);

    let mut urls = storage.page_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![format!("{}/docs/", base), format!("{}/docs/intro", base)]
    );
}

#[tokio::test]
async fn test_gbk_page_is_crawled() {
    let server = MockServer::start().await;
    let base = server.uri();

    // <h1>中文</h1> followed by a relative link, encoded as GBK
    let mut body = b"<html><body><h1>".to_vec();
    body.extend_from_slice(&[0xd6, 0xd0, 0xce, 0xc4]);
    body.extend_from_slice(b"</h1><a href=\"b\">b</a></body></html>");

    mount_page(
        &server,
        "/a",
        ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=gbk"),
        1,
    )
    .await;
    mount_page(&server, "/b", html_page("B", &[], &[]), 1).await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/a", base), 1),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(
        storage.page_title(&format!("{}/a", base)).as_deref(),
        Some("中文")
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "/flaky", html_page("Flaky", &[], &[]), 1).await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/flaky", server.uri()), 1),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(hits(&server, "/flaky").await, 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&format!("{}/missing", server.uri()), 1);
    config.crawler.max_retries = 5;

    let storage = RecordingStorage::new();
    let report = run_crawl(config, storage.clone(), Arc::new(HtmlExtractor::new()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_visited, 0);
    assert_eq!(report.errors, 1);
    assert!(storage.page_urls().is_empty());
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/down", server.uri()), 1),
        storage,
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 0);
    assert_eq!(report.errors, 1);
}

#[tokio::test]
async fn test_stop_before_run_makes_no_requests() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", html_page("A", &[], &[]), 0).await;

    let storage = RecordingStorage::new();
    let mut coordinator = Coordinator::new(
        test_config(&format!("{}/a", server.uri()), 2),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .unwrap();

    coordinator.stop_signal().stop();
    let report = coordinator.run().await;

    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.pages_visited, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(storage.reports().len(), 1);
}

#[tokio::test]
async fn test_stop_during_generation_keeps_finished_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/a",
        html_page("A", &[format!("{}/b", base), format!("{}/c", base)], &[]),
        1,
    )
    .await;
    for route in ["/b", "/c"] {
        mount_page(
            &server,
            route,
            html_page(route, &[format!("{}/d", base)], &[])
                .set_delay(Duration::from_millis(500)),
            1,
        )
        .await;
    }
    mount_page(&server, "/d", html_page("D", &[], &[]), 0).await;

    let storage = RecordingStorage::new();
    let mut coordinator = Coordinator::new(
        test_config(&format!("{}/a", base), 3),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .unwrap();
    let stop = coordinator.stop_signal();

    // Stop once both second-generation requests are on the wire
    let stop_when_in_flight = async {
        for _ in 0..300 {
            if hits(&server, "/b").await + hits(&server, "/c").await == 2 {
                stop.stop();
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let (report, ()) = tokio::join!(coordinator.run(), stop_when_in_flight);

    assert!(stop.is_stopped());
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.errors, 0);
    assert_eq!(report.generations, 2);
    assert_eq!(hits(&server, "/d").await, 0);

    let mut urls = storage.page_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}/a", base),
            format!("{}/b", base),
            format!("{}/c", base)
        ]
    );

    let reports = storage.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, RunStatus::Stopped);
    assert_eq!(reports[0].pages_visited, 3);
}

#[tokio::test]
async fn test_extraction_failure_counts_visit_and_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("just some text"))
        .expect(1)
        .mount(&server)
        .await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/plain", server.uri()), 2),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.generations, 1);
    assert!(storage.page_urls().is_empty());
}

#[tokio::test]
async fn test_save_html_stores_raw_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", html_page("A", &[], &[]), 1).await;

    let mut config = test_config(&format!("{}/a", server.uri()), 0);
    config.output.save_html = true;

    let storage = RecordingStorage::new();
    run_crawl(config, storage.clone(), Arc::new(HtmlExtractor::new()))
        .await
        .unwrap();

    assert_eq!(storage.raw_page_urls(), vec![format!("{}/a", server.uri())]);
}

#[tokio::test]
async fn test_sqlite_backend_records_run() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(
        &server,
        "/a",
        html_page("Alpha", &[format!("{}/b", base)], &[]),
        1,
    )
    .await;
    mount_page(&server, "/b", html_page("Beta", &[], &[]), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&format!("{}/a", base), 1);
    config.output.directory = dir.path().display().to_string();
    config.output.backend = StorageBackend::Sqlite;

    let storage = open_storage(&config.output, &config.crawler.seed_url, Some("abc")).unwrap();
    let db_path = config.output.database_path();
    let report = run_crawl(config, storage, Arc::new(HtmlExtractor::new()))
        .await
        .unwrap();
    assert_eq!(report.pages_visited, 2);

    let db = SqliteStorage::new(&db_path, true).unwrap();
    assert_eq!(db.count_pages().unwrap(), 2);
    assert_eq!(
        db.page_title(&format!("{}/b", base)).unwrap().as_deref(),
        Some("Beta")
    );

    let runs = db.list_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].pages_visited, 2);
    assert_eq!(runs[0].config_hash.as_deref(), Some("abc"));
}
