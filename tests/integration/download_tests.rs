//! Resource download behavior across pages and runs

use crate::common::{html_page, mount_page, test_config, RecordingStorage};
use std::sync::Arc;
use tempfile::TempDir;
use wiki_harvest::crawler::{resource_name, run_crawl};
use wiki_harvest::extract::HtmlExtractor;
use wiki_harvest::normalize_url;
use wiki_harvest::storage::FileStorage;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_second_run_skips_stored_resources() {
    let server = MockServer::start().await;
    let base = server.uri();
    let image = format!("{}/img/map.png?version=2", base);

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("A", &[], &[image.clone()]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/map.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![3u8; 128]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/a", base);

    let first = run_crawl(
        test_config(&seed, 0),
        Arc::new(FileStorage::new(dir.path(), true).unwrap()),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();
    assert_eq!(first.resources_downloaded, 1);

    let second = run_crawl(
        test_config(&seed, 0),
        Arc::new(FileStorage::new(dir.path(), true).unwrap()),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();
    assert_eq!(second.resources_downloaded, 0);
    assert_eq!(second.errors, 0);

    let name = resource_name(&normalize_url(&image).unwrap());
    assert!(name.ends_with(".png"));
    let saved = std::fs::read(dir.path().join("images").join(&name)).unwrap();
    assert_eq!(saved.len(), 128);
}

#[tokio::test]
async fn test_resource_request_carries_referer() {
    let server = MockServer::start().await;
    let base = server.uri();
    let page_url = format!("{}/page", base);

    mount_page(
        &server,
        "/page",
        html_page("Page", &[], &[format!("{}/logo.gif", base)]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/logo.gif"))
        .and(header("referer", page_url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&page_url, 0),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.resources_downloaded, 1);
    assert_eq!(storage.resource("logo.gif"), Some(b"GIF89a".to_vec()));
}

#[tokio::test]
async fn test_failed_download_counts_error() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/page",
        html_page("Page", &[], &[format!("{}/gone.png", base)]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let storage = RecordingStorage::new();
    let report = run_crawl(
        test_config(&format!("{}/page", base), 0),
        storage.clone(),
        Arc::new(HtmlExtractor::new()),
    )
    .await
    .unwrap();

    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.resources_downloaded, 0);
    assert_eq!(report.errors, 1);
    assert_eq!(storage.resource_count(), 0);
}

#[tokio::test]
async fn test_images_disabled_skips_downloads() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/page",
        html_page("Page", &[], &[format!("{}/pic.png", base)]),
        1,
    )
    .await;
    mount_page(&server, "/pic.png", ResponseTemplate::new(200), 0).await;

    let mut config = test_config(&format!("{}/page", base), 0);
    config.output.download_images = false;

    let storage = RecordingStorage::new();
    let report = run_crawl(config, storage.clone(), Arc::new(HtmlExtractor::new()))
        .await
        .unwrap();

    assert_eq!(report.resources_downloaded, 0);
    assert_eq!(storage.resource_count(), 0);
}
