use crate::test_config;
use std::collections::HashMap;
use std::sync::Arc;
use sumi_tide::fetcher::{FetchOutput, Fetcher, HttpProtocol};
use sumi_tide::record::{CrawlRecord, CrawlStatus, PROTOCOL_STATUS_KEY, REPR_URL_KEY};
use sumi_tide::url::StandardUrlFilter;
use tokio::sync::mpsc;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>home</body></html>")
                .insert_header("content-type", "text/html")
                .insert_header("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new home"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cached"))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><head><meta http-equiv="refresh" content="0; url=/new"></head></html>"#)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

fn entry(url: String, modified_time: i64) -> (String, CrawlRecord) {
    let mut record = CrawlRecord::new(CrawlStatus::DbUnfetched, 86_400, 1.0);
    record.modified_time = modified_time;
    (url, record)
}

async fn fetch_all(input: Vec<(String, CrawlRecord)>) -> (Vec<FetchOutput>, sumi_tide::fetcher::FetchSummary) {
    let config = test_config("unused.db");
    let protocol = HttpProtocol::new(&config.fetcher, &config.user_agent).unwrap();
    let fetcher = Fetcher::new(
        config.fetcher.clone(),
        Arc::new(protocol),
        Arc::new(StandardUrlFilter::default()),
    );

    let (tx, mut rx) = mpsc::channel(64);
    let summary = fetcher.run(input, tx).await.unwrap();

    let mut outputs = Vec::new();
    while let Some(out) = rx.recv().await {
        outputs.push(out);
    }
    (outputs, summary)
}

#[tokio::test]
async fn test_fetch_round_against_http_server() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let input = vec![
        entry(format!("{}/", base), 0),
        entry(format!("{}/old", base), 0),
        entry(format!("{}/cached", base), 784_111_777_000),
        entry(format!("{}/missing", base), 0),
        entry(format!("{}/private", base), 0),
    ];
    let (outputs, summary) = fetch_all(input).await;

    let by_url: HashMap<_, _> = outputs
        .iter()
        .map(|out| (out.url.trim_start_matches(&base).to_string(), out))
        .collect();
    assert_eq!(by_url.len(), 6);

    let home = by_url["/"];
    assert_eq!(home.record.status, CrawlStatus::FetchSuccess);
    assert_eq!(home.record.modified_time, 784_111_777_000);
    assert!(home.record.signature.is_some());
    assert_eq!(home.content.as_deref(), Some(&b"<html><body>home</body></html>"[..]));

    assert_eq!(by_url["/old"].record.status, CrawlStatus::FetchRedirPerm);
    let new = by_url["/new"];
    assert_eq!(new.record.status, CrawlStatus::FetchSuccess);
    assert_eq!(new.record.meta_text(REPR_URL_KEY), Some(format!("{}/new", base).as_str()));

    assert_eq!(by_url["/cached"].record.status, CrawlStatus::FetchNotModified);
    assert_eq!(by_url["/missing"].record.status, CrawlStatus::FetchGone);
    assert_eq!(
        by_url["/missing"].record.meta_text(PROTOCOL_STATUS_KEY),
        Some("notfound")
    );
    assert_eq!(by_url["/private"].record.status, CrawlStatus::FetchGone);
    assert_eq!(
        by_url["/private"].record.meta_text(PROTOCOL_STATUS_KEY),
        Some("robots_denied")
    );

    assert_eq!(summary.fed, 5);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.robots_denied, 1);
}

#[tokio::test]
async fn test_meta_refresh_is_followed() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let (outputs, _) = fetch_all(vec![entry(format!("{}/refresh", base), 0)]).await;

    let urls: Vec<_> = outputs.iter().map(|o| o.url.clone()).collect();
    assert_eq!(urls, vec![format!("{}/refresh", base), format!("{}/new", base)]);
    assert!(outputs
        .iter()
        .all(|o| o.record.status == CrawlStatus::FetchSuccess));
}
