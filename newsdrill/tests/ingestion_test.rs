use std::time::Duration;

use newsdrill::ingestion::{FeedSource, RssFeedSource};

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Economy</title>
    <item><title>Rates on hold</title><link>https://news.example.com/rates</link></item>
    <item><title>Markets rally</title><link>https://news.example.com/markets</link></item>
  </channel>
</rss>"#;

fn source() -> RssFeedSource {
    RssFeedSource::new(5).unwrap().with_backoff_base(Duration::from_millis(1))
}

#[tokio::test]
async fn fetches_rss_entries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/economy.xml")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(RSS)
        .create_async()
        .await;

    let entries = source()
        .fetch(&format!("{}/economy.xml", server.url()))
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "Rates on hold");
    assert_eq!(entries[1].link, "https://news.example.com/markets");
    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flaky.xml")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let err = source()
        .fetch(&format!("{}/flaky.xml", server.url()))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("503"));
    mock.assert_async().await;
}

#[tokio::test]
async fn not_found_fails_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/gone.xml")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let err = source()
        .fetch(&format!("{}/gone.xml", server.url()))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("404"));
    mock.assert_async().await;
}

#[tokio::test]
async fn malformed_feed_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/broken.xml")
        .with_status(200)
        .with_body("<html>not a feed")
        .create_async()
        .await;

    assert!(source()
        .fetch(&format!("{}/broken.xml", server.url()))
        .await
        .is_err());
}
