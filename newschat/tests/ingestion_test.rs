use common::FeedSourceConfig;
use newschat::catalog;
use newschat::ingestion;
use newschat::scraping::Selectors;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn setup_test_db() -> SqlitePool {
    // Single connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    catalog::ensure_schema(&pool).await.expect("ensure schema");
    pool
}

fn test_selectors() -> Selectors {
    Selectors {
        link: "a.pickup".to_string(),
        title: "h1.headline".to_string(),
        body: "div.story".to_string(),
    }
}

fn rss(base: &str, items: &[(&str, &str, &str)]) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>test feed</title>");
    for (title, path, pub_date) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}{}</link><pubDate>{}</pubDate></item>",
            title, base, path, pub_date
        ));
    }
    body.push_str("</channel></rss>");
    body
}

#[tokio::test]
async fn pipeline_resolves_extracts_and_dedups() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let feed_body = rss(
        &base,
        &[
            ("Entry One", "/entry1", "Wed, 01 Apr 2026 09:00:00 GMT"),
            ("Entry Two", "/entry2", "Thu, 02 Apr 2026 09:00:00 GMT"),
        ],
    );
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(feed_body)
        .expect_at_least(1)
        .create_async()
        .await;

    // Entry one carries a full-article anchor; extraction happens on /full1
    let _entry1 = server
        .mock("GET", "/entry1")
        .with_status(200)
        .with_body(format!(
            r#"<html><body><a class="pickup" href="{}/full1">read the full article</a></body></html>"#,
            base
        ))
        .expect_at_least(1)
        .create_async()
        .await;
    let _full1 = server
        .mock("GET", "/full1")
        .with_status(200)
        .with_body(r#"<html><body><h1 class="headline">Full One</h1><div class="story">Body one.</div></body></html>"#)
        .expect_at_least(1)
        .create_async()
        .await;

    // Entry two has no anchor: the feed link itself is extracted
    let _entry2 = server
        .mock("GET", "/entry2")
        .with_status(200)
        .with_body(r#"<html><body><h1 class="headline">Plain Two</h1><div class="story">Body two.</div></body></html>"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let sources = vec![FeedSourceConfig {
        url: format!("{}/feed.xml", base),
        category: Some("world".to_string()),
        topics: false,
    }];

    ingestion::update_catalog(&pool, &sources, &test_selectors(), 5)
        .await
        .expect("update catalog");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    // Canonical URL wins over the feed link when the anchor is present
    assert!(catalog::url_exists(&pool, &format!("{}/full1", base)).await.unwrap());
    assert!(catalog::url_exists(&pool, &format!("{}/entry2", base)).await.unwrap());

    let newest = catalog::article_at(&pool, i64::MAX, 1, Some("world"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(newest.title, "Plain Two");
    assert_eq!(newest.body, "Body two.");
    assert!(!newest.is_topics);

    // A second run sees both URLs in the catalog and inserts nothing
    ingestion::update_catalog(&pool, &sources, &test_selectors(), 5)
        .await
        .expect("second update");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn one_broken_entry_does_not_abort_the_batch() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let feed_body = rss(
        &base,
        &[
            ("Broken", "/gone", "Wed, 01 Apr 2026 09:00:00 GMT"),
            ("Good", "/good", "Thu, 02 Apr 2026 09:00:00 GMT"),
        ],
    );
    let _feed = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_body(feed_body)
        .create_async()
        .await;

    let _gone = server
        .mock("GET", "/gone")
        .with_status(404)
        .create_async()
        .await;
    let _good = server
        .mock("GET", "/good")
        .with_status(200)
        .with_body(r#"<html><body><h1 class="headline">Good</h1><div class="story">Still here.</div></body></html>"#)
        .create_async()
        .await;

    let sources = vec![FeedSourceConfig {
        url: format!("{}/feed.xml", base),
        category: None,
        topics: true,
    }];

    ingestion::update_catalog(&pool, &sources, &test_selectors(), 5)
        .await
        .expect("update catalog");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let stored = catalog::article_at(&pool, i64::MAX, 1, None).await.unwrap().unwrap();
    assert_eq!(stored.title, "Good");
    // Category falls back to the feed URL's file stem; topics flag is carried
    assert_eq!(stored.category, "feed");
    assert!(stored.is_topics);
}

#[tokio::test]
async fn unreachable_feed_is_skipped_without_failing() {
    let pool = setup_test_db().await;
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let _missing = server
        .mock("GET", "/missing.xml")
        .with_status(404)
        .create_async()
        .await;

    let sources = vec![FeedSourceConfig {
        url: format!("{}/missing.xml", base),
        category: None,
        topics: false,
    }];

    ingestion::update_catalog(&pool, &sources, &test_selectors(), 5)
        .await
        .expect("update catalog");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
