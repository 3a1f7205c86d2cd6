use anyhow::{Context, Result};
use chrono::Utc;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::{self, NewArticle};
use crate::scraping::{self, Selectors};
use common::FeedSourceConfig;

/// Fetches a feed from the given URL and parses it.
/// Retries transient failures (network errors, 5xx, 429) with exponential
/// backoff; client errors are reported immediately.
pub async fn fetch_and_parse_feed(url: &str, timeout_secs: u64) -> Result<Feed> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("newschat/0.1.0")
        .build()
        .context("failed to build reqwest client")?;

    let max_retries = 3;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        if attempt > 1 {
            let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
            info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, max_retries, backoff);
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                    return Ok(feed);
                } else if status.is_server_error() {
                    last_error = Some(anyhow::anyhow!("server error: {}", status));
                    continue;
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                    continue;
                } else {
                    // Client error (4xx) - likely permanent, don't retry
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                // Network error - retry
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

/// Derives a category tag from a feed URL: the last path segment minus its
/// extension (".../rss/topics/world.xml" yields "world").
pub fn derive_category(feed_url: &str) -> String {
    let stem = |segment: &str| {
        segment
            .rsplit_once('.')
            .map(|(name, _ext)| name.to_string())
            .unwrap_or_else(|| segment.to_string())
    };

    if let Ok(parsed) = url::Url::parse(feed_url) {
        if let Some(segments) = parsed.path_segments() {
            if let Some(last) = segments.filter(|s| !s.is_empty()).last() {
                return stem(last);
            }
        }
    }
    stem(feed_url.rsplit('/').next().unwrap_or(feed_url))
}

/// Pulls candidate articles from every configured feed source and persists
/// the ones not yet in the catalog. A failure on one entry (fetch, parse,
/// storage) is logged and skipped; it never aborts the rest of the batch.
pub async fn update_catalog(
    pool: &SqlitePool,
    sources: &[FeedSourceConfig],
    selectors: &Selectors,
    timeout_secs: u64,
) -> Result<()> {
    for source in sources {
        let category = source
            .category
            .clone()
            .unwrap_or_else(|| derive_category(&source.url));

        if source.topics {
            info!("Retrieving articles in {} (topics)", category);
        } else {
            info!("Retrieving articles in {}", category);
        }

        let feed = match fetch_and_parse_feed(&source.url, timeout_secs).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("failed to fetch feed {}: {:#}", source.url, e);
                continue;
            }
        };
        info!("{} entries found in {}", feed.entries.len(), source.url);

        for entry in &feed.entries {
            match ingest_entry(pool, entry, &category, source.topics, selectors, timeout_secs).await {
                Ok(Some(title)) => debug!(category = %category, title = %title, "stored article"),
                Ok(None) => {}
                Err(e) => {
                    // Per-entry fault: log the chain and keep going.
                    warn!("skipping entry from {}: {:#}", source.url, e);
                }
            }
        }
    }
    Ok(())
}

/// Processes one feed entry end to end. Returns the stored title on insert,
/// `None` when the entry was skipped (no link, already stored, or lost the
/// dedup race).
async fn ingest_entry(
    pool: &SqlitePool,
    entry: &Entry,
    category: &str,
    is_topics: bool,
    selectors: &Selectors,
    timeout_secs: u64,
) -> Result<Option<String>> {
    let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
        debug!("skipping entry without link");
        return Ok(None);
    };

    // Resolve the canonical full-text URL; fall back to the feed link when
    // the entry page carries no full-article anchor.
    let url = match scraping::resolve_full_article_url(&link, selectors, timeout_secs).await? {
        Some(full) => full,
        None => link,
    };

    // Cheap short-circuit before fetching the article body.
    if catalog::url_exists(pool, &url).await? {
        debug!(url = %url, "SKIP (already stored)");
        return Ok(None);
    }

    let (title, body) = scraping::extract_article(&url, selectors, timeout_secs).await?;
    let published_date = entry.published.unwrap_or_else(Utc::now);

    let inserted = catalog::insert_article(
        pool,
        &NewArticle {
            category: category.to_string(),
            is_topics,
            url,
            published_date,
            title: title.clone(),
            body,
        },
    )
    .await?;

    Ok(inserted.then_some(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_feed_url() {
        assert_eq!(
            derive_category("https://news.yahoo.co.jp/rss/topics/world.xml"),
            "world"
        );
        assert_eq!(
            derive_category("https://news.yahoo.co.jp/rss/categories/it.xml"),
            "it"
        );
        assert_eq!(derive_category("https://example.com/feed"), "feed");
    }
}
