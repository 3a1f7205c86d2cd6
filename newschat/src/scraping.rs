use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

/// CSS selectors driving article-page extraction. The defaults target
/// Yahoo! News pages; tests and other publishers override them via config.
#[derive(Debug, Clone)]
pub struct Selectors {
    /// Anchor on the feed-entry page leading to the full article
    pub link: String,
    /// Full-article title element
    pub title: String,
    /// Full-article body container
    pub body: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            link: "a.sc-eQakvG".to_string(),
            title: "h1.sc-keVrkP".to_string(),
            body: "div.article_body".to_string(),
        }
    }
}

impl Selectors {
    pub fn from_config(cfg: Option<&common::ScrapingConfig>) -> Self {
        let defaults = Self::default();
        match cfg {
            Some(c) => Self {
                link: c.link_selector.clone().unwrap_or(defaults.link),
                title: c.title_selector.clone().unwrap_or(defaults.title),
                body: c.body_selector.clone().unwrap_or(defaults.body),
            },
            None => defaults,
        }
    }
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("newschat/0.1.0")
        .build()
        .context("failed to build reqwest client")
}

async fn fetch_page(url: &str, timeout_secs: u64) -> Result<String> {
    let client = build_client(timeout_secs)?;
    let response = client.get(url).send().await.context("failed to fetch page")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("page fetch failed with status: {}", status));
    }

    response.text().await.context("failed to read page body")
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid CSS selector '{}': {}", selector, e))
}

/// Resolves the canonical full-article URL from a feed-entry page.
/// Returns `None` when the page carries no full-article anchor, in which
/// case callers fall back to the feed-provided link.
pub async fn resolve_full_article_url(
    entry_url: &str,
    selectors: &Selectors,
    timeout_secs: u64,
) -> Result<Option<String>> {
    let page = fetch_page(entry_url, timeout_secs).await?;
    let link_sel = parse_selector(&selectors.link)?;

    let href = {
        let doc = Html::parse_document(&page);
        doc.select(&link_sel)
            .find_map(|el| el.value().attr("href").map(str::to_string))
    };

    let Some(href) = href else {
        debug!(url = %entry_url, "no full-article link found");
        return Ok(None);
    };

    // Resolve relative hrefs against the entry page URL
    let base = url::Url::parse(entry_url).context("failed to parse entry URL")?;
    let resolved = base.join(&href).context("failed to resolve full-article URL")?;
    Ok(Some(resolved.to_string()))
}

/// Fetches an article page and extracts `(title, body)` text.
/// Fails when the expected page structure is absent; ingestion catches the
/// error, logs it and skips the entry.
pub async fn extract_article(
    url: &str,
    selectors: &Selectors,
    timeout_secs: u64,
) -> Result<(String, String)> {
    let page = fetch_page(url, timeout_secs).await?;
    let title_sel = parse_selector(&selectors.title)?;
    let body_sel = parse_selector(&selectors.body)?;

    let doc = Html::parse_document(&page);

    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| anyhow!("article title not found at '{}' on {}", selectors.title, url))?;

    let body = doc
        .select(&body_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or_else(|| anyhow!("article body not found at '{}' on {}", selectors.body, url))?;

    Ok((title, body))
}
