use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::debug;

/// One harvested news item. Rows are append-only: created once by ingestion,
/// never updated or deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub category: String,
    pub is_topics: bool,
    pub url: String,
    pub published_date: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Candidate row for insertion. `url` is the dedup key; the assigned `id` is
/// a store-local handle only.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub category: String,
    pub is_topics: bool,
    pub url: String,
    pub published_date: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Idempotently ensure the article table and its unique-URL constraint exist.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS article (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT,
            is_topics INTEGER,
            url TEXT UNIQUE,
            published_date DATETIME,
            title TEXT,
            body TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create article table")?;
    Ok(())
}

/// Attempt to add one article. Returns `Ok(true)` if inserted, `Ok(false)` if
/// a row with this URL already exists (idempotent no-op, not an error).
///
/// The existence check and the insert run inside one `BEGIN EXCLUSIVE`
/// transaction, so two writers racing on the same URL cannot both insert.
/// The UNIQUE constraint on `url` is the backstop if that ever fails.
pub async fn insert_article(pool: &SqlitePool, article: &NewArticle) -> Result<bool> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;

    sqlx::query("BEGIN EXCLUSIVE")
        .execute(&mut *conn)
        .await
        .context("failed to begin exclusive transaction")?;

    match insert_locked(&mut conn, article).await {
        Ok(inserted) => {
            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .context("failed to commit article insert")?;
            Ok(inserted)
        }
        Err(e) => {
            // Roll back so the connection returns to the pool clean.
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

async fn insert_locked(conn: &mut SqliteConnection, article: &NewArticle) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article WHERE url = ?")
        .bind(&article.url)
        .fetch_one(&mut *conn)
        .await
        .context("failed to check existing article")?;

    if existing > 0 {
        debug!(url = %article.url, "article already stored, skipping insert");
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO article (category, is_topics, url, published_date, title, body)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.category)
    .bind(article.is_topics)
    .bind(&article.url)
    .bind(article.published_date)
    .bind(&article.title)
    .bind(&article.body)
    .execute(&mut *conn)
    .await
    .context("failed to insert article")?;

    Ok(true)
}

/// Fast existence probe used by ingestion to short-circuit before any
/// expensive page fetch.
pub async fn url_exists(pool: &SqlitePool, url: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article WHERE url = ?")
        .bind(url)
        .fetch_one(pool)
        .await
        .context("failed to probe article url")?;
    Ok(count > 0)
}

/// Highest assigned article id, optionally restricted to a category.
/// Returns `None` when the catalog (or the category) is empty; callers must
/// handle the empty case explicitly rather than treating it as a cutoff.
pub async fn max_id(pool: &SqlitePool, category: Option<&str>) -> Result<Option<i64>> {
    let max: Option<i64> = match category {
        Some(cat) => {
            sqlx::query_scalar("SELECT MAX(id) FROM article WHERE category = ?")
                .bind(cat)
                .fetch_one(pool)
                .await
        }
        None => sqlx::query_scalar("SELECT MAX(id) FROM article").fetch_one(pool).await,
    }
    .context("failed to query max article id")?;
    Ok(max)
}

/// Number of articles with id strictly below `cutoff`, optionally filtered
/// by category.
pub async fn count_below(pool: &SqlitePool, cutoff: i64, category: Option<&str>) -> Result<i64> {
    let count: i64 = match category {
        Some(cat) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM article WHERE id < ? AND category = ?")
                .bind(cutoff)
                .bind(cat)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM article WHERE id < ?")
                .bind(cutoff)
                .fetch_one(pool)
                .await
        }
    }
    .context("failed to count articles")?;
    Ok(count)
}

/// Article at 1-based `position` among rows with id below `cutoff`
/// (optionally category-filtered), ordered by published time descending.
/// Returns `None` when `position` is out of range.
///
/// Reads are parameterized by an explicit cutoff so a session holds a stable
/// logical view while ingestion keeps appending rows underneath it.
pub async fn article_at(
    pool: &SqlitePool,
    cutoff: i64,
    position: i64,
    category: Option<&str>,
) -> Result<Option<Article>> {
    if position < 1 {
        return Ok(None);
    }

    let row = match category {
        Some(cat) => {
            sqlx::query_as::<_, Article>(
                r#"
                SELECT id, category, is_topics, url, published_date, title, body
                FROM article
                WHERE category = ? AND id < ?
                ORDER BY published_date DESC
                LIMIT 1 OFFSET ?
                "#,
            )
            .bind(cat)
            .bind(cutoff)
            .bind(position - 1)
            .fetch_optional(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Article>(
                r#"
                SELECT id, category, is_topics, url, published_date, title, body
                FROM article
                WHERE id < ?
                ORDER BY published_date DESC
                LIMIT 1 OFFSET ?
                "#,
            )
            .bind(cutoff)
            .bind(position - 1)
            .fetch_optional(pool)
            .await
        }
    }
    .context("failed to fetch article at position")?;

    Ok(row)
}
