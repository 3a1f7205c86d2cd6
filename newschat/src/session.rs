use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::SqlitePool;
use tracing::info;

use crate::catalog::{self, Article};

/// Errors that invalidate a whole reading session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no articles in the catalog for {scope}")]
    EmptyCatalog { scope: String },
}

/// A per-session cursor over an immutable snapshot of the catalog.
///
/// The snapshot is fixed by `cutoff` at construction time: positional reads
/// only ever see rows with id below the cutoff, so the logical article count
/// never changes mid-session even while ingestion appends new rows.
#[derive(Debug)]
pub struct ArticleSession {
    cutoff: i64,
    category: Option<String>,
    order: Vec<usize>,
    current: usize,
}

impl ArticleSession {
    /// Builds a session over the current catalog contents.
    ///
    /// `max_articles` caps the traversal length; `shuffle` applies a uniform
    /// permutation drawn from the supplied `rng` (pass a seeded rng for a
    /// reproducible order), otherwise traversal runs newest-first.
    ///
    /// Fails with [`SessionError::EmptyCatalog`] when the catalog (or the
    /// requested category) holds no articles.
    pub async fn new<R: Rng>(
        pool: &SqlitePool,
        category: Option<&str>,
        max_articles: Option<usize>,
        shuffle: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let scope = category
            .map(|c| format!("category {}", c))
            .unwrap_or_else(|| "all categories".to_string());

        let max_id = catalog::max_id(pool, category)
            .await?
            .ok_or_else(|| SessionError::EmptyCatalog { scope: scope.clone() })?;

        // Include every row assigned before session start; rows appended
        // later get ids at or above the cutoff and stay invisible.
        let cutoff = max_id + 1;

        let total = catalog::count_below(pool, cutoff, category).await? as usize;
        if total == 0 {
            return Err(SessionError::EmptyCatalog { scope }.into());
        }
        info!("Found {} articles in the database ({})", total, scope);

        let effective = match max_articles {
            Some(max) => max.min(total),
            None => total,
        };
        info!("Using {} articles", effective);

        let mut order: Vec<usize> = (0..effective).collect();
        if shuffle {
            order.shuffle(rng);
            info!("Shuffled the articles");
        }

        Ok(Self {
            cutoff,
            category: category.map(str::to_string),
            order,
            current: 0,
        })
    }

    /// Number of articles in one traversal cycle.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum-id boundary fixing this session's view of the catalog.
    pub fn cutoff(&self) -> i64 {
        self.cutoff
    }

    /// The article under the cursor.
    ///
    /// Returns `Ok(None)` only while the cursor sits on the dead slot one
    /// past the last traversal index (see [`advance`](Self::advance)); every
    /// in-range position maps to a stored article.
    pub async fn current_article(&self, pool: &SqlitePool) -> Result<Option<Article>> {
        let Some(&position) = self.order.get(self.current) else {
            return Ok(None);
        };
        // Positions are 0-based in the traversal, 1-based to the catalog.
        catalog::article_at(pool, self.cutoff, position as i64 + 1, self.category.as_deref()).await
    }

    /// Moves the cursor one step forward, wrapping to the start of the cycle.
    ///
    /// The wrap fires only once the index exceeds the traversal length, so
    /// the cursor rests for one step on the slot at `len()` where no article
    /// is addressable; callers that need an article after every advance skip
    /// that slot with a second `advance()`.
    pub fn advance(&mut self) {
        self.current += 1;
        if self.current > self.order.len() {
            self.current = 0;
        }
    }
}
