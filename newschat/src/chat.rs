use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::Article;
use crate::llm::{ChatProvider, ChatTurn};
use crate::session::ArticleSession;

/// Rotating dialogue state seeded from the session's current article.
///
/// The first turn is always the system-authored seed built from the article;
/// user/assistant turns accumulate on top of it and are discarded wholesale
/// whenever the session advances to a new article.
pub struct NewsChatBot {
    pool: SqlitePool,
    session: ArticleSession,
    provider: Arc<dyn ChatProvider>,
    template: String,
    next_markers: Vec<String>,
    stream: bool,
    turns: Vec<ChatTurn>,
}

impl NewsChatBot {
    /// Builds the bot and seeds the conversation from the session's current
    /// article. The template's single `{}` placeholder receives the
    /// formatted article block.
    pub async fn new(
        pool: SqlitePool,
        session: ArticleSession,
        provider: Arc<dyn ChatProvider>,
        template: String,
        next_markers: Vec<String>,
        stream: bool,
    ) -> Result<Self> {
        let mut bot = Self {
            pool,
            session,
            provider,
            template,
            next_markers,
            stream,
            turns: Vec::new(),
        };
        bot.reseed().await?;
        Ok(bot)
    }

    /// The accumulated turn sequence (seed first).
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    fn article_block(article: &Article) -> String {
        format!(
            "{}\n{}\n\n{}",
            article.title,
            article.published_date.format("%Y-%m-%d %H:%M:%S"),
            article.body
        )
    }

    /// Replaces the conversation with a single system turn derived from the
    /// session's current article.
    async fn reseed(&mut self) -> Result<()> {
        let article = match self.session.current_article(&self.pool).await? {
            Some(article) => article,
            None => {
                // Cursor is on the dead slot one past the end of the cycle;
                // one more step wraps it back to a real position.
                self.session.advance();
                self.session
                    .current_article(&self.pool)
                    .await?
                    .context("session has no current article")?
            }
        };

        info!(title = %article.title, "seeding conversation from article");
        let seed = self.template.replacen("{}", &Self::article_block(&article), 1);
        self.turns = vec![ChatTurn::system(seed)];
        Ok(())
    }

    /// Moves the session to the next article and reseeds the conversation,
    /// discarding every accumulated turn.
    pub async fn advance_article(&mut self) -> Result<()> {
        self.session.advance();
        self.reseed().await
    }

    fn wants_next(&self, input: &str) -> bool {
        self.next_markers.iter().any(|marker| input.contains(marker))
    }

    /// Appends the optional user turn, sends the accumulated sequence to the
    /// completion service and appends the reply as an assistant turn.
    pub async fn next_turn(&mut self, user_text: Option<&str>) -> Result<String> {
        if let Some(text) = user_text {
            self.turns.push(ChatTurn::user(text));
        }

        let reply = self.provider.complete(&self.turns, self.stream).await?;
        self.turns.push(ChatTurn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Produces the reply to one user utterance.
    ///
    /// An utterance containing a next-article marker is consumed as a
    /// directive: the session advances, the conversation reseeds, and the
    /// triggering text is not forwarded as conversational content.
    pub async fn respond(&mut self, input: &str) -> Result<String> {
        if self.wants_next(input) {
            debug!("next-article marker detected");
            self.advance_article().await?;
            self.next_turn(None).await
        } else {
            self.next_turn(Some(input)).await
        }
    }
}
