use chrono::{TimeZone, Utc};
use newschat::catalog::{self, NewArticle};
use newschat::chat::NewsChatBot;
use newschat::llm::{ChatProvider, ChatTurn, CompletionError, Role};
use newschat::session::ArticleSession;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Provider double that answers with the number of turns it was sent.
struct CountingProvider {
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl ChatProvider for CountingProvider {
    async fn complete(&self, turns: &[ChatTurn], _stream: bool) -> Result<String, CompletionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("reply {} over {} turns", call, turns.len()))
    }
}

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

/// Article `i` (1-based) is published on day `i`: newest-first order is n..1.
async fn seed_articles(pool: &SqlitePool, n: u32) {
    for i in 1..=n {
        catalog::insert_article(
            pool,
            &NewArticle {
                category: "world".to_string(),
                is_topics: false,
                url: format!("http://x/{}", i),
                published_date: Utc.with_ymd_and_hms(2026, 1, i, 9, 30, 0).unwrap(),
                title: format!("article {}", i),
                body: format!("body of article {}", i),
            },
        )
        .await
        .expect("seed insert");
    }
}

async fn build_bot(pool: &SqlitePool, provider: Arc<dyn ChatProvider>) -> NewsChatBot {
    let mut rng = StdRng::seed_from_u64(0);
    let session = ArticleSession::new(pool, Some("world"), None, false, &mut rng)
        .await
        .expect("session");
    NewsChatBot::new(
        pool.clone(),
        session,
        provider,
        "You discuss the news below.\n{}".to_string(),
        vec!["次".to_string(), "next".to_string()],
        false,
    )
    .await
    .expect("bot")
}

#[tokio::test]
async fn seed_turn_carries_title_date_and_body() {
    let pool = setup_test_db().await;
    seed_articles(&pool, 3).await;

    let bot = build_bot(&pool, CountingProvider::new()).await;

    let turns = bot.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::System);
    // Newest article first: 3 is published last
    assert!(turns[0].content.contains("article 3"));
    assert!(turns[0].content.contains("2026-01-03 09:30:00"));
    assert!(turns[0].content.contains("body of article 3"));
    assert!(turns[0].content.starts_with("You discuss the news below."));
}

#[tokio::test]
async fn turns_accumulate_within_one_article() {
    let pool = setup_test_db().await;
    seed_articles(&pool, 3).await;

    let mut bot = build_bot(&pool, CountingProvider::new()).await;

    let reply = bot.respond("what happened?").await.expect("respond");
    // Seed + user turn were sent to the provider
    assert_eq!(reply, "reply 0 over 2 turns");

    let turns = bot.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].role, Role::User);
    assert_eq!(turns[1].content, "what happened?");
    assert_eq!(turns[2].role, Role::Assistant);
    assert_eq!(turns[2].content, reply);

    // Second exchange keeps accumulating
    bot.respond("and then?").await.expect("respond");
    assert_eq!(bot.turns().len(), 5);
}

#[tokio::test]
async fn next_marker_advances_reseeds_and_drops_the_directive() {
    let pool = setup_test_db().await;
    seed_articles(&pool, 3).await;

    let mut bot = build_bot(&pool, CountingProvider::new()).await;
    bot.respond("interesting").await.expect("respond");
    assert_eq!(bot.turns().len(), 3);

    let reply = bot.respond("次のニュースをお願い").await.expect("respond");

    // Accumulated turns were discarded and the directive itself was not
    // forwarded: the provider saw only the fresh seed turn.
    assert_eq!(reply, "reply 1 over 1 turns");
    let turns = bot.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::System);
    assert!(turns[0].content.contains("article 2"));
    assert_eq!(turns[1].role, Role::Assistant);
}

#[tokio::test]
async fn cycle_returns_to_the_first_article() {
    let pool = setup_test_db().await;
    seed_articles(&pool, 2).await;

    let mut bot = build_bot(&pool, CountingProvider::new()).await;
    assert!(bot.turns()[0].content.contains("article 2"));

    bot.respond("next").await.expect("advance to second");
    assert!(bot.turns()[0].content.contains("article 1"));

    // Advancing past the end crosses the dead slot and wraps to the start
    bot.respond("next").await.expect("wrap to first");
    assert!(bot.turns()[0].content.contains("article 2"));
}

/// Provider double that always fails authentication.
struct RejectingProvider;

#[async_trait::async_trait]
impl ChatProvider for RejectingProvider {
    async fn complete(&self, _turns: &[ChatTurn], _stream: bool) -> Result<String, CompletionError> {
        Err(CompletionError::Authentication("401 invalid key".to_string()))
    }
}

#[tokio::test]
async fn authentication_failure_surfaces_unmasked() {
    let pool = setup_test_db().await;
    seed_articles(&pool, 1).await;

    let mut bot = build_bot(&pool, Arc::new(RejectingProvider)).await;
    let err = bot.respond("hello").await.expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<CompletionError>(),
        Some(CompletionError::Authentication(_))
    ));
}
