/*
newschat - single-binary main.rs
This binary refreshes the article catalog from the configured feeds and runs
the line-driven conversational reader over it.
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::{init_db_pool, Config};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newschat::chat::NewsChatBot;
use newschat::llm::{ChatProvider, CompletionError};
use newschat::scraping::Selectors;
use newschat::session::ArticleSession;
use newschat::{catalog, driver, ingestion};

#[derive(Parser, Debug)]
#[command(name = "newschat", about = "newschat catalog updater + conversational news reader")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Refresh the article catalog from the configured feeds before chatting
    #[arg(long)]
    update: bool,

    /// Refresh the catalog and exit (do not start the chat loop)
    #[arg(long)]
    update_only: bool,

    /// Restrict the session to one category
    #[arg(long, short = 'c')]
    category: Option<String>,

    /// Maximum number of articles to rotate through
    #[arg(long)]
    max_articles: Option<usize>,

    /// Keep articles in newest-first order instead of shuffling
    #[arg(long)]
    no_shuffle: bool,

    /// Seed for the shuffle order (reproducible traversal)
    #[arg(long)]
    seed: Option<u64>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging. The driver protocol owns stdout, so logs go to stderr.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    // Load configuration with defaults
    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    // Initialize DB pool and the catalog schema
    let db_pool = init_db_pool(&config.database.path).await?;
    catalog::ensure_schema(&db_pool).await?;

    let fetch_timeout = config
        .fetch
        .as_ref()
        .and_then(|f| f.timeout_seconds)
        .unwrap_or(10);

    if args.update || args.update_only {
        let selectors = Selectors::from_config(config.scraping.as_ref());
        info!("Updating article catalog from {} feeds", config.feeds.len());
        ingestion::update_catalog(&db_pool, &config.feeds, &selectors, fetch_timeout).await?;
        info!("Catalog update complete");
        if args.update_only {
            return Ok(());
        }
    }

    // Completion provider
    let provider = create_chat_provider(&config)?;

    // Instruction template
    let template_path = config
        .chat
        .as_ref()
        .and_then(|c| c.template_path.clone())
        .unwrap_or_else(|| "instruction_template.txt".to_string());
    let template = tokio::fs::read_to_string(&template_path)
        .await
        .with_context(|| format!("failed to read instruction template: {}", template_path))?;

    let next_markers = config
        .chat
        .as_ref()
        .and_then(|c| c.next_markers.clone())
        .unwrap_or_else(|| vec!["次".to_string(), "next".to_string()]);
    let stream = config.chat.as_ref().and_then(|c| c.stream).unwrap_or(false);

    // Session over a snapshot of the catalog
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let session = ArticleSession::new(
        &db_pool,
        args.category.as_deref(),
        args.max_articles,
        !args.no_shuffle,
        &mut rng,
    )
    .await?;

    let mut bot = NewsChatBot::new(
        db_pool.clone(),
        session,
        provider,
        template,
        next_markers,
        stream,
    )
    .await?;

    // Line-driven chat loop: read controller lines from stdin until EOF.
    info!("newschat ready, reading driver lines from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let Some(utterance) = driver::parse_input(&line) else { continue };

        match bot.respond(utterance).await {
            Ok(reply) => println!("{}", driver::format_output(&reply)),
            Err(e) => {
                if let Some(CompletionError::Authentication(_)) = e.downcast_ref::<CompletionError>() {
                    // Bad credentials invalidate the whole session.
                    return Err(e.context("completion service authentication failed"));
                }
                // Transient fault: log and keep reading lines.
                warn!("failed to generate reply: {:#}", e);
            }
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Create the chat-completion provider from configuration.
fn create_chat_provider(config: &Config) -> Result<Arc<dyn ChatProvider>> {
    let llm_config = config
        .llm
        .as_ref()
        .context("missing [llm] configuration section")?;

    let adapter = llm_config.adapter.as_deref().unwrap_or("remote");
    match adapter {
        "remote" => {
            let remote = llm_config
                .remote
                .as_ref()
                .context("remote adapter selected but [llm.remote] is missing")?;

            // Fetch API key from env var
            let api_key_env = remote
                .api_key_env
                .as_deref()
                .unwrap_or("OPENAI_API_KEY");
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("completion API key env var '{}' not set", api_key_env))?;

            let model = remote.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
            let timeout_secs = remote.timeout_seconds.unwrap_or(30);

            info!(model = %model, url = %api_url, "completion provider initialized");
            let provider = newschat::llm::remote::RemoteChatProvider::new(api_url, api_key, model)
                .with_defaults(timeout_secs, remote.max_tokens, remote.temperature);
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("unknown LLM adapter type: {}", other),
    }
}
