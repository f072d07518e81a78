// src/main.rs

//! archivebot: subreddit archive and search bot CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use archivebot::error::Result;
use archivebot::index::{AliasTable, QueryEngine, SearchIndex};
use archivebot::limiter::RateLimiter;
use archivebot::models::Config;
use archivebot::scheduler;
use archivebot::services::{
    BulkHistoryClient, HistoryReader, InboxProcessor, ListingCrawler, RedditClient,
};
use archivebot::storage::{AnchorStore, ArchiveStore, MemoryStore, RedisStore};

#[derive(Parser, Debug)]
#[command(
    name = "archivebot",
    version,
    about = "Archives a subreddit into a searchable index and answers search mentions"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    /// Use the in-memory store instead of Redis (development only)
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot: backfill, then crawl and reply loops
    Run,
    /// Run a single listing crawl pass
    Crawl,
    /// Drain the bulk-history source into the index
    Backfill,
    /// Query the index once and print the results
    Query { text: Vec<String> },
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    if matches!(cli.command, Command::Validate) {
        println!("Configuration OK.");
        return Ok(());
    }

    let store: Arc<dyn ArchiveStore> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::connect(&config.redis.url).await?)
    };

    let aliases = Arc::new(AliasTable::from_config(&config.search.aliases)?);
    let anchors = AnchorStore::new(store.clone());
    let limiter = Arc::new(RateLimiter::new());
    let index = Arc::new(SearchIndex::new(store.clone(), aliases.clone()));

    match cli.command {
        Command::Run => {
            let client = Arc::new(RedditClient::new(&config, limiter.clone())?);
            let crawler = ListingCrawler::new(
                client.clone(),
                index.clone(),
                anchors.clone(),
                &config,
            );
            let history = HistoryReader::new(
                Arc::new(BulkHistoryClient::new(&config)?),
                anchors,
                &config,
            );
            let inbox = InboxProcessor::new(
                client,
                QueryEngine::new(store, aliases),
                &config,
            );
            scheduler::run(&config, crawler, history, index, inbox, limiter).await?;
        }
        Command::Crawl => {
            let client = Arc::new(RedditClient::new(&config, limiter)?);
            let crawler = ListingCrawler::new(client, index, anchors, &config);
            let summary = crawler.run_pass().await?;
            println!(
                "Crawled {} submissions over {} pages.",
                summary.submissions, summary.pages
            );
        }
        Command::Backfill => {
            let history = HistoryReader::new(
                Arc::new(BulkHistoryClient::new(&config)?),
                anchors,
                &config,
            );
            let total = history.backfill(&index, config.history.delay()).await?;
            println!("Backfilled {total} submissions.");
        }
        Command::Query { text } => {
            let engine = QueryEngine::new(store, aliases);
            let results = engine.search(&text.join(" ")).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for link in results {
                println!("- {link}");
            }
        }
        Command::Validate => {}
    }

    Ok(())
}
