//! Process entry point: parses the CLI, loads config, builds the shared
//! singletons (dedup store, fetcher, publishers, searcher), and hands off to
//! the supervisor until it reports an exit code.

mod chat;
mod config;
mod constants;
mod dedup;
mod entry;
mod errors;
mod feed_reader;
mod fetch;
mod hashing;
mod parser;
mod pipeline;
mod poster;
mod publish;
mod search;
mod state;
mod style;
mod supervisor;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::Config;
use crate::dedup::DedupStore;
use crate::fetch::UrlFetcher;
use crate::publish::github::GithubPublisher;
use crate::publish::Publisher;
use crate::search::github::GithubSearcher;
use crate::search::Searcher;
use crate::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the YAML configuration file (spec §6).
    #[arg(long)]
    config_path: PathBuf,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();
}

fn build_publishers(config: &Config) -> Result<Vec<Arc<dyn Publisher>>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    for (name, publisher_config) in &config.publish {
        match publisher_config.kind.as_str() {
            "github" => {
                let token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN env var is required for the github publisher")?;
                publishers.push(Arc::new(GithubPublisher::new(name.clone(), &publisher_config.repo, token)?));
            }
            other => anyhow::bail!("publisher {name}: unknown kind {other:?}"),
        }
    }
    Ok(publishers)
}

fn build_searcher(config: &Config) -> Result<Option<Arc<dyn Searcher>>> {
    let Some(search_config) = config.publish.values().find(|p| p.kind == "github") else {
        return Ok(None);
    };
    let token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN env var is required for the github searcher")?;
    Ok(Some(Arc::new(GithubSearcher::new(&search_config.repo, token)?)))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config_path)?);

    let dedup = Arc::new(DedupStore::open(&config.dir.join("feedcaster.sqlite3"))?);
    let fetcher = Arc::new(UrlFetcher::new(&config.dir, Default::default())?);

    let publishers = build_publishers(&config)?;
    let searcher = build_searcher(&config)?;

    let supervisor = Arc::new(Supervisor::new(config.clone(), searcher, publishers)?);

    let exit_code = tokio::select! {
        result = supervisor.run(dedup, fetcher) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            0
        }
    };

    std::process::exit(exit_code);
}
