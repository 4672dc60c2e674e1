//! Eddy standalone server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use eddy_engine::memory::InMemoryTopicAdmin;
use eddy_engine::{EngineBuilder, EngineConfig, StandaloneExecutor};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Eddy - streaming SQL over topics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQL script to execute
    #[arg(long, env = "EDDY_QUERIES_FILE")]
    queries_file: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Topic to pre-create in the embedded broker, as NAME[:PARTITIONS[:REPLICAS]]
    #[arg(long = "topic")]
    topics: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("eddy={0},eddy_engine={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Eddy server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!("Config file: {}", path.display());
            EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let admin = Arc::new(InMemoryTopicAdmin::new());
    for topic in &args.topics {
        let (name, partitions, replicas) = parse_topic(topic)?;
        admin.add_topic(name, partitions, replicas);
    }

    let script = std::fs::read_to_string(&args.queries_file)
        .with_context(|| format!("reading queries file {}", args.queries_file.display()))?;

    let engine = EngineBuilder::new().config(config).topic_admin(admin).build();
    let mut executor = StandaloneExecutor::new(engine);
    executor.start(&script)?;
    info!(queries = executor.queries().len(), "Queries running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    executor.stop();
    Ok(())
}

fn parse_topic(arg: &str) -> Result<(&str, u32, u16)> {
    let mut parts = arg.split(':');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        bail!("empty topic name in '{arg}'");
    }
    let partitions = match parts.next() {
        Some(p) => p
            .parse()
            .with_context(|| format!("invalid partition count in '{arg}'"))?,
        None => 1,
    };
    let replicas = match parts.next() {
        Some(r) => r
            .parse()
            .with_context(|| format!("invalid replica count in '{arg}'"))?,
        None => 1,
    };
    Ok((name, partitions, replicas))
}
