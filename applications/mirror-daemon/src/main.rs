/// ID Photo Mirror Daemon - keeps a local mirror of the reference photo repository
use clap::{Parser, Subcommand};
use idphoto_mirror::{MirrorConfig, MirrorService};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "idphoto-mirrord")]
#[command(about = "Local mirror of the ID photo repository", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "IDPHOTO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the source repository and keep the mirror in sync
    Run,
    /// Run a single sync pass and print the result
    Sync,
    /// Print mirror statistics
    Stats,
    /// Resolve identifiers to mirrored photos
    Lookup {
        /// Identifiers to look up
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idphoto_mirror=info,idphoto_mirrord=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = idphoto_mirrord::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Sync => sync_once(config).await?,
        Commands::Stats => stats(config).await?,
        Commands::Lookup { ids } => lookup(config, &ids).await?,
    }

    Ok(())
}

async fn run(config: MirrorConfig) -> anyhow::Result<()> {
    tracing::info!("Starting mirror daemon");
    tracing::info!("Source: {:?}", config.source_path);
    tracing::info!("Mirror: {}", config.mirror_path.display());

    let service = MirrorService::new(config)?;
    let mut events = service.subscribe();
    service.start().await?;

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_json(&event)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event output fell behind, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn sync_once(config: MirrorConfig) -> anyhow::Result<()> {
    let service = MirrorService::new(config)?;
    service.initialize().await?;

    let result = service.sync_now().await;
    print_json(&result)?;

    if !result.success {
        anyhow::bail!(
            "Sync failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn stats(config: MirrorConfig) -> anyhow::Result<()> {
    let service = MirrorService::new(config)?;
    service.initialize().await?;

    print_json(&service.get_stats().await)
}

async fn lookup(config: MirrorConfig, ids: &[String]) -> anyhow::Result<()> {
    let service = MirrorService::new(config)?;
    service.initialize().await?;

    let mut found = BTreeMap::new();
    for id in ids {
        let path = service.existence().lookup(id).await;
        found.insert(id.clone(), path);
    }

    if service.store().is_empty().await {
        tracing::warn!("Mirror is empty; misses mean \"not known yet\", not \"no photo\"");
    }

    print_json(&found)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
