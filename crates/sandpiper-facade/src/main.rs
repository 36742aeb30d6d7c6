use anyhow::Result;
use clap::Parser;
use sandpiper_config::SandpiperConfig;
use sandpiper_facade::Sandpiper;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sandpiper")]
#[command(about = "Sandpiper Browser Automation Service")]
struct Args {
    /// SQLite database URL backing the cache and workflow stores.
    #[arg(long)]
    database_url: Option<String>,

    /// Cap on concurrently open browser sessions.
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Idle seconds after which a pooled browser is evicted.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // SANDPIPER_* environment overrides first, CLI flags on top.
    let mut config = SandpiperConfig::from_env()?;
    if let Some(database_url) = args.database_url {
        config.storage.database_url = database_url;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.pool.max_sessions = max_sessions;
    }
    if let Some(secs) = args.idle_timeout_secs {
        config.pool.idle_timeout = std::time::Duration::from_secs(secs);
    }
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database_url = %config.storage.database_url,
        max_sessions = config.pool.max_sessions,
        "Starting Sandpiper service"
    );

    let service = Sandpiper::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("service startup failed: {}", e))?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, initiating graceful shutdown");

    service.shutdown().await;
    tracing::info!("Sandpiper service shutdown complete");
    Ok(())
}
