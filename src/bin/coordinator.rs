use anyhow::Context;
use clap::Parser;
use fleet_dispatch::{
    Coordinator,
    config::read_config_file,
    util::get_config_path,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Dispatches jobs to and monitors a fleet of agents")]
struct Args {
    /// Config file (falls back to $FLEET_CONFIG)
    #[arg(short, long)]
    file: Option<String>,

    /// Log level for the coordinator (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_dispatch", level),
        ("fleet_coordinator", level),
        ("coordinator", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let path = args
        .file
        .clone()
        .or_else(get_config_path)
        .context("no configuration file given (use -f or set FLEET_CONFIG)")?;

    let config = read_config_file(&path)?;
    let coordinator = Coordinator::from_config(&config).await?;
    info!(
        "coordinator running with {} agents",
        coordinator.list_agents().await.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    if let Err(e) = coordinator.shutdown().await {
        error!("error during shutdown: {e}");
    }

    Ok(())
}
