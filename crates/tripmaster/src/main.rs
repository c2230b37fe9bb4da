//! Trip master replica process: loads its configuration and key material,
//! runs recovery, then serves the normal event loop until killed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tripmaster::{ReplicaConfig, ReplicaError, Replica};

#[derive(Parser)]
#[command(name = "tripmaster")]
#[command(about = "Replicated trip/close decision engine for a protective relay breaker")]
struct Cli {
    /// This replica's id (1..N), validated against the config file's
    /// replica_id — the disambiguator when multiple replicas share one
    /// config for local testing.
    replica_id: u32,

    /// Path to this replica's TOML configuration file.
    #[arg(short, long, default_value = "tripmaster.toml")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("tripmaster=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), ReplicaError> {
    let config = ReplicaConfig::load(&cli.config)?;
    config.check_replica_id(cli.replica_id)?;
    tracing::info!(
        replica_id = config.replica_id,
        variant = ?config.variant,
        "loaded configuration"
    );

    let mut replica = Replica::bind(config).await?;

    tracing::info!("entering recovery");
    replica.recover().await?;
    tracing::info!("recovery complete, entering normal operation");

    tokio::select! {
        result = replica.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            Ok(())
        }
    }
}
