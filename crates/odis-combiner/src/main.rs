//! ODIS combiner binary.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration (file, then `ODIS_*` environment)
//! 3. Load public key material and connect the chain adapter
//! 4. Serve until ctrl-c

use anyhow::{Context, Result};
use clap::Parser;
use odis_combiner::{CombinerConfig, CombinerService};
use odis_telemetry::{init_telemetry, TelemetryConfig};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "odis-combiner", version, about = "ODIS threshold signature combiner")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ODIS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::from_env("odis-combiner"))
        .await
        .context("Failed to initialize telemetry")?;

    let mut config =
        CombinerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        port = config.server.port,
        pnp_signers = config.pnp.signers.len(),
        domain_signers = config.domains.signers.len(),
        pnp_key_version = config.pnp.current_version,
        domains_key_version = config.domains.current_version,
        should_fail_open = config.api.should_fail_open,
        "configuration loaded"
    );

    let mut service = CombinerService::from_config(config).context("Failed to create combiner")?;

    tokio::select! {
        result = service.start() => {
            if let Err(e) = result {
                error!(error = %e, "combiner exited with error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
