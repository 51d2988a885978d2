//! ODIS signer binary.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry
//! 2. Load configuration (file, then `ODIS_*` environment)
//! 3. Open the store and connect the chain adapter
//! 4. Serve until ctrl-c

use anyhow::{Context, Result};
use clap::Parser;
use odis_signer::{SignerConfig, SignerService};
use odis_telemetry::{init_telemetry, TelemetryConfig};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "odis-signer", version, about = "ODIS threshold BLS signer")]
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
    let _telemetry = init_telemetry(TelemetryConfig::from_env("odis-signer"))
        .await
        .context("Failed to initialize telemetry")?;

    let mut config =
        SignerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        port = config.server.port,
        pnp_enabled = config.api.pnp_enabled,
        legacy_pnp_enabled = config.api.legacy_pnp_enabled,
        domains_enabled = config.api.domains_enabled,
        should_fail_open = config.api.should_fail_open,
        "configuration loaded"
    );

    let mut service = SignerService::from_config(config).context("Failed to create signer")?;

    tokio::select! {
        result = service.start() => {
            if let Err(e) = result {
                error!(error = %e, "signer exited with error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
