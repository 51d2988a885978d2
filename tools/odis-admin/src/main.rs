//! ODIS admin CLI.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use odis_common::crypto::{blind, verify_signature, ThresholdKey};
use odis_common::KeyVersionInfo;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use odis_admin::api::CombinerClient;
use odis_admin::keygen::{KeyBundle, Keyspace};
use odis_admin::wallet::Wallet;

#[derive(Parser, Debug)]
#[command(name = "odis-admin", version, about = "Operator tools for ODIS signers and combiners")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deal a threshold key and write config fragments
    Keygen {
        #[arg(short, long)]
        threshold: u32,
        #[arg(short = 'n', long)]
        signers: u32,
        #[arg(long, default_value_t = 1)]
        key_version: u32,
        #[arg(long, value_enum, default_value_t = Keyspace::Both)]
        keyspace: Keyspace,
        #[arg(short, long, default_value = "keys")]
        out: PathBuf,
    },
    /// Print the version a service reports
    Status {
        #[arg(short, long, default_value = "http://127.0.0.1:8081")]
        url: String,
    },
    /// Query the PNP quota of a wallet account
    Quota {
        #[arg(short, long, default_value = "http://127.0.0.1:8081")]
        url: String,
        /// Hex secp256k1 private key of the account
        #[arg(long, env = "ODIS_PRIVATE_KEY")]
        private_key: String,
    },
    /// Blind, sign through the combiner, unblind and verify
    Sign {
        #[arg(short, long, default_value = "http://127.0.0.1:8081")]
        url: String,
        #[arg(long, env = "ODIS_PRIVATE_KEY")]
        private_key: String,
        /// Message to sign, such as an E.164 phone number
        #[arg(short, long)]
        message: String,
        #[arg(long)]
        key_version: Option<u32>,
        /// Public key material (`combiner.toml` key entry as JSON) to verify against
        #[arg(long)]
        public_key: Option<String>,
        /// Request timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Keygen {
            threshold,
            signers,
            key_version,
            keyspace,
            out,
        } => {
            let bundle = KeyBundle::deal(
                keyspace,
                threshold,
                signers,
                key_version,
                &mut rand::thread_rng(),
            )?;
            for path in bundle.write(&out)? {
                println!("{}", path.display());
            }
            info!(threshold, signers, key_version, "dealt keys");
        }
        Command::Status { url } => {
            let client = CombinerClient::new(url, Duration::from_secs(5))?;
            let status = client.status().await?;
            println!("{}", status.version);
        }
        Command::Quota { url, private_key } => {
            let wallet = Wallet::from_hex(&private_key)?;
            let signed = wallet.sign(&wallet.request(None, None))?;
            let client = CombinerClient::new(url, Duration::from_secs(10))?;
            let response = client.quota_status(signed.body, &signed.authorization).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Sign {
            url,
            private_key,
            message,
            key_version,
            public_key,
            timeout,
        } => {
            let wallet = Wallet::from_hex(&private_key)?;
            let blinded = blind(message.as_bytes(), &mut rand::thread_rng());
            let signed = wallet.sign(&wallet.request(Some(blinded.to_hex()), None))?;
            let client = CombinerClient::new(url, Duration::from_secs(timeout))?;
            let reply = client
                .sign(signed.body, &signed.authorization, key_version)
                .await?;
            debug!(key_version = ?reply.key_version, "combiner replied");

            let Some(blinded_signature) = reply.response.signature.as_deref() else {
                bail!("combiner response carries no signature");
            };
            let signature = blinded
                .unblind_hex(blinded_signature)
                .context("Combiner returned a malformed signature")?;

            if let Some(info) = public_key {
                let info: KeyVersionInfo =
                    serde_json::from_str(&info).context("Invalid public key material")?;
                let key = ThresholdKey::from_info(&info).context("Invalid public key material")?;
                if !verify_signature(&key.public_key, message.as_bytes(), &signature) {
                    bail!("signature does not verify under key version {}", key.version);
                }
                info!(key_version = key.version, "signature verified");
            }
            println!("{}", hex::encode(signature.to_bytes()));
        }
    }
    Ok(())
}
