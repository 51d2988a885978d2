//! Trusted-dealer key generation.
//!
//! Writes one `signer-<i>.toml` per signer with its private share and a
//! `combiner.toml` with the public key material. Each file is a config
//! fragment to merge into the service's configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use odis_common::crypto::{generate_shares, DealtKey};
use odis_common::KeyVersionInfo;
use rand::RngCore;
use serde::Serialize;

/// Which keyspaces to deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Keyspace {
    Pnp,
    Domains,
    Both,
}

impl Keyspace {
    fn includes_pnp(self) -> bool {
        matches!(self, Keyspace::Pnp | Keyspace::Both)
    }

    fn includes_domains(self) -> bool {
        matches!(self, Keyspace::Domains | Keyspace::Both)
    }
}

#[derive(Debug, Serialize)]
struct ShareEntry {
    version: u32,
    share: String,
}

#[derive(Debug, Serialize)]
struct ShareSet {
    current_version: u32,
    shares: Vec<ShareEntry>,
}

#[derive(Debug, Default, Serialize)]
struct SignerKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pnp: Option<ShareSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domains: Option<ShareSet>,
}

#[derive(Debug, Serialize)]
struct SignerFragment {
    keys: SignerKeys,
}

#[derive(Debug, Serialize)]
struct PublicSet {
    current_version: u32,
    keys: Vec<KeyVersionInfo>,
}

#[derive(Debug, Default, Serialize)]
struct CombinerFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pnp: Option<PublicSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domains: Option<PublicSet>,
}

/// Dealt keys ready to be written out.
pub struct KeyBundle {
    pub version: u32,
    pub pnp: Option<DealtKey>,
    pub domains: Option<DealtKey>,
}

impl KeyBundle {
    pub fn deal<R: RngCore>(
        keyspace: Keyspace,
        threshold: u32,
        signers: u32,
        version: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let mut deal = |wanted: bool| -> Result<Option<DealtKey>> {
            if !wanted {
                return Ok(None);
            }
            generate_shares(threshold, signers, &mut *rng)
                .map(Some)
                .context("Failed to deal key")
        };
        Ok(Self {
            version,
            pnp: deal(keyspace.includes_pnp())?,
            domains: deal(keyspace.includes_domains())?,
        })
    }

    fn share_set(&self, dealt: &Option<DealtKey>, signer: usize) -> Option<ShareSet> {
        dealt.as_ref().map(|dealt| ShareSet {
            current_version: self.version,
            shares: vec![ShareEntry {
                version: self.version,
                share: dealt.shares[signer].to_hex(),
            }],
        })
    }

    fn public_set(&self, dealt: &Option<DealtKey>) -> Option<PublicSet> {
        dealt.as_ref().map(|dealt| PublicSet {
            current_version: self.version,
            keys: vec![dealt.info(self.version)],
        })
    }

    fn signer_count(&self) -> usize {
        self.pnp
            .as_ref()
            .or(self.domains.as_ref())
            .map_or(0, |dealt| dealt.shares.len())
    }

    /// Config fragment for signer `index`.
    pub fn signer_toml(&self, index: usize) -> Result<String> {
        let fragment = SignerFragment {
            keys: SignerKeys {
                pnp: self.share_set(&self.pnp, index),
                domains: self.share_set(&self.domains, index),
            },
        };
        toml::to_string_pretty(&fragment).context("Failed to encode signer keys")
    }

    /// Config fragment for the combiner.
    pub fn combiner_toml(&self) -> Result<String> {
        let fragment = CombinerFragment {
            pnp: self.public_set(&self.pnp),
            domains: self.public_set(&self.domains),
        };
        toml::to_string_pretty(&fragment).context("Failed to encode public keys")
    }

    /// Writes every fragment under `dir`, returning the written paths.
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut written = Vec::new();
        for index in 0..self.signer_count() {
            let path = dir.join(format!("signer-{index}.toml"));
            fs::write(&path, self.signer_toml(index)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }
        let path = dir.join("combiner.toml");
        fs::write(&path, self.combiner_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
        Ok(written)
    }
}
