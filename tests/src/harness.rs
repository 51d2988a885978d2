//! # Cluster Harness
//!
//! Starts `n` signers and one combiner on loopback sockets inside the test
//! runtime. Every signer gets its own store and chain state so tests can
//! make them disagree.

use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::SigningKey;
use odis_combiner::{CombinerConfig, CombinerService};
use odis_common::chain::StaticChainState;
use odis_common::crypto::{generate_shares, DealtKey, G2};
use odis_common::domain::sign_domain_request;
use odis_common::domain::test_helpers::{domain, stage};
use odis_common::ecdsa::sign_personal_message;
use odis_common::ecdsa::test_helpers::generate_keypair;
use odis_common::wire::Address;
use odis_common::KeyVersionInfo;
use odis_signer::config::KeyShareConfig;
use odis_signer::{MemoryStore, SignerConfig, SignerService};
use primitive_types::U256;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Wei per query under the default signer quota config.
pub const QUERY_PRICE_WEI: u64 = 1_000_000_000_000_000;

/// How a signer slot behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerMode {
    Serving,
    /// Nothing listens on the port
    Offline,
    /// Accepts connections but never answers
    Hanging,
}

pub struct SignerNode {
    pub url: String,
    pub mode: SignerMode,
    pub store: Arc<MemoryStore>,
    pub chain: Arc<StaticChainState>,
}

type SignerHook = Box<dyn Fn(usize, &mut SignerConfig)>;
type CombinerHook = Box<dyn FnOnce(&mut CombinerConfig)>;

pub struct ClusterBuilder {
    threshold: u32,
    modes: Vec<SignerMode>,
    pnp_key: Option<Arc<DealtKey>>,
    signer_hook: Option<SignerHook>,
    combiner_hook: Option<CombinerHook>,
}

impl ClusterBuilder {
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn signers(mut self, modes: &[SignerMode]) -> Self {
        self.modes = modes.to_vec();
        self
    }

    /// Reuse a PNP key across clusters
    pub fn pnp_key(mut self, dealt: Arc<DealtKey>) -> Self {
        self.pnp_key = Some(dealt);
        self
    }

    pub fn configure_signers(mut self, hook: impl Fn(usize, &mut SignerConfig) + 'static) -> Self {
        self.signer_hook = Some(Box::new(hook));
        self
    }

    pub fn configure_combiner(mut self, hook: impl FnOnce(&mut CombinerConfig) + 'static) -> Self {
        self.combiner_hook = Some(Box::new(hook));
        self
    }

    pub async fn start(self) -> Cluster {
        let n = self.modes.len() as u32;
        let mut rng = rand::thread_rng();
        let pnp = match self.pnp_key {
            Some(dealt) => dealt,
            None => Arc::new(generate_shares(self.threshold, n, &mut rng).unwrap()),
        };
        let domains = generate_shares(self.threshold, n, &mut rng).unwrap();

        let mut signers = Vec::new();
        let mut idle = Vec::new();
        for (index, mode) in self.modes.iter().copied().enumerate() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let store = Arc::new(MemoryStore::new());
            let chain = Arc::new(StaticChainState::new());

            match mode {
                SignerMode::Serving => {
                    let mut config = SignerConfig::default();
                    config.keys.pnp.shares.push(KeyShareConfig {
                        version: 1,
                        share: pnp.shares[index].to_hex(),
                    });
                    config.keys.domains.shares.push(KeyShareConfig {
                        version: 1,
                        share: domains.shares[index].to_hex(),
                    });
                    if let Some(hook) = &self.signer_hook {
                        hook(index, &mut config);
                    }
                    let mut service =
                        SignerService::new(config, chain.clone(), store.clone()).unwrap();
                    tokio::spawn(async move { service.serve(listener).await });
                }
                SignerMode::Offline => drop(listener),
                SignerMode::Hanging => idle.push(listener),
            }
            signers.push(SignerNode {
                url,
                mode,
                store,
                chain,
            });
        }

        let urls: Vec<String> = signers.iter().map(|s| s.url.clone()).collect();
        let mut config = CombinerConfig::default();
        config.server.timeout = Duration::from_secs(4);
        config.pnp.signers = urls.clone();
        config.pnp.timeout = Duration::from_millis(800);
        config.pnp.keys = vec![pnp.info(1)];
        config.domains.signers = urls;
        config.domains.timeout = Duration::from_millis(800);
        config.domains.keys = vec![domains.info(1)];
        if let Some(hook) = self.combiner_hook {
            hook(&mut config);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let combiner_url = format!("http://{}", listener.local_addr().unwrap());
        let mut combiner =
            CombinerService::new(config, Arc::new(StaticChainState::new())).unwrap();
        tokio::spawn(async move { combiner.serve(listener).await });

        Cluster {
            signers,
            combiner_url,
            pnp_key: pnp.info(1),
            domain_key: domains.info(1),
            http: reqwest::Client::new(),
            _idle: idle,
        }
    }
}

pub struct Cluster {
    pub signers: Vec<SignerNode>,
    pub combiner_url: String,
    pub pnp_key: KeyVersionInfo,
    pub domain_key: KeyVersionInfo,
    http: reqwest::Client,
    _idle: Vec<TcpListener>,
}

/// A funded PNP client.
pub struct Account {
    pub key: SigningKey,
    pub address: Address,
}

impl Account {
    pub fn new() -> Self {
        let (key, address) = generate_keypair();
        Self { key, address }
    }

    pub fn body(&self, blinded: Option<&str>) -> Vec<u8> {
        let mut body = json!({ "account": format!("{:?}", self.address) });
        if let Some(blinded) = blinded {
            body["blindedQueryPhoneNumber"] = json!(blinded);
        }
        serde_json::to_vec(&body).unwrap()
    }

    pub fn authorization(&self, body: &[u8]) -> String {
        sign_personal_message(body, &self.key).unwrap()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of a domain request for a keyed single-stage domain.
pub fn domain_body(kind: &str, key: &SigningKey, nonce: u64, blinded: Option<&str>) -> Vec<u8> {
    let public_key = format!(
        "{:?}",
        odis_common::ecdsa::address_from_pubkey(key.verifying_key())
    );
    let mut value = json!({
        "type": kind,
        "domain": domain(vec![stage(0)], Some(public_key)),
        "options": { "nonce": nonce },
    });
    if let Some(blinded) = blinded {
        value["blindedMessage"] = json!(blinded);
    }
    sign_domain_request(&mut value, key).unwrap();
    serde_json::to_vec(&value).unwrap()
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Cluster {
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder {
            threshold: 2,
            modes: vec![SignerMode::Serving; 3],
            pnp_key: None,
            signer_hook: None,
            combiner_hook: None,
        }
    }

    pub fn pnp_public_key(&self) -> G2 {
        odis_common::crypto::ThresholdKey::from_info(&self.pnp_key)
            .unwrap()
            .public_key
    }

    /// Pays for `queries` on every signer's view of the chain.
    pub fn fund(&self, account: &Account, queries: u64) {
        for signer in &self.signers {
            self.fund_on(signer, account, queries);
        }
    }

    pub fn fund_on(&self, signer: &SignerNode, account: &Account, queries: u64) {
        signer
            .chain
            .set_total_paid(account.address, U256::from(QUERY_PRICE_WEI) * U256::from(queries));
    }

    pub async fn post(&self, path: &str, body: Vec<u8>, headers: &[(&str, String)]) -> Reply {
        let mut request = self
            .http
            .post(format!("{}{}", self.combiner_url, path))
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.unwrap();
        Reply {
            status,
            headers,
            body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        }
    }

    pub async fn post_pnp(&self, path: &str, account: &Account, blinded: Option<&str>) -> Reply {
        let body = account.body(blinded);
        let authorization = account.authorization(&body);
        self.post(path, body, &[("authorization", authorization)]).await
    }
}
