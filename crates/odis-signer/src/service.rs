//! Signer service: shared state, router and server loop.

use crate::config::{ConfigError, SignerConfig};
use crate::keystore::KeyStore;
use crate::pipeline::domain::DomainPolicy;
use crate::pipeline::pnp::PnpPolicy;
use crate::pipeline::{run_pipeline, EndpointPolicy};
use crate::quota::QuotaLedger;
use crate::store::{build_store, SignerStore, StoreError};
use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, MethodRouter},
    Json, Router,
};
use bytes::Bytes;
use odis_common::chain::{build_chain_state, ChainState, ChainStateError};
use odis_common::crypto::CryptoError;
use odis_common::http::GuardLayer;
use odis_common::wire::{Endpoint, StatusResponse, MAX_BODY_BYTES};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Signer startup errors
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("key error: {0}")]
    Keys(#[from] CryptoError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainStateError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every request.
pub struct SignerState {
    pub config: SignerConfig,
    pub keys: KeyStore,
    pub store: Arc<dyn SignerStore>,
    pub chain: Arc<dyn ChainState>,
    pub quota: QuotaLedger,
    /// Reported in every response body
    pub version: String,
}

pub struct SignerService {
    state: Arc<SignerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl SignerService {
    /// Create a signer over explicit collaborators
    pub fn new(
        config: SignerConfig,
        chain: Arc<dyn ChainState>,
        store: Arc<dyn SignerStore>,
    ) -> Result<Self, SignerError> {
        config.validate()?;
        let keys = KeyStore::from_config(&config.keys)?;
        let quota = QuotaLedger::new(Arc::clone(&chain), Arc::clone(&store), config.quota.clone());

        Ok(Self {
            state: Arc::new(SignerState {
                config,
                keys,
                store,
                chain,
                quota,
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            shutdown_tx: None,
        })
    }

    /// Create a signer with the configured chain adapter and store
    pub fn from_config(config: SignerConfig) -> Result<Self, SignerError> {
        let chain = build_chain_state(&config.chain)?;
        let store = build_store(&config.storage)?;
        Self::new(config, chain, store)
    }

    pub fn state(&self) -> Arc<SignerState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(&mut self) -> Result<(), SignerError> {
        let listener = TcpListener::bind(self.state.config.addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), SignerError> {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let addr = listener.local_addr()?;
        let router = self.router();
        info!(addr = %addr, version = %self.state.version, "Starting signer");
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Received shutdown signal");
            }
            result = server => {
                match result {
                    Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                    Err(e) => error!(error = %e, "HTTP server task failed"),
                    Ok(Ok(())) => {}
                }
            }
        }

        info!("Signer stopped");
        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = &self.state;
        Router::new()
            .route(Endpoint::Status.signer_path(), get(status))
            .route(Endpoint::Metrics.signer_path(), get(metrics))
            .route(Endpoint::PnpSign.signer_path(), policy_route(PnpPolicy::SIGN))
            .route(Endpoint::PnpQuota.signer_path(), policy_route(PnpPolicy::QUOTA))
            .route(
                Endpoint::LegacyPnpSign.signer_path(),
                policy_route(PnpPolicy::LEGACY_SIGN),
            )
            .route(
                Endpoint::LegacyPnpQuota.signer_path(),
                policy_route(PnpPolicy::LEGACY_QUOTA),
            )
            .route(Endpoint::DomainSign.signer_path(), policy_route(DomainPolicy::SIGN))
            .route(
                Endpoint::DomainQuotaStatus.signer_path(),
                policy_route(DomainPolicy::QUOTA_STATUS),
            )
            .route(
                Endpoint::DisableDomain.signer_path(),
                policy_route(DomainPolicy::DISABLE),
            )
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(GuardLayer::new(
                "signer",
                state.version.clone(),
                state.config.server.timeout,
            ))
            .with_state(Arc::clone(state))
    }
}

fn policy_route<P>(policy: P) -> MethodRouter<Arc<SignerState>>
where
    P: EndpointPolicy + Copy,
{
    post(
        move |State(state): State<Arc<SignerState>>,
              headers: HeaderMap,
              body: Result<Bytes, BytesRejection>| async move {
            run_pipeline(&policy, &state, &headers, body).await
        },
    )
}

async fn status(State(state): State<Arc<SignerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
    })
}

async fn metrics() -> impl IntoResponse {
    match odis_telemetry::encode_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
