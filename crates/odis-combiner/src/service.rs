//! Combiner service: shared state, router and server loop.

use crate::client::{ClientError, SignerClient};
use crate::config::{CombinerConfig, ConfigError, SignerSetConfig};
use crate::pipeline::domain::DomainPolicy;
use crate::pipeline::pnp::PnpPolicy;
use crate::pipeline::{run_pipeline, CombinerPolicy};
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
use odis_common::KeyRing;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Combiner startup errors
#[derive(Debug, Error)]
pub enum CombinerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("key error: {0}")]
    Keys(#[from] CryptoError),

    #[error("signer client error: {0}")]
    Client(#[from] ClientError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainStateError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by every request.
pub struct CombinerState {
    pub config: CombinerConfig,
    pub pnp_keys: KeyRing,
    pub domain_keys: KeyRing,
    pub pnp_signers: SignerClient,
    pub domain_signers: SignerClient,
    /// Read for the front-door PNP authentication
    pub chain: Arc<dyn ChainState>,
    pub version: String,
}

fn key_ring(set: &SignerSetConfig) -> Result<KeyRing, CryptoError> {
    if set.keys.is_empty() {
        return Ok(KeyRing::empty(set.current_version));
    }
    KeyRing::new(set.current_version, &set.keys)
}

pub struct CombinerService {
    state: Arc<CombinerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CombinerService {
    /// Create a combiner over an explicit chain adapter
    pub fn new(config: CombinerConfig, chain: Arc<dyn ChainState>) -> Result<Self, CombinerError> {
        config.validate()?;
        let pnp_keys = key_ring(&config.pnp)?;
        let domain_keys = key_ring(&config.domains)?;
        let pnp_signers = SignerClient::new(config.pnp.signers.clone(), config.pnp.timeout)?;
        let domain_signers =
            SignerClient::new(config.domains.signers.clone(), config.domains.timeout)?;

        Ok(Self {
            state: Arc::new(CombinerState {
                config,
                pnp_keys,
                domain_keys,
                pnp_signers,
                domain_signers,
                chain,
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            shutdown_tx: None,
        })
    }

    /// Create a combiner with the configured chain adapter
    pub fn from_config(config: CombinerConfig) -> Result<Self, CombinerError> {
        let chain = build_chain_state(&config.chain)?;
        Self::new(config, chain)
    }

    pub fn state(&self) -> Arc<CombinerState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(&mut self) -> Result<(), CombinerError> {
        let listener = TcpListener::bind(self.state.config.addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), CombinerError> {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let addr = listener.local_addr()?;
        let router = self.router();
        info!(
            addr = %addr,
            version = %self.state.version,
            pnp_signers = self.state.pnp_signers.signers().len(),
            domain_signers = self.state.domain_signers.signers().len(),
            "Starting combiner"
        );
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

        info!("Combiner stopped");
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
            .route(Endpoint::Status.combiner_path(), get(status))
            .route(Endpoint::Metrics.combiner_path(), get(metrics))
            .route(Endpoint::PnpSign.combiner_path(), policy_route(PnpPolicy::SIGN))
            .route(Endpoint::PnpQuota.combiner_path(), policy_route(PnpPolicy::QUOTA))
            .route(
                Endpoint::LegacyPnpSign.combiner_path(),
                policy_route(PnpPolicy::LEGACY_SIGN),
            )
            .route(
                Endpoint::LegacyPnpQuota.combiner_path(),
                policy_route(PnpPolicy::LEGACY_QUOTA),
            )
            .route(
                Endpoint::DomainSign.combiner_path(),
                policy_route(DomainPolicy::SIGN),
            )
            .route(
                Endpoint::DomainQuotaStatus.combiner_path(),
                policy_route(DomainPolicy::QUOTA_STATUS),
            )
            .route(
                Endpoint::DisableDomain.combiner_path(),
                policy_route(DomainPolicy::DISABLE),
            )
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(GuardLayer::new(
                "combiner",
                state.version.clone(),
                state.config.server.timeout,
            ))
            .with_state(Arc::clone(state))
    }
}

fn policy_route<P>(policy: P) -> MethodRouter<Arc<CombinerState>>
where
    P: CombinerPolicy + Copy,
{
    post(
        move |State(state): State<Arc<CombinerState>>,
              headers: HeaderMap,
              body: Result<Bytes, BytesRejection>| async move {
            run_pipeline(&policy, &state, &headers, body).await
        },
    )
}

async fn status(State(state): State<Arc<CombinerState>>) -> Json<StatusResponse> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use k256::ecdsa::SigningKey;
    use odis_common::chain::StaticChainState;
    use odis_common::crypto::{
        blind, decode_blinded_message, generate_shares, verify_signature, BlindedMessage,
        DealtKey, KeyShare, ThresholdKey,
    };
    use odis_common::domain::sign_domain_request;
    use odis_common::domain::test_helpers::{domain, stage};
    use odis_common::ecdsa::sign_personal_message;
    use odis_common::ecdsa::test_helpers::generate_keypair;
    use odis_common::wire::domain::{DomainResponse, DomainState};
    use odis_common::wire::pnp::{PnpQuotaStatus, PnpResponse};
    use odis_common::wire::Address;
    use odis_common::{ErrorMessage, WarningMessage, KEY_VERSION_HEADER};
    use odis_telemetry::SIGNATURE_SHARES_REJECTED;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const MESSAGE: &[u8] = b"+14155550123";

    /// How a stub signer answers every request.
    #[derive(Clone)]
    enum Stub {
        Honest(Arc<KeyShare>, PnpQuotaStatus),
        BadShare(Arc<KeyShare>),
        WrongKeyVersion(Arc<KeyShare>),
        Fixed(StatusCode, Value),
        Hang,
    }

    fn quota(performed_query_count: u64, total_quota: u64) -> PnpQuotaStatus {
        PnpQuotaStatus {
            performed_query_count,
            total_quota,
            block_number: Some(100),
        }
    }

    fn signed(version: String, body: PnpResponse) -> Response {
        ([(KEY_VERSION_HEADER, version)], Json(body)).into_response()
    }

    async fn stub_handler(State(stub): State<Stub>, headers: HeaderMap, body: Bytes) -> Response {
        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let requested = headers
            .get(KEY_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("1")
            .to_string();
        let point = request["blindedQueryPhoneNumber"]
            .as_str()
            .and_then(|b| decode_blinded_message(b).ok());

        match (stub, point) {
            (Stub::Honest(share, quota), Some(point)) => signed(
                requested,
                PnpResponse::success("stub", Some(share.partial_sign(&point).to_hex()), quota, &[]),
            ),
            (Stub::BadShare(share), Some(_)) => {
                let other = blind(b"something else", &mut rand::thread_rng());
                let forged = share.partial_sign(&other.point).to_hex();
                signed(
                    requested,
                    PnpResponse::success("stub", Some(forged), quota(1, 10), &[]),
                )
            }
            (Stub::WrongKeyVersion(share), Some(point)) => signed(
                "99".into(),
                PnpResponse::success("stub", Some(share.partial_sign(&point).to_hex()), quota(1, 10), &[]),
            ),
            (Stub::Fixed(status, body), _) => (status, Json(body)).into_response(),
            (Stub::Hang, _) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK.into_response()
            }
            (_, None) => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    async fn spawn_stub(stub: Stub) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().fallback(stub_handler).with_state(stub);
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}")
    }

    fn share(dealt: &DealtKey, index: usize) -> Arc<KeyShare> {
        Arc::new(KeyShare::from_hex(&dealt.shares[index].to_hex()).unwrap())
    }

    struct Harness {
        router: Router,
        dealt: DealtKey,
        wallet: SigningKey,
        account: Address,
    }

    async fn harness(
        stubs: impl FnOnce(&DealtKey) -> Vec<Stub>,
        configure: impl FnOnce(&mut CombinerConfig),
    ) -> Harness {
        let dealt = generate_shares(2, 3, &mut rand::thread_rng()).unwrap();
        let mut urls = Vec::new();
        for stub in stubs(&dealt) {
            urls.push(spawn_stub(stub).await);
        }

        let mut config = CombinerConfig::default();
        config.server.timeout = Duration::from_secs(3);
        for set in [&mut config.pnp, &mut config.domains] {
            set.signers = urls.clone();
            set.timeout = Duration::from_millis(300);
            set.keys = vec![dealt.info(1)];
        }
        configure(&mut config);

        let service = CombinerService::new(config, Arc::new(StaticChainState::new())).unwrap();
        let (wallet, account) = generate_keypair();
        Harness {
            router: service.router(),
            dealt,
            wallet,
            account,
        }
    }

    fn honest(dealt: &DealtKey) -> Vec<Stub> {
        (0..3).map(|i| Stub::Honest(share(dealt, i), quota(1, 10))).collect()
    }

    fn fixed_pnp(status: StatusCode, body: PnpResponse) -> Stub {
        Stub::Fixed(status, serde_json::to_value(body).unwrap())
    }

    fn fixed_domain(status: StatusCode, body: DomainResponse) -> Stub {
        Stub::Fixed(status, serde_json::to_value(body).unwrap())
    }

    impl Harness {
        fn pnp_body(&self, blinded: Option<&BlindedMessage>) -> Vec<u8> {
            let mut body = json!({
                "account": format!("{:?}", self.account),
                "sessionID": "test-session",
            });
            if let Some(blinded) = blinded {
                body["blindedQueryPhoneNumber"] = json!(blinded.to_hex());
            }
            serde_json::to_vec(&body).unwrap()
        }

        async fn post(
            &self,
            path: &str,
            body: Vec<u8>,
            headers: &[(&str, String)],
        ) -> (StatusCode, HeaderMap, Value) {
            let mut request = Request::builder().method("POST").uri(path);
            for (name, value) in headers {
                request = request.header(*name, value);
            }
            let response = self
                .router
                .clone()
                .oneshot(request.body(Body::from(body)).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }

        async fn post_signed(&self, path: &str, body: Vec<u8>) -> (StatusCode, HeaderMap, Value) {
            let signature = sign_personal_message(&body, &self.wallet).unwrap();
            self.post(path, body, &[("authorization", signature)]).await
        }

        fn public_key(&self) -> odis_common::crypto::G2 {
            ThresholdKey::from_info(&self.dealt.info(1)).unwrap().public_key
        }
    }

    #[tokio::test]
    async fn test_sign_combines_threshold() {
        let h = harness(honest, |_| {}).await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());

        let (status, headers, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(headers.get(KEY_VERSION_HEADER).unwrap(), "1");
        let response: PnpResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.performed_query_count, Some(1));

        let unblinded = blinded.unblind_hex(&response.signature.unwrap()).unwrap();
        assert!(verify_signature(&h.public_key(), MESSAGE, &unblinded));
    }

    #[tokio::test]
    async fn test_legacy_sign_route() {
        let h = harness(honest, |_| {}).await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h
            .post_signed("/getBlindedMessageSig", h.pnp_body(Some(&blinded)))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["signature"].is_string());
    }

    #[tokio::test]
    async fn test_sign_survives_one_bad_signer() {
        let h = harness(
            |dealt| {
                vec![
                    Stub::BadShare(share(dealt, 0)),
                    Stub::Honest(share(dealt, 1), quota(1, 10)),
                    Stub::Honest(share(dealt, 2), quota(1, 10)),
                ]
            },
            |_| {},
        )
        .await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let unblinded = blinded.unblind_hex(body["signature"].as_str().unwrap()).unwrap();
        assert!(verify_signature(&h.public_key(), MESSAGE, &unblinded));
    }

    #[tokio::test]
    async fn test_sign_below_threshold() {
        let before = SIGNATURE_SHARES_REJECTED.get();
        let h = harness(
            |dealt| {
                vec![
                    Stub::BadShare(share(dealt, 0)),
                    Stub::WrongKeyVersion(share(dealt, 1)),
                    Stub::Honest(share(dealt, 2), quota(1, 10)),
                ]
            },
            |_| {},
        )
        .await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], ErrorMessage::NotEnoughPartialSignatures.as_str());
        assert!(body.get("signature").is_none());
        assert!(SIGNATURE_SHARES_REJECTED.get() > before);
    }

    #[tokio::test]
    async fn test_sign_passes_through_exceeded_quota() {
        let exhausted = PnpResponse::failure(
            "stub",
            WarningMessage::ExceededQuota.into(),
            Some(quota(10, 10)),
        );
        let h = harness(
            |_| vec![fixed_pnp(StatusCode::FORBIDDEN, exhausted); 3],
            |_| {},
        )
        .await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], WarningMessage::ExceededQuota.as_str());
        assert_eq!(body["performedQueryCount"], 10);
    }

    #[tokio::test]
    async fn test_all_signers_time_out() {
        let h = harness(|_| vec![Stub::Hang; 3], |_| {}).await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], ErrorMessage::NotEnoughPartialSignatures.as_str());
    }

    #[tokio::test]
    async fn test_quota_takes_threshold_smallest() {
        let h = harness(
            |_| {
                [1, 4, 9]
                    .into_iter()
                    .map(|count| {
                        fixed_pnp(
                            StatusCode::OK,
                            PnpResponse::success("stub", None, quota(count, 20), &[]),
                        )
                    })
                    .collect()
            },
            |_| {},
        )
        .await;
        let (status, _, body) = h.post_signed("/quotaStatus", h.pnp_body(None)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["performedQueryCount"], 4);
        assert_eq!(body["totalQuota"], 20);
        assert_eq!(
            body["warnings"][0],
            WarningMessage::InconsistentSignerQueryMeasurements.as_str()
        );
    }

    #[tokio::test]
    async fn test_quota_discrepancy_fails() {
        let h = harness(
            |_| {
                [10, 10, 20]
                    .into_iter()
                    .map(|total| {
                        fixed_pnp(
                            StatusCode::OK,
                            PnpResponse::success("stub", None, quota(1, total), &[]),
                        )
                    })
                    .collect()
            },
            |_| {},
        )
        .await;
        let (status, _, body) = h.post_signed("/getQuota", h.pnp_body(None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            ErrorMessage::ThresholdPnpQuotaStatusFailure.as_str()
        );
    }

    #[tokio::test]
    async fn test_front_door_rejections() {
        let h = harness(honest, |_| {}).await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());

        let (status, _, body) = h.post("/sign", h.pnp_body(Some(&blinded)), &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], WarningMessage::UnauthenticatedUser.as_str());

        let (status, _, _) = h.post_signed("/sign", h.pnp_body(None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = h.pnp_body(Some(&blinded));
        let signature = sign_personal_message(&body, &h.wallet).unwrap();
        let (status, _, body) = h
            .post(
                "/sign",
                body,
                &[("authorization", signature), ("keyVersion", "7".into())],
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], WarningMessage::InvalidKeyVersionRequest.as_str());

        let oversized = vec![b' '; MAX_BODY_BYTES + 1];
        let (status, _, _) = h.post_signed("/sign", oversized).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disabled_api_contacts_no_signer() {
        let h = harness(
            |_| Vec::new(),
            |config| {
                config.api.pnp_enabled = false;
                config.pnp.signers = vec!["http://127.0.0.1:1".into(); 3];
                config.domains.signers = config.pnp.signers.clone();
            },
        )
        .await;
        let blinded = blind(MESSAGE, &mut rand::thread_rng());
        let (status, _, body) = h.post_signed("/sign", h.pnp_body(Some(&blinded))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], WarningMessage::ApiUnavailable.as_str());
    }

    fn domain_state(counter: u64, disabled: bool) -> DomainState {
        DomainState {
            counter,
            timer: 0,
            disabled,
            now: 1,
        }
    }

    #[tokio::test]
    async fn test_domain_quota_status_reconciles() {
        let h = harness(
            |_| {
                vec![
                    fixed_domain(StatusCode::OK, DomainResponse::success("stub", None, domain_state(2, false), &[])),
                    fixed_domain(StatusCode::OK, DomainResponse::success("stub", None, domain_state(5, false), &[])),
                    fixed_domain(StatusCode::OK, DomainResponse::success("stub", None, domain_state(3, false), &[])),
                ]
            },
            |_| {},
        )
        .await;
        let body = json!({
            "type": "DomainQuotaStatusRequest",
            "domain": domain(vec![stage(0)], None),
            "options": {},
        });
        let (status, _, body) = h
            .post("/domain/quotaStatus", serde_json::to_vec(&body).unwrap(), &[])
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        // second largest of 2, 5, 3
        assert_eq!(body["status"]["counter"], 3);
        assert_eq!(body["status"]["disabled"], false);
    }

    #[tokio::test]
    async fn test_domain_quota_status_of_disabled_domain() {
        let body = json!({
            "type": "DomainQuotaStatusRequest",
            "domain": domain(vec![stage(0)], None),
            "options": {},
        });
        let refused = DomainResponse::failure(
            "stub",
            WarningMessage::DisabledDomain.into(),
            Some(domain_state(4, true)),
        );
        let reported = DomainResponse::success("stub", None, domain_state(4, true), &[]);

        for stub in [
            fixed_domain(StatusCode::FORBIDDEN, refused),
            fixed_domain(StatusCode::OK, reported),
        ] {
            let h = harness(|_| vec![stub.clone(), stub.clone(), stub], |_| {}).await;
            let (status, _, body) = h
                .post("/domain/quotaStatus", serde_json::to_vec(&body).unwrap(), &[])
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], WarningMessage::DisabledDomain.as_str());
            assert_eq!(body["status"]["disabled"], true);
        }
    }

    #[tokio::test]
    async fn test_domain_disable_threshold() {
        let (domain_key, domain_address) = generate_keypair();
        let disable_body = || {
            let mut raw = json!({
                "type": "DisableDomainRequest",
                "domain": domain(vec![stage(0)], Some(format!("{domain_address:?}"))),
                "options": {"nonce": 0},
            });
            sign_domain_request(&mut raw, &domain_key).unwrap();
            serde_json::to_vec(&raw).unwrap()
        };

        let disabled = DomainResponse::success("stub", None, domain_state(0, true), &[]);
        let enabled = DomainResponse::success("stub", None, domain_state(0, false), &[]);
        let h = harness(
            |_| {
                vec![
                    fixed_domain(StatusCode::OK, disabled.clone()),
                    fixed_domain(StatusCode::OK, disabled.clone()),
                    fixed_domain(StatusCode::OK, enabled.clone()),
                ]
            },
            |_| {},
        )
        .await;
        let (status, _, body) = h.post("/domain/disable", disable_body(), &[]).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"]["disabled"], true);
        assert_eq!(
            body["warnings"][0],
            WarningMessage::InconsistentSignerDomainDisabledStates.as_str()
        );

        let failing = DomainResponse::failure("stub", ErrorMessage::DatabaseUpdateFailure.into(), None);
        let h = harness(
            |_| {
                vec![
                    fixed_domain(StatusCode::OK, disabled.clone()),
                    fixed_domain(StatusCode::INTERNAL_SERVER_ERROR, failing.clone()),
                    fixed_domain(StatusCode::INTERNAL_SERVER_ERROR, failing.clone()),
                ]
            },
            |_| {},
        )
        .await;
        let (status, _, body) = h.post("/domain/disable", disable_body(), &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            ErrorMessage::ThresholdDisableDomainFailure.as_str()
        );
    }

    #[tokio::test]
    async fn test_status_and_metrics() {
        let h = harness(honest, |_| {}).await;
        for path in ["/status", "/metrics"] {
            let response = h
                .router
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
