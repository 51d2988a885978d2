//! PNP endpoints: `/sign`, `/quotaStatus`, `/getBlindedMessageSig` and
//! `/getQuota`.

use super::{CombinerPolicy, RequestContext};
use crate::client::{OutgoingRequest, SignerClient};
use crate::config::ApiConfig;
use crate::service::CombinerState;
use crate::session::Session;
use crate::threshold::pnp_threshold_state;
use async_trait::async_trait;
use odis_common::crypto::{decode_blinded_message, ThresholdCryptoClient, ThresholdKey};
use odis_common::http::{status_of, Reply};
use odis_common::wire::pnp::{PnpQuotaStatus, PnpRequest, PnpResponse};
use odis_common::wire::Endpoint;
use odis_common::{authenticate_user, ErrorMessage, ErrorType, KeyRing, OdisError};
use odis_telemetry::{log_event, SIGNATURE_SHARES_REJECTED};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpKind {
    Sign,
    Quota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnpPolicy {
    pub legacy: bool,
    pub kind: PnpKind,
}

impl PnpPolicy {
    pub const SIGN: Self = Self {
        legacy: false,
        kind: PnpKind::Sign,
    };
    pub const QUOTA: Self = Self {
        legacy: false,
        kind: PnpKind::Quota,
    };
    pub const LEGACY_SIGN: Self = Self {
        legacy: true,
        kind: PnpKind::Sign,
    };
    pub const LEGACY_QUOTA: Self = Self {
        legacy: true,
        kind: PnpKind::Quota,
    };

    fn fail(&self, state: &CombinerState, error: OdisError, quota: Option<PnpQuotaStatus>) -> Reply {
        log_event!(
            warn,
            self.endpoint().combiner_path(),
            "request failed",
            status = error.status,
            error = %error.code
        );
        Reply::new(
            status_of(&error),
            PnpResponse::failure(&state.version, error.code, quota),
        )
    }

    /// Failure for a session that did not reach the threshold.
    ///
    /// A unanimous client-caused warning (such as an exhausted quota) is
    /// passed through, otherwise `default` is reported.
    fn threshold_failure(
        &self,
        state: &CombinerState,
        session: &Session<PnpResponse>,
        default: ErrorMessage,
    ) -> Reply {
        let (status, code): (u16, ErrorType) = match session.majority_failure() {
            Some((status, Some(warning))) => (status, warning.into()),
            Some((status, None)) => (status, default.into()),
            None => (500, default.into()),
        };
        let quotas: Vec<PnpQuotaStatus> =
            session.bodies().filter_map(PnpResponse::quota_status).collect();
        let quota = pnp_threshold_state(&quotas, session.threshold, &state.config.discrepancy)
            .ok()
            .map(|threshold| threshold.quota);
        self.fail(state, OdisError::new(code, status), quota)
    }

    async fn quota(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, PnpRequest>,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().combiner_path();
        let client = self.signers(state);
        let threshold = state.pnp_keys.resolve(None).map(|key| key.threshold);
        let Ok(threshold) = threshold else {
            return self.fail(state, OdisError::internal(ErrorMessage::KeyFetchError), None);
        };

        let mut session: Session<PnpResponse> = Session::new(
            self.endpoint(),
            ctx.session_id.clone(),
            threshold as usize,
            client.signers().len(),
        );
        let request = outgoing(self.endpoint(), ctx, None);
        session.collect(client, &request, |_, _| false).await;
        session.log_response_discrepancies();

        let quotas: Vec<PnpQuotaStatus> =
            session.successes().filter_map(PnpResponse::quota_status).collect();
        let reconciled = match pnp_threshold_state(&quotas, session.threshold, &state.config.discrepancy)
        {
            Ok(reconciled) => reconciled,
            Err(err) => {
                log_event!(warn, path, "quota below threshold", error = %err);
                return self.threshold_failure(
                    state,
                    &session,
                    ErrorMessage::ThresholdPnpQuotaStatusFailure,
                );
            }
        };
        if reconciled.total_quota_exceeds(&state.config.discrepancy) {
            log_event!(
                error,
                path,
                "total quota discrepancy too large",
                spread = reconciled.total_quota_spread
            );
            return self.fail(
                state,
                OdisError::internal(ErrorMessage::ThresholdPnpQuotaStatusFailure),
                None,
            );
        }

        warnings.extend(reconciled.warnings);
        session.merge_signer_warnings(&mut warnings);
        Reply::ok(PnpResponse::success(
            &state.version,
            None,
            reconciled.quota,
            &warnings,
        ))
    }

    async fn sign(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, PnpRequest>,
        key: Arc<ThresholdKey>,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().combiner_path();
        let client = self.signers(state);
        let blinded = ctx.request.blinded_query_phone_number.as_deref().unwrap_or_default();
        let Ok(point) = decode_blinded_message(blinded) else {
            return self.fail(state, OdisError::invalid_input(), None);
        };

        let version = key.version;
        let mut crypto = ThresholdCryptoClient::new(Arc::clone(&key), point);
        let mut session: Session<PnpResponse> = Session::new(
            self.endpoint(),
            ctx.session_id.clone(),
            key.threshold as usize,
            client.signers().len(),
        );
        let request = outgoing(self.endpoint(), ctx, Some(version));
        session
            .collect(client, &request, |signer, response| {
                add_share(&mut crypto, path, signer, response.signature.as_deref());
                crypto.has_sufficient_shares()
            })
            .await;
        session.log_response_discrepancies();

        if !crypto.has_sufficient_shares() {
            log_event!(
                warn,
                path,
                "not enough partial signatures",
                shares = crypto.share_count(),
                threshold = crypto.threshold()
            );
            return self.threshold_failure(
                state,
                &session,
                ErrorMessage::NotEnoughPartialSignatures,
            );
        }

        let signature = match crypto.combine_hex() {
            Ok(signature) => signature,
            Err(err) => {
                log_event!(error, path, "failed to combine shares", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::SignatureAggregationFailure),
                    None,
                );
            }
        };

        let quotas: Vec<PnpQuotaStatus> =
            session.successes().filter_map(PnpResponse::quota_status).collect();
        let quota = match pnp_threshold_state(&quotas, session.threshold, &state.config.discrepancy)
        {
            Ok(reconciled) => {
                warnings.extend(reconciled.warnings);
                session.merge_signer_warnings(&mut warnings);
                reconciled.quota
            }
            Err(err) => {
                log_event!(error, path, "signed without threshold quota", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::ThresholdPnpQuotaStatusFailure),
                    None,
                );
            }
        };

        log_event!(
            debug,
            path,
            "combined signature",
            key_version = version,
            performed_query_count = quota.performed_query_count
        );
        Reply::ok(PnpResponse::success(
            &state.version,
            Some(signature),
            quota,
            &warnings,
        ))
        .with_key_version(version)
    }
}

fn outgoing<'a>(
    endpoint: Endpoint,
    ctx: &'a RequestContext<'_, impl Sized>,
    key_version: Option<u32>,
) -> OutgoingRequest<'a> {
    OutgoingRequest {
        endpoint,
        body: ctx.body.clone(),
        authorization: ctx.authorization(),
        key_version,
    }
}

/// Verifies and stores one signer's share. Bad shares are counted and
/// skipped.
pub(crate) fn add_share(
    crypto: &mut ThresholdCryptoClient,
    path: &str,
    signer: &str,
    share: Option<&str>,
) {
    let Some(share) = share else {
        log_event!(warn, path, "successful response without signature", signer);
        return;
    };
    if let Err(err) = crypto.add_encoded_share(share) {
        SIGNATURE_SHARES_REJECTED.inc();
        log_event!(
            warn,
            path,
            "rejected partial signature",
            signer,
            error = %err,
            code = %ErrorMessage::VerifyPartialSignatureError
        );
    }
}

#[async_trait]
impl CombinerPolicy for PnpPolicy {
    type Request = PnpRequest;

    fn endpoint(&self) -> Endpoint {
        match (self.legacy, self.kind) {
            (false, PnpKind::Sign) => Endpoint::PnpSign,
            (false, PnpKind::Quota) => Endpoint::PnpQuota,
            (true, PnpKind::Sign) => Endpoint::LegacyPnpSign,
            (true, PnpKind::Quota) => Endpoint::LegacyPnpQuota,
        }
    }

    fn api_enabled(&self, api: &ApiConfig) -> bool {
        if self.legacy {
            api.legacy_pnp_enabled
        } else {
            api.pnp_enabled
        }
    }

    fn is_valid(&self, request: &PnpRequest) -> bool {
        request.is_valid(self.kind == PnpKind::Sign)
    }

    fn session_id<'r>(&self, request: &'r PnpRequest) -> Option<&'r str> {
        request.session_id.as_deref()
    }

    async fn authenticate(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, PnpRequest>,
    ) -> Result<Vec<ErrorType>, OdisError> {
        let outcome = authenticate_user(
            state.chain.as_ref(),
            &ctx.body,
            ctx.authorization(),
            &ctx.request,
            state.config.api.should_fail_open,
        )
        .await;
        if outcome.authenticated {
            Ok(outcome.warnings)
        } else {
            Err(OdisError::unauthenticated())
        }
    }

    fn key_ring<'k>(&self, state: &'k CombinerState) -> Option<&'k KeyRing> {
        match self.kind {
            PnpKind::Sign => Some(&state.pnp_keys),
            PnpKind::Quota => None,
        }
    }

    fn signers<'c>(&self, state: &'c CombinerState) -> &'c SignerClient {
        &state.pnp_signers
    }

    async fn combine(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, PnpRequest>,
        key: Option<Arc<ThresholdKey>>,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        match (self.kind, key) {
            (PnpKind::Quota, _) => self.quota(state, ctx, warnings).await,
            (PnpKind::Sign, Some(key)) => self.sign(state, ctx, key, warnings).await,
            (PnpKind::Sign, None) => self.fail(state, OdisError::invalid_key_version(), None),
        }
    }

    fn failure(&self, version: &str, error: &OdisError) -> Value {
        serde_json::to_value(PnpResponse::failure(version, error.code, None)).unwrap_or(Value::Null)
    }
}
