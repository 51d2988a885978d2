//! Domain endpoints: `/domain/sign`, `/domain/quotaStatus` and
//! `/domain/disable`.

use super::pnp::add_share;
use super::{CombinerPolicy, RequestContext};
use crate::client::{OutgoingRequest, SignerClient};
use crate::config::ApiConfig;
use crate::service::CombinerState;
use crate::session::Session;
use crate::threshold::domain_threshold_state;
use async_trait::async_trait;
use odis_common::crypto::{decode_blinded_message, ThresholdCryptoClient, ThresholdKey};
use odis_common::domain::{verify_domain_request, DomainError};
use odis_common::http::{status_of, Reply};
use odis_common::wire::domain::{DomainRequest, DomainRequestType, DomainResponse, DomainState};
use odis_common::wire::Endpoint;
use odis_common::{ErrorMessage, ErrorType, KeyRing, OdisError};
use odis_telemetry::log_event;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainPolicy {
    pub kind: DomainRequestType,
}

impl DomainPolicy {
    pub const SIGN: Self = Self {
        kind: DomainRequestType::DomainRestrictedSignatureRequest,
    };
    pub const QUOTA_STATUS: Self = Self {
        kind: DomainRequestType::DomainQuotaStatusRequest,
    };
    pub const DISABLE: Self = Self {
        kind: DomainRequestType::DisableDomainRequest,
    };

    fn fail(&self, state: &CombinerState, error: OdisError, status: Option<DomainState>) -> Reply {
        log_event!(
            warn,
            self.endpoint().combiner_path(),
            "request failed",
            status = error.status,
            error = %error.code
        );
        Reply::new(
            status_of(&error),
            DomainResponse::failure(&state.version, error.code, status),
        )
    }

    fn default_failure(&self) -> ErrorMessage {
        match self.kind {
            DomainRequestType::DomainRestrictedSignatureRequest => {
                ErrorMessage::NotEnoughPartialSignatures
            }
            DomainRequestType::DomainQuotaStatusRequest => {
                ErrorMessage::ThresholdDomainQuotaStatusFailure
            }
            DomainRequestType::DisableDomainRequest => ErrorMessage::ThresholdDisableDomainFailure,
        }
    }

    /// Failure for a session that did not reach the threshold, with the
    /// reconciled state of every signer that reported one.
    fn threshold_failure(&self, state: &CombinerState, session: &Session<DomainResponse>) -> Reply {
        let default = self.default_failure();
        let (status, code): (u16, ErrorType) = match session.majority_failure() {
            Some((status, Some(warning))) => (status, warning.into()),
            Some((status, None)) => (status, default.into()),
            None => (500, default.into()),
        };
        let reported: Vec<DomainState> = session.bodies().filter_map(|body| body.status).collect();
        let domain_state = domain_threshold_state(&reported, session.threshold)
            .ok()
            .map(|(domain_state, _)| domain_state);
        self.fail(state, OdisError::new(code, status), domain_state)
    }

    fn session(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, DomainRequest>,
        threshold: u32,
    ) -> Session<DomainResponse> {
        Session::new(
            self.endpoint(),
            ctx.session_id.clone(),
            threshold as usize,
            self.signers(state).signers().len(),
        )
    }

    /// Quota status and disable: every signer is asked, then the reported
    /// states are reconciled.
    async fn reconcile(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, DomainRequest>,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().combiner_path();
        let Ok(threshold) = state.domain_keys.resolve(None).map(|key| key.threshold) else {
            return self.fail(state, OdisError::internal(ErrorMessage::KeyFetchError), None);
        };

        let mut session = self.session(state, ctx, threshold);
        let request = outgoing(self.endpoint(), ctx, None);
        session
            .collect(self.signers(state), &request, |_, _| false)
            .await;
        session.log_response_discrepancies();

        let reported: Vec<DomainState> = session.successes().filter_map(|body| body.status).collect();
        let (domain_state, discrepancies) = match domain_threshold_state(&reported, session.threshold)
        {
            Ok(reconciled) => reconciled,
            Err(err) => {
                log_event!(warn, path, "domain state below threshold", error = %err);
                return self.threshold_failure(state, &session);
            }
        };
        warnings.extend(discrepancies);
        session.merge_signer_warnings(&mut warnings);

        if self.kind == DomainRequestType::DisableDomainRequest && !domain_state.disabled {
            log_event!(warn, path, "domain still enabled on a threshold of signers");
            return self.threshold_failure(state, &session);
        }
        if self.kind == DomainRequestType::DomainQuotaStatusRequest && domain_state.disabled {
            return self.fail(state, OdisError::disabled_domain(), Some(domain_state));
        }

        Reply::ok(DomainResponse::success(
            &state.version,
            None,
            domain_state,
            &warnings,
        ))
    }

    async fn sign(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, DomainRequest>,
        key: Arc<ThresholdKey>,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().combiner_path();
        let blinded = ctx.request.blinded_message.as_deref().unwrap_or_default();
        let Ok(point) = decode_blinded_message(blinded) else {
            return self.fail(state, OdisError::invalid_input(), None);
        };

        let version = key.version;
        let mut crypto = ThresholdCryptoClient::new(Arc::clone(&key), point);
        let mut session = self.session(state, ctx, key.threshold);
        let request = outgoing(self.endpoint(), ctx, Some(version));
        session
            .collect(self.signers(state), &request, |signer, response| {
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
            return self.threshold_failure(state, &session);
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

        let reported: Vec<DomainState> = session.successes().filter_map(|body| body.status).collect();
        let domain_state = match domain_threshold_state(&reported, session.threshold) {
            Ok((domain_state, discrepancies)) => {
                warnings.extend(discrepancies);
                session.merge_signer_warnings(&mut warnings);
                domain_state
            }
            Err(err) => {
                log_event!(error, path, "signed without threshold domain state", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::ThresholdDomainQuotaStatusFailure),
                    None,
                );
            }
        };

        log_event!(debug, path, "combined signature", key_version = version, counter = domain_state.counter);
        Reply::ok(DomainResponse::success(
            &state.version,
            Some(signature),
            domain_state,
            &warnings,
        ))
        .with_key_version(version)
    }
}

fn outgoing<'a>(
    endpoint: Endpoint,
    ctx: &'a RequestContext<'_, DomainRequest>,
    key_version: Option<u32>,
) -> OutgoingRequest<'a> {
    OutgoingRequest {
        endpoint,
        body: ctx.body.clone(),
        authorization: ctx.authorization(),
        key_version,
    }
}

#[async_trait]
impl CombinerPolicy for DomainPolicy {
    type Request = DomainRequest;

    fn endpoint(&self) -> Endpoint {
        match self.kind {
            DomainRequestType::DomainRestrictedSignatureRequest => Endpoint::DomainSign,
            DomainRequestType::DomainQuotaStatusRequest => Endpoint::DomainQuotaStatus,
            DomainRequestType::DisableDomainRequest => Endpoint::DisableDomain,
        }
    }

    fn api_enabled(&self, api: &ApiConfig) -> bool {
        api.domains_enabled
    }

    fn is_valid(&self, request: &DomainRequest) -> bool {
        request.is_valid_for(self.kind)
    }

    fn session_id<'r>(&self, request: &'r DomainRequest) -> Option<&'r str> {
        request.session_id.as_deref()
    }

    /// Authenticity only. The nonce is the signers' to check.
    async fn authenticate(
        &self,
        _state: &CombinerState,
        ctx: &RequestContext<'_, DomainRequest>,
    ) -> Result<Vec<ErrorType>, OdisError> {
        match ctx.request.domain.validate() {
            Ok(()) => {}
            Err(DomainError::UnknownDomain { .. }) => return Err(OdisError::unknown_domain()),
            Err(DomainError::Invalid(_)) => return Err(OdisError::invalid_input()),
        }
        verify_domain_request(&ctx.raw, &ctx.request).map_err(|err| {
            log_event!(info, self.endpoint().combiner_path(), "domain request not authorised", error = %err);
            OdisError::unauthenticated()
        })?;
        Ok(Vec::new())
    }

    fn key_ring<'k>(&self, state: &'k CombinerState) -> Option<&'k KeyRing> {
        match self.kind {
            DomainRequestType::DomainRestrictedSignatureRequest => Some(&state.domain_keys),
            _ => None,
        }
    }

    fn signers<'c>(&self, state: &'c CombinerState) -> &'c SignerClient {
        &state.domain_signers
    }

    async fn combine(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, DomainRequest>,
        key: Option<Arc<ThresholdKey>>,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        match (self.kind, key) {
            (DomainRequestType::DomainRestrictedSignatureRequest, Some(key)) => {
                self.sign(state, ctx, key, warnings).await
            }
            (DomainRequestType::DomainRestrictedSignatureRequest, None) => {
                self.fail(state, OdisError::invalid_key_version(), None)
            }
            _ => self.reconcile(state, ctx, warnings).await,
        }
    }

    fn failure(&self, version: &str, error: &OdisError) -> Value {
        serde_json::to_value(DomainResponse::failure(version, error.code, None))
            .unwrap_or(Value::Null)
    }
}
