//! Domain endpoints: `/domain/sign`, `/domain/quotaStatus` and
//! `/domain/disable`.

use super::{status_of, EndpointPolicy, Reply, RequestContext, ResolvedKey};
use crate::config::ApiConfig;
use crate::keystore::{KeySet, KeyStore};
use crate::limiter::{self, LimiterError, LimiterState};
use crate::service::SignerState;
use crate::store::{DomainRequestRecord, DomainStateRecord};
use async_trait::async_trait;
use odis_common::crypto::decode_blinded_message;
use odis_common::domain::{verify_domain_request, DomainError};
use odis_common::wire::domain::{DomainRequest, DomainRequestType, DomainResponse, DomainState};
use odis_common::wire::Endpoint;
use odis_common::{unix_now, ErrorMessage, ErrorType, OdisError, WarningMessage};
use odis_telemetry::log_event;
use serde_json::Value;

/// Signing attempts before a contended domain gives up.
const MAX_SIGN_ATTEMPTS: usize = 3;

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

    fn fail(&self, state: &SignerState, error: OdisError, status: Option<DomainState>) -> Reply {
        log_event!(
            warn,
            self.endpoint().signer_path(),
            "request failed",
            status = error.status,
            error = %error.code
        );
        Reply::new(
            status_of(&error),
            DomainResponse::failure(&state.version, error.code, status),
        )
    }

    async fn quota_status(
        &self,
        state: &SignerState,
        request: &DomainRequest,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        let record = match state.store.domain_state(&request.domain.hash()).await {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => {
                log_event!(error, self.endpoint().signer_path(), "domain state read failed", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::DatabaseGetFailure),
                    None,
                );
            }
        };
        let now = unix_now();
        if record.disabled {
            return self.fail(
                state,
                OdisError::disabled_domain(),
                Some(client_state(&record, now)),
            );
        }
        // checked but not consumed
        if !nonce_is_fresh(request, &record) {
            return self.fail(state, OdisError::invalid_nonce(), None);
        }
        Reply::ok(DomainResponse::success(
            &state.version,
            None,
            client_state(&record, now),
            &warnings,
        ))
    }

    async fn sign(
        &self,
        state: &SignerState,
        request: &DomainRequest,
        key: ResolvedKey,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().signer_path();
        let Some(blinded_message) = request.blinded_message.as_deref() else {
            return self.fail(state, OdisError::invalid_input(), None);
        };
        let Ok(blinded_point) = decode_blinded_message(blinded_message) else {
            return self.fail(state, OdisError::invalid_input(), None);
        };
        let domain_hash = request.domain.hash();

        for attempt in 1..=MAX_SIGN_ATTEMPTS {
            let stored = match state.store.domain_state(&domain_hash).await {
                Ok(stored) => stored,
                Err(err) => {
                    log_event!(error, path, "domain state read failed", error = %err);
                    return self.fail(
                        state,
                        OdisError::internal(ErrorMessage::FailureToStoreRequest),
                        None,
                    );
                }
            };
            let record = stored.unwrap_or_default();
            let now = unix_now();

            if record.disabled {
                return self.fail(
                    state,
                    OdisError::disabled_domain(),
                    Some(client_state(&record, now)),
                );
            }
            if !nonce_is_fresh(request, &record) {
                return self.fail(state, OdisError::invalid_nonce(), None);
            }

            let current = LimiterState {
                counter: record.counter,
                timer: record.timer,
                disabled: record.disabled,
            };
            let next = match limiter::check(&request.domain.stages, &current, now) {
                Ok(next) => next,
                Err(LimiterError::Disabled) => {
                    return self.fail(
                        state,
                        OdisError::disabled_domain(),
                        Some(client_state(&record, now)),
                    )
                }
                Err(rejection) => {
                    log_event!(info, path, "domain rate limited", domain = %domain_hash, reason = %rejection);
                    return self.fail(
                        state,
                        OdisError::new(WarningMessage::ExceededQuota, 429),
                        Some(client_state(&record, now)),
                    );
                }
            };

            let signature = key.share.partial_sign(&blinded_point).to_hex();
            let updated = DomainStateRecord {
                counter: next.counter,
                timer: next.timer,
                disabled: false,
                last_nonce: request.options.nonce.or(record.last_nonce),
            };
            let audit = DomainRequestRecord {
                domain_hash: domain_hash.clone(),
                timestamp: now,
                blinded_message: blinded_message.to_string(),
            };

            match state
                .store
                .compare_and_swap_domain_state(&domain_hash, stored.as_ref(), &updated, Some(&audit))
                .await
            {
                Ok(true) => {
                    log_event!(debug, path, "signed", domain = %domain_hash, counter = updated.counter, key_version = key.version);
                    return Reply::ok(DomainResponse::success(
                        &state.version,
                        Some(signature),
                        client_state(&updated, now),
                        &warnings,
                    ))
                    .with_key_version(key.version);
                }
                Ok(false) => {
                    log_event!(debug, path, "domain state changed concurrently, retrying", domain = %domain_hash, attempt);
                }
                Err(err) => {
                    log_event!(error, path, "failed to store domain request", error = %err);
                    return self.fail(
                        state,
                        OdisError::internal(ErrorMessage::FailureToStoreRequest),
                        None,
                    );
                }
            }
        }

        log_event!(error, path, "domain state contended, giving up", domain = %domain_hash);
        self.fail(
            state,
            OdisError::internal(ErrorMessage::FailureToStoreRequest),
            None,
        )
    }

    async fn disable(
        &self,
        state: &SignerState,
        request: &DomainRequest,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        let domain_hash = request.domain.hash();
        match state.store.disable_domain(&domain_hash).await {
            Ok(record) => {
                log_event!(info, self.endpoint().signer_path(), "domain disabled", domain = %domain_hash);
                Reply::ok(DomainResponse::success(
                    &state.version,
                    None,
                    client_state(&record, unix_now()),
                    &warnings,
                ))
            }
            Err(err) => {
                log_event!(error, self.endpoint().signer_path(), "failed to disable domain", error = %err);
                self.fail(
                    state,
                    OdisError::internal(ErrorMessage::DatabaseUpdateFailure),
                    None,
                )
            }
        }
    }
}

fn client_state(record: &DomainStateRecord, now: u64) -> DomainState {
    DomainState {
        counter: record.counter,
        timer: record.timer,
        disabled: record.disabled,
        now,
    }
}

/// Keyed domains need a nonce above the last accepted one. The first
/// request may use any nonce.
fn nonce_is_fresh(request: &DomainRequest, record: &DomainStateRecord) -> bool {
    if request.domain.public_key.is_none() {
        return true;
    }
    match (request.options.nonce, record.last_nonce) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(nonce), Some(last)) => nonce > last,
    }
}

#[async_trait]
impl EndpointPolicy for DomainPolicy {
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

    async fn authenticate(
        &self,
        _state: &SignerState,
        ctx: &RequestContext<'_, DomainRequest>,
    ) -> Result<Vec<ErrorType>, OdisError> {
        match ctx.request.domain.validate() {
            Ok(()) => {}
            Err(DomainError::UnknownDomain { .. }) => return Err(OdisError::unknown_domain()),
            Err(DomainError::Invalid(_)) => return Err(OdisError::invalid_input()),
        }
        verify_domain_request(&ctx.raw, &ctx.request).map_err(|err| {
            log_event!(info, self.endpoint().signer_path(), "domain request not authorised", error = %err);
            OdisError::unauthenticated()
        })?;
        Ok(Vec::new())
    }

    fn key_set<'k>(&self, keys: &'k KeyStore) -> Option<&'k KeySet> {
        match self.kind {
            DomainRequestType::DomainRestrictedSignatureRequest => Some(&keys.domains),
            _ => None,
        }
    }

    async fn execute(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, DomainRequest>,
        key: Option<ResolvedKey>,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        match (self.kind, key) {
            (DomainRequestType::DomainQuotaStatusRequest, _) => {
                self.quota_status(state, &ctx.request, warnings).await
            }
            (DomainRequestType::DisableDomainRequest, _) => {
                self.disable(state, &ctx.request, warnings).await
            }
            (DomainRequestType::DomainRestrictedSignatureRequest, Some(key)) => {
                self.sign(state, &ctx.request, key, warnings).await
            }
            (DomainRequestType::DomainRestrictedSignatureRequest, None) => {
                self.fail(state, OdisError::invalid_key_version(), None)
            }
        }
    }

    fn failure(&self, version: &str, error: &OdisError) -> Value {
        serde_json::to_value(DomainResponse::failure(version, error.code, None))
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odis_common::domain::test_helpers::{domain, stage};
    use odis_common::wire::domain::DomainOptions;

    fn request(public_key: Option<String>, nonce: Option<u64>) -> DomainRequest {
        DomainRequest {
            kind: DomainRequestType::DomainQuotaStatusRequest,
            domain: domain(vec![stage(0)], public_key),
            options: DomainOptions {
                signature: None,
                nonce,
            },
            blinded_message: None,
            session_id: None,
        }
    }

    #[test]
    fn test_nonce_rules() {
        let key = Some(format!("0x{}", "11".repeat(20)));
        let fresh = DomainStateRecord::default();
        let used = DomainStateRecord {
            last_nonce: Some(4),
            ..DomainStateRecord::default()
        };

        assert!(nonce_is_fresh(&request(key.clone(), Some(0)), &fresh));
        assert!(nonce_is_fresh(&request(key.clone(), Some(5)), &used));
        assert!(!nonce_is_fresh(&request(key.clone(), Some(4)), &used));
        assert!(!nonce_is_fresh(&request(key.clone(), None), &fresh));
        // unkeyed domains carry no nonce
        assert!(nonce_is_fresh(&request(None, None), &used));
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(DomainPolicy::SIGN.endpoint(), Endpoint::DomainSign);
        assert_eq!(DomainPolicy::DISABLE.endpoint().signer_path(), "/domain/disable");
    }
}
