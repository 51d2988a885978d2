//! PNP endpoints: `/sign`, `/quotaStatus` and their legacy counterparts.
//!
//! Legacy routes are the same policy over the [`QuotaScope::LegacyPnp`]
//! counters and quota rule.

use super::{status_of, EndpointPolicy, Reply, RequestContext, ResolvedKey};
use crate::config::ApiConfig;
use crate::keystore::{KeySet, KeyStore};
use crate::quota::QuotaError;
use crate::service::SignerState;
use crate::store::{QuotaScope, RecordOutcome};
use async_trait::async_trait;
use odis_common::crypto::decode_blinded_message;
use odis_common::wire::pnp::{PnpQuotaStatus, PnpRequest, PnpResponse};
use odis_common::wire::{parse_hash, Address, Endpoint, Hash};
use odis_common::{authenticate_user, ErrorMessage, ErrorType, OdisError, WarningMessage};
use odis_telemetry::log_event;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpKind {
    Sign,
    Quota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnpPolicy {
    pub scope: QuotaScope,
    pub kind: PnpKind,
}

impl PnpPolicy {
    pub const SIGN: Self = Self {
        scope: QuotaScope::Pnp,
        kind: PnpKind::Sign,
    };
    pub const QUOTA: Self = Self {
        scope: QuotaScope::Pnp,
        kind: PnpKind::Quota,
    };
    pub const LEGACY_SIGN: Self = Self {
        scope: QuotaScope::LegacyPnp,
        kind: PnpKind::Sign,
    };
    pub const LEGACY_QUOTA: Self = Self {
        scope: QuotaScope::LegacyPnp,
        kind: PnpKind::Quota,
    };

    fn fail(&self, state: &SignerState, error: OdisError, quota: Option<PnpQuotaStatus>) -> Reply {
        log_event!(
            warn,
            self.endpoint().signer_path(),
            "request failed",
            status = error.status,
            error = %error.code
        );
        Reply::new(
            status_of(&error),
            PnpResponse::failure(&state.version, error.code, quota),
        )
    }

    async fn quota_status(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, PnpRequest>,
        account: Address,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let performed_query_count = match state
            .quota
            .performed_query_count(self.scope, &account)
            .await
        {
            Ok(count) => count,
            Err(_) => {
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::FailureToGetPerformedQueryCount),
                    None,
                )
            }
        };
        let total_quota = match state
            .quota
            .total_quota(self.scope, &account, identifier(&ctx.request))
            .await
        {
            Ok(total) => total,
            Err(_) => {
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::FailureToGetTotalQuota),
                    None,
                )
            }
        };
        let block_number = block_number(state, &mut warnings).await;

        Reply::ok(PnpResponse::success(
            &state.version,
            None,
            PnpQuotaStatus {
                performed_query_count,
                total_quota,
                block_number,
            },
            &warnings,
        ))
    }

    async fn sign(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, PnpRequest>,
        account: Address,
        key: ResolvedKey,
        mut warnings: Vec<ErrorType>,
    ) -> Reply {
        let path = self.endpoint().signer_path();
        let Some(blinded_query) = ctx.request.blinded_query_phone_number.as_deref() else {
            return self.fail(state, OdisError::invalid_input(), None);
        };
        let Ok(blinded_point) = decode_blinded_message(blinded_query) else {
            return self.fail(state, OdisError::invalid_input(), None);
        };

        let duplicate = match state
            .quota
            .is_duplicate(self.scope, &account, blinded_query)
            .await
        {
            Ok(duplicate) => duplicate,
            // recording detects replays atomically anyway
            Err(err) => {
                log_event!(error, path, "replay lookup failed", error = %err);
                false
            }
        };

        let performed_query_count = match state
            .quota
            .performed_query_count(self.scope, &account)
            .await
        {
            Ok(count) => count,
            Err(_) => {
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::FailureToGetPerformedQueryCount),
                    None,
                )
            }
        };

        let total_quota = match state
            .quota
            .total_quota(self.scope, &account, identifier(&ctx.request))
            .await
        {
            Ok(total) => total,
            Err(QuotaError::ExternalLookupFailure(err)) if state.config.api.should_fail_open => {
                log_event!(
                    error,
                    path,
                    "total quota lookup failed, failing open",
                    error = %err,
                    warning = %ErrorMessage::FailingOpen
                );
                warnings.push(ErrorMessage::FailureToGetTotalQuota.into());
                warnings.push(ErrorMessage::FailingOpen.into());
                performed_query_count + 1
            }
            Err(err) => {
                log_event!(error, path, "total quota lookup failed", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::FailingClosed),
                    None,
                );
            }
        };
        let block_number = block_number(state, &mut warnings).await;

        let mut quota = PnpQuotaStatus {
            performed_query_count,
            total_quota,
            block_number,
        };
        if !duplicate && performed_query_count >= total_quota {
            log_event!(
                info,
                path,
                "quota exceeded",
                account = %ctx.request.account,
                performed_query_count,
                total_quota
            );
            return self.fail(
                state,
                OdisError::new(WarningMessage::ExceededQuota, 403),
                Some(quota),
            );
        }

        let signature = key.share.partial_sign(&blinded_point).to_hex();

        match state
            .quota
            .record_signature(self.scope, &account, blinded_query)
            .await
        {
            Ok(RecordOutcome::Recorded {
                performed_query_count,
            }) => quota.performed_query_count = performed_query_count,
            Ok(RecordOutcome::Duplicate {
                performed_query_count,
            }) => {
                log_event!(info, path, "re-serving duplicate request", account = %ctx.request.account);
                warnings.push(WarningMessage::DuplicateRequestToGetPartialSig.into());
                quota.performed_query_count = performed_query_count;
            }
            Err(err) => {
                log_event!(error, path, "failed to persist signature", error = %err);
                return self.fail(
                    state,
                    OdisError::internal(ErrorMessage::FailureToIncrementQueryCount),
                    None,
                );
            }
        }

        log_event!(
            debug,
            path,
            "signed",
            account = %ctx.request.account,
            key_version = key.version,
            performed_query_count = quota.performed_query_count
        );
        Reply::ok(PnpResponse::success(
            &state.version,
            Some(signature),
            quota,
            &warnings,
        ))
        .with_key_version(key.version)
    }
}

fn identifier(request: &PnpRequest) -> Option<Hash> {
    request.hashed_phone_number.as_deref().and_then(parse_hash)
}

/// Head block, or `None` with a warning. Never fatal.
async fn block_number(state: &SignerState, warnings: &mut Vec<ErrorType>) -> Option<u64> {
    match state.quota.block_number().await {
        Ok(block) => Some(block),
        Err(err) => {
            tracing::warn!(error = %err, warning = %ErrorMessage::FailureToGetBlockNumber, "block number lookup failed");
            warnings.push(ErrorMessage::FailureToGetBlockNumber.into());
            None
        }
    }
}

#[async_trait]
impl EndpointPolicy for PnpPolicy {
    type Request = PnpRequest;

    fn endpoint(&self) -> Endpoint {
        match (self.scope, self.kind) {
            (QuotaScope::Pnp, PnpKind::Sign) => Endpoint::PnpSign,
            (QuotaScope::Pnp, PnpKind::Quota) => Endpoint::PnpQuota,
            (QuotaScope::LegacyPnp, PnpKind::Sign) => Endpoint::LegacyPnpSign,
            (QuotaScope::LegacyPnp, PnpKind::Quota) => Endpoint::LegacyPnpQuota,
        }
    }

    fn api_enabled(&self, api: &ApiConfig) -> bool {
        match self.scope {
            QuotaScope::Pnp => api.pnp_enabled,
            QuotaScope::LegacyPnp => api.legacy_pnp_enabled,
        }
    }

    fn is_valid(&self, request: &PnpRequest) -> bool {
        request.is_valid(self.kind == PnpKind::Sign)
    }

    async fn authenticate(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, PnpRequest>,
    ) -> Result<Vec<ErrorType>, OdisError> {
        let outcome = authenticate_user(
            state.chain.as_ref(),
            ctx.body,
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

    fn key_set<'k>(&self, keys: &'k KeyStore) -> Option<&'k KeySet> {
        match self.kind {
            PnpKind::Sign => Some(&keys.pnp),
            PnpKind::Quota => None,
        }
    }

    async fn execute(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, PnpRequest>,
        key: Option<ResolvedKey>,
        warnings: Vec<ErrorType>,
    ) -> Reply {
        let Some(account) = ctx.request.account_address() else {
            return self.fail(state, OdisError::invalid_input(), None);
        };
        match (self.kind, key) {
            (PnpKind::Quota, _) => self.quota_status(state, ctx, account, warnings).await,
            (PnpKind::Sign, Some(key)) => self.sign(state, ctx, account, key, warnings).await,
            (PnpKind::Sign, None) => self.fail(state, OdisError::invalid_key_version(), None),
        }
    }

    fn failure(&self, version: &str, error: &OdisError) -> Value {
        serde_json::to_value(PnpResponse::failure(version, error.code, None)).unwrap_or(Value::Null)
    }
}
