//! # Authenticator
//!
//! Confirms a PNP request was signed by the account it claims. The
//! `Authorization` header holds either a DER signature by the account's
//! registered data encryption key or a recoverable signature by the
//! account's wallet key.

use crate::chain::ChainState;
use crate::ecdsa::{parse_public_key, personal_message_hash, recover_address, sha256, verify_der_prehash};
use crate::errors::{ErrorMessage, ErrorType, WarningMessage};
use crate::wire::pnp::{AuthenticationMethod, PnpRequest};
use tracing::{debug, error, info, warn};

/// Result of authenticating a request. Never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    pub authenticated: bool,
    /// Echoed in the response `warnings`
    pub warnings: Vec<ErrorType>,
}

impl AuthOutcome {
    fn rejected(warnings: Vec<ErrorType>) -> Self {
        Self {
            authenticated: false,
            warnings,
        }
    }
}

/// Digest the legacy DEK path accepted: the body truncated or left-padded to
/// 32 bytes.
fn legacy_dek_digest(body: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    if body.len() >= 32 {
        digest.copy_from_slice(&body[..32]);
    } else {
        digest[32 - body.len()..].copy_from_slice(body);
    }
    digest
}

/// Verifies a DEK signature over the body. Returns the legacy warning when
/// only the truncated-body form matches.
pub fn verify_dek_signature(
    body: &[u8],
    signature: &str,
    dek: &str,
) -> Option<Vec<ErrorType>> {
    let Ok(key) = parse_public_key(dek) else {
        error!(dek, "registered DEK is not a valid public key");
        return None;
    };
    if verify_der_prehash(&key, &sha256(body), signature) {
        return Some(Vec::new());
    }
    if verify_der_prehash(&key, &legacy_dek_digest(body), signature) {
        warn!(warning = %WarningMessage::InvalidAuthSignature, "accepted legacy DEK signature");
        return Some(vec![WarningMessage::InvalidAuthSignature.into()]);
    }
    None
}

/// Verifies a wallet-key signature over the body.
pub fn verify_wallet_signature(body: &[u8], signature: &str, account: &str) -> bool {
    let Some(expected) = crate::wire::parse_address(account) else {
        return false;
    };
    match recover_address(&personal_message_hash(body), signature) {
        Ok(recovered) => recovered == expected,
        Err(err) => {
            debug!(error = %err, "wallet signature did not recover");
            false
        }
    }
}

/// Authenticates `request`, whose exact bytes are `body`.
///
/// With `encryption_key` the registered DEK is tried first. A failed DEK
/// lookup resolves to `should_fail_open`. Otherwise the wallet key is the
/// fallback.
pub async fn authenticate_user(
    chain: &dyn ChainState,
    body: &[u8],
    authorization: Option<&str>,
    request: &PnpRequest,
    should_fail_open: bool,
) -> AuthOutcome {
    let signature = match authorization.map(str::trim) {
        Some(sig) if !sig.is_empty() => sig,
        _ => return AuthOutcome::rejected(Vec::new()),
    };
    let Some(account) = request.account_address() else {
        return AuthOutcome::rejected(Vec::new());
    };

    if request.authentication_method == Some(AuthenticationMethod::EncryptionKey) {
        match chain.get_data_encryption_key(account).await {
            Err(err) => {
                let failure = if should_fail_open {
                    ErrorMessage::FailingOpen
                } else {
                    ErrorMessage::FailingClosed
                };
                error!(
                    error = %err,
                    warning = %ErrorMessage::FailureToGetDek,
                    failure_status = %failure,
                    "DEK lookup failed"
                );
                return AuthOutcome {
                    authenticated: should_fail_open,
                    warnings: vec![ErrorMessage::FailureToGetDek.into(), failure.into()],
                };
            }
            Ok(Some(dek)) if !dek.trim_start_matches("0x").is_empty() => {
                info!(account = %request.account, "found DEK for account");
                if let Some(warnings) = verify_dek_signature(body, signature, &dek) {
                    return AuthOutcome {
                        authenticated: true,
                        warnings,
                    };
                }
            }
            Ok(_) => {
                warn!(account = %request.account, "account has no registered DEK");
            }
        }
    }

    debug!(account = %request.account, "authenticating with wallet key");
    AuthOutcome {
        authenticated: verify_wallet_signature(body, signature, &request.account),
        warnings: Vec::new(),
    }
}
