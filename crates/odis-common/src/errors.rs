//! # ODIS Error Taxonomy
//!
//! Every failure and warning a service can report carries one of the codes
//! below verbatim in the wire `error` or `warnings` fields.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! message_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Full wire text, code prefix included.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Looks up a variant by wire text.
            pub fn parse(text: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|m| m.as_str() == text)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

message_enum!(
    /// Failure codes.
    ErrorMessage {
        UnknownError => "CELO_ODIS_ERR_00 Something went wrong",
        DatabaseUpdateFailure => "CELO_ODIS_ERR_01 DB_ERR Failed to update database entry",
        DatabaseInsertFailure => "CELO_ODIS_ERR_02 DB_ERR Failed to insert database entry",
        DatabaseGetFailure => "CELO_ODIS_ERR_03 DB_ERR Failed to get database entry",
        KeyFetchError => "CELO_ODIS_ERR_04 INIT_ERR Failed to retrieve key from keystore",
        SignatureComputationFailure => "CELO_ODIS_ERR_05 SIG_ERR Failed to compute BLS signature",
        VerifyPartialSignatureError => "CELO_ODIS_ERR_06 SIG_ERR BLS partial signature verification Failure",
        NotEnoughPartialSignatures => "CELO_ODIS_ERR_07 SIG_ERR Not enough partial signatures",
        InconsistentSignerResponses => "CELO_ODIS_ERR_08 SIG_ERR Inconsistent responses from signers",
        SignerRequestError => "CELO_ODIS_ERR_09 SIG_ERR Failure in signer request",
        TimeoutFromSigner => "CELO_ODIS_ERR_10 SIG_ERR Timeout from signer",
        FullNodeError => "CELO_ODIS_ERR_11 NODE_ERR Failed to read on-chain state",
        FailureToStoreRequest => "CELO_ODIS_ERR_12 DB_ERR Failed to store partial sig request",
        FailureToIncrementQueryCount => "CELO_ODIS_ERR_13 DB_ERR Failed to increment user query count",
        DomainAlreadyDisabledFailure => "CELO_ODIS_ERR_14 DB_ERR Domain is already disabled",
        UnsupportedDomain => "CELO_ODIS_ERR_15 DOMAIN Domain type is not supported",
        SignerDisableDomainFailure => "CELO_ODIS_ERR_16 DOMAIN Failed to disable domain on a signer",
        ThresholdDisableDomainFailure => "CELO_ODIS_ERR_17 DOMAIN Failed to disable domain on a threshold of signers",
        SignerDomainQuotaStatusFailure => "CELO_ODIS_ERR_18 DOMAIN Failed to get domain status from signer",
        ThresholdDomainQuotaStatusFailure => "CELO_ODIS_ERR_19 DOMAIN Failed to get domain quota status from a threshold of signers",
        InvalidKeyVersionResponse => "CELO_ODIS_ERR_20 SIG_ERR Signer response key version header is invalid",
        InvalidSignerResponse => "CELO_ODIS_ERR_21 SIG_ERR Signer response body is invalid",
        SignerResponseFailedWithOkStatus => "CELO_ODIS_ERR_22 SIG_ERR Signer response failed with 200 status",
        ThresholdPnpQuotaStatusFailure => "CELO_ODIS_ERR_23 SIG_ERR Failed to get PNP quota status from a threshold of signers",
        FailureToGetPerformedQueryCount => "CELO_ODIS_ERR_24 DB_ERR Failed to read performedQueryCount from signer db",
        FailureToGetTotalQuota => "CELO_ODIS_ERR_25 NODE_ERR Failed to read on-chain state to calculate total quota",
        FailureToGetBlockNumber => "CELO_ODIS_ERR_26 NODE_ERR Failed to read block number from full node",
        FailureToGetDek => "CELO_ODIS_ERR_26 NODE_ERR Failed to read user's DEK from full-node",
        FailingOpen => "CELO_ODIS_ERR_27 NODE_ERR Failing open on full-node error",
        FailingClosed => "CELO_ODIS_ERR_28 NODE_ERR Failing closed on full-node error",
        CaughtErrorInEndpointHandler => "CELO_ODIS_ERR_29 Caught error in outer endpoint handler",
        ErrorAfterResponseSent => "CELO_ODIS_ERR_30 Error in endpoint thrown after response was already sent",
        SignatureAggregationFailure => "CELO_ODIS_ERR_31 SIG_ERR Failed to blind aggregate signature shares",
    }
);

message_enum!(
    /// Warning codes. Also used as the `error` of client-caused failures.
    WarningMessage {
        InvalidInput => "CELO_ODIS_WARN_01 BAD_INPUT Invalid input parameters",
        UnauthenticatedUser => "CELO_ODIS_WARN_02 BAD_INPUT Missing or invalid authentication",
        ExceededQuota => "CELO_ODIS_WARN_03 QUOTA Requester exceeded service query quota",
        DuplicateRequestToGetPartialSig => "CELO_ODIS_WARN_06 BAD_INPUT Attempt to replay partial signature request",
        InconsistentSignerBlockNumbers => "CELO_ODIS_WARN_07 SIGNER Discrepancy found in signers latest block number that exceeds threshold",
        InconsistentSignerQuotaMeasurements => "CELO_ODIS_WARN_08 SIGNER Discrepancy found in signers quota measurements",
        MissingSessionId => "CELO_ODIS_WARN_09 BAD_INPUT Client did not provide sessionID in request",
        CancelledRequestToSigner => "CELO_ODIS_WARN_09 SIGNER Cancelled request to signer",
        UnknownDomain => "CELO_ODIS_WARN_11 BAD_INPUT Provided domain name and version is not recognized",
        DisabledDomain => "CELO_ODIS_WARN_12 BAD_INPUT Provided domain is disabled",
        InvalidKeyVersionRequest => "CELO_ODIS_WARN_13 BAD_INPUT Request key version header is invalid",
        ApiUnavailable => "CELO_ODIS_WARN_14 BAD_INPUT API is unavailable",
        InconsistentSignerDomainDisabledStates => "CELO_ODIS_WARN_15 SIGNER Discrepency found in signer domain disabled states",
        InvalidAuthSignature => "CELO_ODIS_WARN_12 BAD_INPUT Authorization signature was incorrectly generated. Request will be rejected in a future version.",
        InvalidNonce => "CELO_ODIS_WARN_13 BAD_INPUT SequentialDelayDomain nonce check failed on Signer request",
        SignerResponseDiscrepancies => "CELO_ODIS_WARN_14 SIGNER Discrepancies detected in signer responses",
        InconsistentSignerQueryMeasurements => "CELO_ODIS_WARN_15 SIGNER Discrepancy found in signers performed query count measurements",
    }
);

/// Either kind of message. Serialises as its wire text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Error(ErrorMessage),
    Warning(WarningMessage),
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Error(e) => e.as_str(),
            ErrorType::Warning(w) => w.as_str(),
        }
    }

    /// Parses wire text. Codes are checked against errors first.
    pub fn parse(text: &str) -> Option<Self> {
        ErrorMessage::parse(text)
            .map(ErrorType::Error)
            .or_else(|| WarningMessage::parse(text).map(ErrorType::Warning))
    }
}

impl From<ErrorMessage> for ErrorType {
    fn from(e: ErrorMessage) -> Self {
        ErrorType::Error(e)
    }
}

impl From<WarningMessage> for ErrorType {
    fn from(w: WarningMessage) -> Self {
        ErrorType::Warning(w)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ErrorType::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown ODIS error: {text}")))
    }
}

// =============================================================================
// ODIS ERROR
// =============================================================================

/// A handler failure: the wire code plus the HTTP status to answer with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status} {code}")]
pub struct OdisError {
    pub code: ErrorType,
    pub status: u16,
}

impl OdisError {
    pub fn new(code: impl Into<ErrorType>, status: u16) -> Self {
        Self {
            code: code.into(),
            status,
        }
    }

    /// 400 with `INVALID_INPUT`.
    pub fn invalid_input() -> Self {
        Self::new(WarningMessage::InvalidInput, 400)
    }

    /// 401 with `UNAUTHENTICATED_USER`.
    pub fn unauthenticated() -> Self {
        Self::new(WarningMessage::UnauthenticatedUser, 401)
    }

    /// 503 with `API_UNAVAILABLE`.
    pub fn api_unavailable() -> Self {
        Self::new(WarningMessage::ApiUnavailable, 503)
    }

    /// 400 with `INVALID_KEY_VERSION_REQUEST`.
    pub fn invalid_key_version() -> Self {
        Self::new(WarningMessage::InvalidKeyVersionRequest, 400)
    }

    /// 400 with `UNKNOWN_DOMAIN`.
    pub fn unknown_domain() -> Self {
        Self::new(WarningMessage::UnknownDomain, 400)
    }

    /// 401 with `INVALID_NONCE`.
    pub fn invalid_nonce() -> Self {
        Self::new(WarningMessage::InvalidNonce, 401)
    }

    /// 403 with `DISABLED_DOMAIN`.
    pub fn disabled_domain() -> Self {
        Self::new(WarningMessage::DisabledDomain, 403)
    }

    /// 500 with the given failure code.
    pub fn internal(code: ErrorMessage) -> Self {
        Self::new(code, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_text_roundtrip() {
        let error = ErrorType::from(ErrorMessage::NotEnoughPartialSignatures);
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, "\"CELO_ODIS_ERR_07 SIG_ERR Not enough partial signatures\"");
        assert_eq!(serde_json::from_str::<ErrorType>(&json).unwrap(), error);
    }

    #[test]
    fn test_shared_code_numbers_are_distinct_texts() {
        // ERR_26 and WARN_12/13/14/15 each label two messages
        assert_ne!(
            ErrorMessage::FailureToGetBlockNumber.as_str(),
            ErrorMessage::FailureToGetDek.as_str()
        );
        assert_eq!(
            ErrorType::parse(WarningMessage::InvalidNonce.as_str()),
            Some(ErrorType::Warning(WarningMessage::InvalidNonce))
        );
    }

    #[test]
    fn test_unknown_text_rejected() {
        assert!(serde_json::from_str::<ErrorType>("\"CELO_ODIS_ERR_99\"").is_err());
    }

    #[test]
    fn test_error_constructors() {
        assert_eq!(OdisError::invalid_input().status, 400);
        assert_eq!(OdisError::unauthenticated().status, 401);
        assert_eq!(OdisError::disabled_domain().status, 403);
        assert_eq!(OdisError::api_unavailable().status, 503);
        assert_eq!(
            OdisError::internal(ErrorMessage::FailingClosed).code,
            ErrorType::Error(ErrorMessage::FailingClosed)
        );
    }
}
