//! Wallet-key authenticated PNP request bodies.

use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use odis_common::ecdsa::{address_from_pubkey, parse_signing_key, sign_personal_message};
use odis_common::wire::pnp::PnpRequest;
use odis_common::wire::Address;

pub struct Wallet {
    key: SigningKey,
    address: Address,
}

/// Body bytes with the matching `Authorization` value.
pub struct SignedBody {
    pub body: Vec<u8>,
    pub authorization: String,
}

impl Wallet {
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let key = parse_signing_key(private_key).context("Invalid private key")?;
        let address = address_from_pubkey(key.verifying_key());
        Ok(Self { key, address })
    }

    pub fn account(&self) -> String {
        format!("{:?}", self.address)
    }

    pub fn request(&self, blinded: Option<String>, session_id: Option<String>) -> PnpRequest {
        PnpRequest {
            account: self.account(),
            blinded_query_phone_number: blinded,
            hashed_phone_number: None,
            authentication_method: None,
            session_id,
            version: None,
        }
    }

    /// Serialises `request` and signs exactly those bytes.
    pub fn sign(&self, request: &PnpRequest) -> Result<SignedBody> {
        let body = serde_json::to_vec(request).context("Failed to encode request")?;
        let authorization =
            sign_personal_message(&body, &self.key).context("Failed to sign request")?;
        Ok(SignedBody {
            body,
            authorization,
        })
    }
}
