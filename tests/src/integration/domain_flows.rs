//! # Domain Flows
//!
//! Domain-restricted signing through the combiner: nonces, rate limiting
//! and disabling a domain on every signer.

#[cfg(test)]
mod tests {
    use odis_common::crypto::{blind, verify_signature, ThresholdKey};
    use odis_common::ecdsa::test_helpers::generate_keypair;
    use odis_common::WarningMessage;
    use reqwest::StatusCode;
    use serde_json::Value;

    use crate::harness::{domain_body, Cluster};

    const SIGN: &str = "DomainRestrictedSignatureRequest";
    const QUOTA: &str = "DomainQuotaStatusRequest";
    const DISABLE: &str = "DisableDomainRequest";

    #[tokio::test]
    async fn test_domain_sign_and_nonce_replay() {
        let cluster = Cluster::builder().start().await;
        let (key, _) = generate_keypair();
        let message = b"backup key";
        let blinded = blind(message, &mut rand::thread_rng());

        let body = domain_body(SIGN, &key, 0, Some(&blinded.to_hex()));
        let reply = cluster.post("/domain/sign", body.clone(), &[]).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["status"]["counter"], 1);
        let signature = blinded
            .unblind_hex(reply.body["signature"].as_str().unwrap())
            .unwrap();
        let public_key = ThresholdKey::from_info(&cluster.domain_key).unwrap().public_key;
        assert!(verify_signature(&public_key, message, &signature));

        // every signer refuses the nonce it already accepted
        let reply = cluster.post("/domain/sign", body, &[]).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"], WarningMessage::InvalidNonce.as_str());

        let reply = cluster
            .post("/domain/quotaStatus", domain_body(QUOTA, &key, 1, None), &[])
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["status"]["counter"], 1);
        assert_eq!(reply.body["status"]["disabled"], false);
    }

    #[tokio::test]
    async fn test_disable_persists_on_every_signer() {
        let cluster = Cluster::builder().start().await;
        let (key, _) = generate_keypair();

        let reply = cluster
            .post("/domain/disable", domain_body(DISABLE, &key, 0, None), &[])
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["status"]["disabled"], true);

        let blinded = blind(b"backup key", &mut rand::thread_rng()).to_hex();
        let reply = cluster
            .post("/domain/sign", domain_body(SIGN, &key, 1, Some(&blinded)), &[])
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body["error"], WarningMessage::DisabledDomain.as_str());
        assert!(reply.body.get("signature").is_none());

        let reply = cluster
            .post("/domain/quotaStatus", domain_body(QUOTA, &key, 2, None), &[])
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body["success"], false);
        assert_eq!(reply.body["error"], WarningMessage::DisabledDomain.as_str());
        assert_eq!(reply.body["status"]["disabled"], true);
    }

    #[tokio::test]
    async fn test_forged_request_never_reaches_signers() {
        let cluster = Cluster::builder().start().await;
        let (key, _) = generate_keypair();
        let (other, _) = generate_keypair();

        let blinded = blind(b"backup key", &mut rand::thread_rng()).to_hex();
        let mut value: Value =
            serde_json::from_slice(&domain_body(SIGN, &key, 0, Some(&blinded))).unwrap();
        odis_common::domain::sign_domain_request(&mut value, &other).unwrap();

        let reply = cluster
            .post("/domain/sign", serde_json::to_vec(&value).unwrap(), &[])
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        for signer in &cluster.signers {
            assert!(signer.store.domain_requests().is_empty());
        }
    }

    #[tokio::test]
    async fn test_domains_api_disabled() {
        let cluster = Cluster::builder()
            .configure_combiner(|config| config.api.domains_enabled = false)
            .start()
            .await;
        let (key, _) = generate_keypair();
        let reply = cluster
            .post("/domain/quotaStatus", domain_body(QUOTA, &key, 0, None), &[])
            .await;
        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reply.body["error"], WarningMessage::ApiUnavailable.as_str());
    }
}
