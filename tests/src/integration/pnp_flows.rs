//! # PNP Flows
//!
//! Phone number privacy requests through the combiner:
//!
//! 1. Threshold signing and signature determinism
//! 2. Quota reconciliation across signers that disagree
//! 3. Replay and concurrency accounting

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use odis_common::crypto::{blind, generate_shares, verify_signature};
    use odis_common::{ErrorMessage, WarningMessage, KEY_VERSION_HEADER};
    use odis_signer::store::{QuotaScope, SignerStore};
    use reqwest::StatusCode;

    use crate::harness::{Account, Cluster, SignerMode};

    const PHONE: &[u8] = b"+14155550123";

    // =========================================================================
    // SIGNING
    // =========================================================================

    #[tokio::test]
    async fn test_signature_is_deterministic_across_signer_subsets() {
        let dealt = Arc::new(generate_shares(2, 3, &mut rand::thread_rng()).unwrap());
        let first = Cluster::builder()
            .pnp_key(Arc::clone(&dealt))
            .signers(&[SignerMode::Serving, SignerMode::Serving, SignerMode::Offline])
            .start()
            .await;
        let second = Cluster::builder()
            .pnp_key(dealt)
            .signers(&[SignerMode::Offline, SignerMode::Serving, SignerMode::Serving])
            .start()
            .await;

        let mut signatures = Vec::new();
        for cluster in [&first, &second] {
            let account = Account::new();
            cluster.fund(&account, 10);
            let blinded = blind(PHONE, &mut rand::thread_rng());
            let reply = cluster
                .post_pnp("/sign", &account, Some(&blinded.to_hex()))
                .await;
            assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
            assert_eq!(reply.headers.get(KEY_VERSION_HEADER).unwrap(), "1");

            let signature = blinded
                .unblind_hex(reply.body["signature"].as_str().unwrap())
                .unwrap();
            assert!(verify_signature(&cluster.pnp_public_key(), PHONE, &signature));
            signatures.push(signature.to_bytes());
        }
        assert_eq!(signatures[0], signatures[1]);
    }

    #[tokio::test]
    async fn test_key_version_selection() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();
        cluster.fund(&account, 10);

        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        let body = account.body(Some(&blinded));
        let authorization = account.authorization(&body);
        let reply = cluster
            .post(
                "/sign",
                body.clone(),
                &[("authorization", authorization.clone()), ("keyVersion", "1".into())],
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.headers.get(KEY_VERSION_HEADER).unwrap(), "1");

        let reply = cluster
            .post(
                "/sign",
                body,
                &[("authorization", authorization), ("keyVersion", "2".into())],
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            reply.body["error"],
            WarningMessage::InvalidKeyVersionRequest.as_str()
        );
    }

    #[tokio::test]
    async fn test_legacy_routes_count_apart() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();
        cluster.fund(&account, 3);

        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        let reply = cluster
            .post_pnp("/getBlindedMessageSig", &account, Some(&blinded))
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert!(reply.body["signature"].is_string());

        let reply = cluster.post_pnp("/getQuota", &account, None).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["totalQuota"], 3);
        assert_eq!(reply.body["performedQueryCount"], 1);

        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.body["performedQueryCount"], 0);
    }

    // =========================================================================
    // QUOTA RECONCILIATION
    // =========================================================================

    #[tokio::test]
    async fn test_quota_reconciles_to_threshold_smallest() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();
        cluster.fund(&account, 100);
        for (signer, count) in cluster.signers.iter().zip([1, 4, 9]) {
            for i in 0..count {
                signer
                    .store
                    .record_signature(QuotaScope::Pnp, &account.address, &format!("seed-{i}"))
                    .await
                    .unwrap();
            }
        }

        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["performedQueryCount"], 4);
        assert_eq!(reply.body["totalQuota"], 100);
        let warnings = reply.body["warnings"].as_array().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w == WarningMessage::InconsistentSignerQueryMeasurements.as_str()));
    }

    #[tokio::test]
    async fn test_total_quota_discrepancy_fails_quota_check() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();
        for (signer, queries) in cluster.signers.iter().zip([10, 10, 20]) {
            cluster.fund_on(signer, &account, queries);
        }

        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            reply.body["error"],
            ErrorMessage::ThresholdPnpQuotaStatusFailure.as_str()
        );

        // signing with the same disagreement still succeeds
        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        let reply = cluster.post_pnp("/sign", &account, Some(&blinded)).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert!(reply.body["signature"].is_string());
    }

    #[tokio::test]
    async fn test_exhausted_quota_is_forwarded() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();

        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        let reply = cluster.post_pnp("/sign", &account, Some(&blinded)).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body["error"], WarningMessage::ExceededQuota.as_str());
        assert!(reply.body.get("signature").is_none());
    }

    // =========================================================================
    // ACCOUNTING
    // =========================================================================

    #[tokio::test]
    async fn test_replayed_query_is_not_counted() {
        let cluster = Cluster::builder().start().await;
        let account = Account::new();
        cluster.fund(&account, 5);

        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        let first = cluster.post_pnp("/sign", &account, Some(&blinded)).await;
        assert_eq!(first.status, StatusCode::OK, "{}", first.body);
        assert_eq!(first.body["performedQueryCount"], 1);

        let replay = cluster.post_pnp("/sign", &account, Some(&blinded)).await;
        assert_eq!(replay.status, StatusCode::OK, "{}", replay.body);
        assert_eq!(replay.body["performedQueryCount"], 1);
        assert_eq!(replay.body["signature"], first.body["signature"]);
        let warnings = replay.body["warnings"].as_array().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w == WarningMessage::DuplicateRequestToGetPartialSig.as_str()));

        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.body["performedQueryCount"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_signs_count_every_query() {
        let cluster = Cluster::builder()
            .threshold(3)
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 20);

        let queries: Vec<String> = (0..10)
            .map(|_| blind(PHONE, &mut rand::thread_rng()).to_hex())
            .collect();
        let replies = join_all(
            queries
                .iter()
                .map(|blinded| cluster.post_pnp("/sign", &account, Some(blinded))),
        )
        .await;
        for reply in &replies {
            assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        }

        for signer in &cluster.signers {
            let count = signer
                .store
                .performed_query_count(QuotaScope::Pnp, &account.address)
                .await
                .unwrap();
            assert_eq!(count, 10);
        }
        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.body["performedQueryCount"], 10);
    }
}
