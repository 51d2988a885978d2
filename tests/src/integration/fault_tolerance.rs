//! # Fault Tolerance
//!
//! Up to `n - t` signers may be unreachable or unresponsive. Below that the
//! combiner fails closed within the signer timeout.

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use odis_common::crypto::blind;
    use odis_common::{ErrorMessage, WarningMessage};
    use reqwest::StatusCode;

    use crate::harness::{Account, Cluster, SignerMode};

    const PHONE: &[u8] = b"+14155550123";

    async fn sign(cluster: &Cluster, account: &Account) -> crate::harness::Reply {
        let blinded = blind(PHONE, &mut rand::thread_rng()).to_hex();
        cluster.post_pnp("/sign", account, Some(&blinded)).await
    }

    #[tokio::test]
    async fn test_one_offline_signer_is_tolerated() {
        let cluster = Cluster::builder()
            .signers(&[SignerMode::Serving, SignerMode::Offline, SignerMode::Serving])
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 5);

        let reply = sign(&cluster, &account).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

        let reply = cluster.post_pnp("/quotaStatus", &account, None).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert_eq!(reply.body["totalQuota"], 5);
        assert_eq!(reply.body["performedQueryCount"], 1);
    }

    #[tokio::test]
    async fn test_below_threshold_fails_closed() {
        let cluster = Cluster::builder()
            .signers(&[SignerMode::Serving, SignerMode::Offline, SignerMode::Offline])
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 5);

        // refused connections vote 502
        let reply = sign(&cluster, &account).await;
        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            reply.body["error"],
            ErrorMessage::NotEnoughPartialSignatures.as_str()
        );
        assert!(reply.body.get("signature").is_none());
    }

    #[tokio::test]
    async fn test_hanging_signers_time_out() {
        let cluster = Cluster::builder()
            .signers(&[SignerMode::Serving, SignerMode::Hanging, SignerMode::Hanging])
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 5);

        let started = Instant::now();
        let reply = sign(&cluster, &account).await;
        let elapsed = started.elapsed();
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            reply.body["error"],
            ErrorMessage::NotEnoughPartialSignatures.as_str()
        );
        assert!(elapsed >= Duration::from_millis(800), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_hanging_signer_does_not_delay_threshold() {
        let cluster = Cluster::builder()
            .signers(&[SignerMode::Serving, SignerMode::Serving, SignerMode::Hanging])
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 5);

        let started = Instant::now();
        let reply = sign(&cluster, &account).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_signers_with_api_disabled() {
        let cluster = Cluster::builder()
            .configure_signers(|index, config| config.api.pnp_enabled = index == 0)
            .start()
            .await;
        let account = Account::new();
        cluster.fund(&account, 5);

        let reply = sign(&cluster, &account).await;
        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reply.body["error"], WarningMessage::ApiUnavailable.as_str());
    }

    #[tokio::test]
    async fn test_exhausted_quota_outvotes_unreachable_signer() {
        let cluster = Cluster::builder()
            .signers(&[SignerMode::Offline, SignerMode::Serving, SignerMode::Serving])
            .start()
            .await;
        let account = Account::new();

        let reply = sign(&cluster, &account).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body["error"], WarningMessage::ExceededQuota.as_str());
    }
}
