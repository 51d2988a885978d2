//! HTTP client for the combiner's public API.

use std::time::Duration;

use odis_common::wire::pnp::PnpResponse;
use odis_common::wire::{StatusResponse, AUTHORIZATION_HEADER};
use odis_common::KEY_VERSION_HEADER;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur when calling the combiner.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Combiner returned {status}: {error}")]
    Rejected { status: StatusCode, error: String },
}

/// Response of a signing call with the key version the combiner used.
#[derive(Debug, Clone)]
pub struct SignReply {
    pub response: PnpResponse,
    pub key_version: Option<u32>,
}

/// Combiner API client.
pub struct CombinerClient {
    client: Client,
    base_url: String,
}

impl CombinerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2).min(timeout))
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn connection_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_connect() {
            ApiError::Connection(format!("Cannot connect to {}", self.base_url))
        } else {
            ApiError::Http(e)
        }
    }

    /// POST a signed body and decode the response.
    async fn post<R: DeserializeOwned>(
        &self,
        path: &str,
        body: Vec<u8>,
        authorization: &str,
        key_version: Option<u32>,
    ) -> Result<(R, Option<u32>), ApiError> {
        let mut request = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION_HEADER, authorization)
            .body(body);
        if let Some(version) = key_version {
            request = request.header(KEY_VERSION_HEADER, version.to_string());
        }

        let response = request.send().await.map_err(|e| self.connection_error(e))?;
        let status = response.status();
        let returned_version = response
            .headers()
            .get(KEY_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let error = serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(ApiError::Rejected { status, error });
        }

        let decoded = serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok((decoded, returned_version))
    }

    /// `GET /status`
    pub async fn status(&self) -> Result<StatusResponse, ApiError> {
        let response = self
            .client
            .get(self.url("/status"))
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// `POST /quotaStatus`
    pub async fn quota_status(
        &self,
        body: Vec<u8>,
        authorization: &str,
    ) -> Result<PnpResponse, ApiError> {
        let (response, _) = self.post("/quotaStatus", body, authorization, None).await?;
        Ok(response)
    }

    /// `POST /sign`
    pub async fn sign(
        &self,
        body: Vec<u8>,
        authorization: &str,
        key_version: Option<u32>,
    ) -> Result<SignReply, ApiError> {
        let (response, key_version) = self.post("/sign", body, authorization, key_version).await?;
        Ok(SignReply {
            response,
            key_version,
        })
    }
}
