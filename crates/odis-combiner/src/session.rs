//! # Session
//!
//! One client request's fan-out. Every signer is called concurrently and
//! each response is kept verbatim. Collection stops early once the
//! threshold can no longer be reached, or once the caller has what it
//! needs.
//!
//! Timed-out signers count towards early termination but never vote.

use crate::client::{OutgoingRequest, SignerClient, SignerFailure, SignerReply, SignerResponse};
use futures::stream::{FuturesUnordered, StreamExt};
use odis_common::wire::Endpoint;
use odis_common::{ErrorType, WarningMessage};
use odis_telemetry::log_event;
use std::collections::BTreeMap;

/// Responses collected for one client request.
#[derive(Debug)]
pub struct Session<R> {
    pub endpoint: Endpoint,
    pub session_id: String,
    pub threshold: usize,
    pub signer_count: usize,
    pub responses: Vec<SignerResponse<R>>,
}

impl<R: SignerReply> Session<R> {
    pub fn new(endpoint: Endpoint, session_id: String, threshold: usize, signer_count: usize) -> Self {
        Self {
            endpoint,
            session_id,
            threshold,
            signer_count,
            responses: Vec::with_capacity(signer_count),
        }
    }

    /// Calls every signer of `client`.
    ///
    /// `on_success` sees each successful body as it arrives; returning
    /// `true` stops collection and drops the outstanding calls.
    pub async fn collect<F>(
        &mut self,
        client: &SignerClient,
        request: &OutgoingRequest<'_>,
        mut on_success: F,
    ) where
        F: FnMut(&str, &R) -> bool,
    {
        let path = self.endpoint.combiner_path();
        let max_failures = self.signer_count.saturating_sub(self.threshold);
        let mut pending: FuturesUnordered<_> = client
            .signers()
            .iter()
            .map(|signer| client.send::<R>(signer, request))
            .collect();

        let mut failures = 0usize;
        while let Some(response) = pending.next().await {
            let stop = match &response.outcome {
                Ok(body) => on_success(&response.signer, body),
                Err(_) => {
                    failures += 1;
                    failures > max_failures
                }
            };
            self.responses.push(response);
            if stop {
                if !pending.is_empty() {
                    log_event!(
                        debug,
                        path,
                        "stopping early",
                        session_id = %self.session_id,
                        outstanding = pending.len(),
                        failures
                    );
                }
                break;
            }
        }
    }

    /// Successful bodies in arrival order.
    pub fn successes(&self) -> impl Iterator<Item = &R> {
        self.responses
            .iter()
            .filter_map(|response| response.outcome.as_ref().ok())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Failures that carry a vote, timeouts excluded.
    pub fn failures(&self) -> impl Iterator<Item = &SignerFailure<R>> {
        self.responses
            .iter()
            .filter_map(|response| response.outcome.as_ref().err())
            .filter(|failure| !failure.is_timeout())
    }

    /// Every parsed body, successful or not.
    pub fn bodies(&self) -> impl Iterator<Item = &R> {
        self.responses.iter().filter_map(|response| match &response.outcome {
            Ok(body) => Some(body),
            Err(failure) => failure.body.as_ref(),
        })
    }

    /// Adds the warnings successful signers reported, once each.
    pub fn merge_signer_warnings(&self, warnings: &mut Vec<ErrorType>) {
        let reported = self
            .successes()
            .flat_map(|body| body.warnings().iter())
            .filter_map(|text| ErrorType::parse(text));
        for warning in reported {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }

    /// Most common failure status. Ties go to the lowest status.
    pub fn majority_status(&self) -> Option<u16> {
        let mut votes: BTreeMap<u16, usize> = BTreeMap::new();
        for status in self.failures().filter_map(|failure| failure.status) {
            *votes.entry(status).or_default() += 1;
        }
        // BTreeMap iterates ascending; keep the first maximum
        let mut best: Option<(u16, usize)> = None;
        for (status, count) in votes {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((status, count));
            }
        }
        best.map(|(status, _)| status)
    }

    /// The majority status, plus the warning every failure with that
    /// status agrees on. Signer-side errors are never forwarded.
    pub fn majority_failure(&self) -> Option<(u16, Option<WarningMessage>)> {
        let status = self.majority_status()?;
        let mut codes = self
            .failures()
            .filter(|failure| failure.status == Some(status))
            .map(|failure| failure.code);
        let first = codes.next();
        let agreed = codes.all(|code| Some(code) == first);
        let unanimous = match first {
            Some(ErrorType::Warning(warning)) if agreed => Some(warning),
            _ => None,
        };
        Some((status, unanimous))
    }

    /// Logs when successful signers disagree.
    pub fn log_response_discrepancies(&self) {
        let mut values = self.successes().map(SignerReply::comparable);
        let Some(first) = values.next() else {
            return;
        };
        if values.any(|value| value != first) {
            let observed: Vec<String> = self
                .responses
                .iter()
                .filter_map(|response| {
                    let body = response.outcome.as_ref().ok()?;
                    Some(format!("{}={}", response.signer, body.comparable()))
                })
                .collect();
            log_event!(
                warn,
                self.endpoint.combiner_path(),
                "signer responses differ",
                session_id = %self.session_id,
                warning = %WarningMessage::SignerResponseDiscrepancies,
                observed = ?observed
            );
        }
    }
}
