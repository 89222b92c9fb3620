// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request submission and approval waiting.
//!
//! [`ApprovalClient`] drives one request through
//! `Unsubmitted -> Submitted -> {Approved | Denied | TimedOut | SubmitFailed}`.
//! Waiting polls the authority with capped exponential backoff, gives up
//! after a single hard timeout, and returns promptly when the caller's
//! [`CancellationToken`] fires. A cancelled wait leaves the request
//! `Submitted`, so it can be resumed with the same handle without
//! submitting again.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use kube_csr_requester::approval::{ApprovalClient, PollConfig};
//! use kube_csr_requester::authority::{connect, CertificateRequest, KubeAuthority};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(csr_pem: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let authority = KubeAuthority::new(connect(None).await?, "example.com/signer");
//! let mut client = ApprovalClient::new(authority, PollConfig::default());
//!
//! let request = CertificateRequest::new("svc-1", csr_pem, vec!["server auth".into()]);
//! let handle = client.submit(&request).await?;
//! let cert = client
//!     .await_decision(&handle, Duration::from_secs(3600), &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::authority::{CertificateAuthority, CertificateRequest, RequestHandle, RequestStatus};
use crate::error::{RequesterError, Result};

/// Default wait bound for a decision.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Backoff settings for status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Delay before the second status check, in milliseconds.
    pub initial_interval_ms: u64,

    /// Upper bound on the delay between checks, in milliseconds.
    pub max_interval_ms: u64,

    /// Growth factor applied after each check.
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 250,
            max_interval_ms: 4_000,
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    /// Delay before the second status check, never below one millisecond.
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms.max(1))
    }

    /// Upper bound on the delay between checks, never below the initial delay.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms).max(self.initial_interval())
    }

    /// Delay that follows `current`, kept within `[initial, max]`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let (floor, ceiling) = (self.initial_interval(), self.max_interval());
        let next = current.as_secs_f64() * self.multiplier;

        if next.is_nan() || next >= ceiling.as_secs_f64() {
            ceiling
        } else if next <= floor.as_secs_f64() {
            floor
        } else {
            Duration::from_secs_f64(next)
        }
    }

    /// Check the settings describe a bounded, non-busy poll.
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval_ms == 0 {
            return Err(RequesterError::config("poll initial_interval_ms must be > 0"));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(RequesterError::config(
                "poll max_interval_ms must be >= initial_interval_ms",
            ));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(RequesterError::config("poll multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

/// The signed certificate returned on approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResult {
    certificate: Vec<u8>,
}

impl CertificateResult {
    /// Wrap signed certificate bytes.
    pub fn new(certificate: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate: certificate.into(),
        }
    }

    /// The certificate bytes as issued.
    pub fn as_bytes(&self) -> &[u8] {
        &self.certificate
    }

    /// Take the certificate bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.certificate
    }
}

/// Lifecycle of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    /// Nothing has been sent yet.
    Unsubmitted,

    /// The authority accepted the request; no decision seen yet.
    Submitted(RequestHandle),

    /// The request was approved and the certificate issued.
    Approved(CertificateResult),

    /// The request was denied.
    Denied(String),

    /// No decision arrived within the wait bound.
    TimedOut(Duration),

    /// The authority did not accept the request.
    SubmitFailed(String),
}

impl ApprovalState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unsubmitted | Self::Submitted(_))
    }

    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubmitted => "Unsubmitted",
            Self::Submitted(_) => "Submitted",
            Self::Approved(_) => "Approved",
            Self::Denied(_) => "Denied",
            Self::TimedOut(_) => "TimedOut",
            Self::SubmitFailed(_) => "SubmitFailed",
        }
    }
}

/// Terminal answer from the authority.
enum Decision {
    Approved(Vec<u8>),
    Denied(String),
}

/// Submits one request and waits for the authority's decision.
pub struct ApprovalClient<A> {
    authority: A,
    poll: PollConfig,
    state: ApprovalState,
}

impl<A: CertificateAuthority> ApprovalClient<A> {
    /// Create a client in the `Unsubmitted` state.
    pub fn new(authority: A, poll: PollConfig) -> Self {
        Self {
            authority,
            poll,
            state: ApprovalState::Unsubmitted,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ApprovalState {
        &self.state
    }

    /// The underlying authority.
    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Submit the request. Only allowed once per client.
    ///
    /// # Errors
    ///
    /// Returns [`RequesterError::Submission`] if the authority rejects the
    /// request or a request was already submitted by this client.
    pub async fn submit(&mut self, request: &CertificateRequest) -> Result<RequestHandle> {
        if !matches!(self.state, ApprovalState::Unsubmitted) {
            return Err(RequesterError::submission(
                &request.name,
                format!("request already in state {}", self.state.as_str()),
            ));
        }

        match self.authority.create(request).await {
            Ok(handle) => {
                info!(request = %handle.name, "Created certificate signing request, waiting for approval");
                self.state = ApprovalState::Submitted(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                self.state = ApprovalState::SubmitFailed(e.to_string());
                Err(e)
            }
        }
    }

    /// Wait until the request is approved or denied, `timeout` elapses, or
    /// `cancel` fires.
    ///
    /// Once a terminal state is reached, later calls return the same outcome
    /// without contacting the authority.
    ///
    /// # Errors
    ///
    /// - [`RequesterError::RequestDenied`] with the authority's reason
    /// - [`RequesterError::ApprovalTimeout`] if no decision arrived in time
    /// - [`RequesterError::Cancelled`] if `cancel` fired; the handle stays valid
    pub async fn await_decision(
        &mut self,
        handle: &RequestHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CertificateResult> {
        match &self.state {
            ApprovalState::Submitted(submitted) if submitted.name == handle.name => {}
            ApprovalState::Submitted(submitted) => {
                return Err(RequesterError::submission(
                    &handle.name,
                    format!("client is tracking request {}", submitted.name),
                ));
            }
            ApprovalState::Approved(cert) => return Ok(cert.clone()),
            ApprovalState::Denied(reason) => return Err(RequesterError::denied(reason.clone())),
            ApprovalState::TimedOut(waited) => {
                return Err(RequesterError::approval_timeout(*waited));
            }
            ApprovalState::SubmitFailed(message) => {
                return Err(RequesterError::submission(&handle.name, message.clone()));
            }
            ApprovalState::Unsubmitted => {
                return Err(RequesterError::submission(
                    &handle.name,
                    "request was never submitted",
                ));
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(request = %handle.name, "Wait for approval cancelled");
                return Err(RequesterError::Cancelled);
            }
            decided = tokio::time::timeout(timeout, self.poll_until_decided(handle)) => decided,
        };

        match outcome {
            Ok(Decision::Approved(certificate)) => {
                info!(request = %handle.name, "Certificate signing request approved and signed");
                let result = CertificateResult::new(certificate);
                self.state = ApprovalState::Approved(result.clone());
                Ok(result)
            }
            Ok(Decision::Denied(reason)) => {
                warn!(request = %handle.name, reason = %reason, "Certificate signing request denied");
                self.state = ApprovalState::Denied(reason.clone());
                Err(RequesterError::denied(reason))
            }
            Err(_) => {
                warn!(
                    request = %handle.name,
                    timeout_secs = timeout.as_secs_f64(),
                    "Timed out waiting for a decision"
                );
                self.state = ApprovalState::TimedOut(timeout);
                Err(RequesterError::approval_timeout(timeout))
            }
        }
    }

    /// Poll until the authority reports a terminal decision.
    ///
    /// Read failures are retried; the caller bounds the total wait.
    async fn poll_until_decided(&self, handle: &RequestHandle) -> Decision {
        let mut delay = self.poll.initial_interval();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.authority.get(handle).await {
                Ok(RequestStatus::Approved { certificate }) => {
                    return Decision::Approved(certificate);
                }
                Ok(RequestStatus::Denied { reason }) => return Decision::Denied(reason),
                Ok(RequestStatus::Pending) => {
                    debug!(request = %handle.name, attempt, "No decision yet");
                }
                Err(e) => {
                    warn!(
                        request = %handle.name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to read request status, retrying"
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay = self.poll.next_interval(delay);
        }
    }
}
