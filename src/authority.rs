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

//! Certificate authority abstraction.
//!
//! The requester only needs two things from an authority: create a request
//! and read back its status. [`CertificateAuthority`] captures that
//! contract; [`KubeAuthority`] implements it against the Kubernetes
//! `certificates.k8s.io/v1` API.
//!
//! # Example
//!
//! ```no_run
//! use kube_csr_requester::authority::{connect, CertificateAuthority, KubeAuthority};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = connect(None).await?;
//! let authority = KubeAuthority::new(client, "kubernetes.io/kube-apiserver-client");
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{RequesterError, Result};

/// Condition type set by an approver that accepted the request.
pub const CONDITION_APPROVED: &str = "Approved";
/// Condition type set by an approver that rejected the request.
pub const CONDITION_DENIED: &str = "Denied";
/// Condition type set by a signer that could not issue the certificate.
pub const CONDITION_FAILED: &str = "Failed";

/// Connection timeout for the cluster API.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for the cluster API.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A certificate request ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Name the authority records the request under.
    pub name: String,

    /// PEM-encoded PKCS#10 request.
    pub csr: Vec<u8>,

    /// Key usage tokens, passed through verbatim.
    pub usages: Vec<String>,
}

impl CertificateRequest {
    /// Create a new request.
    pub fn new(name: impl Into<String>, csr: impl Into<Vec<u8>>, usages: Vec<String>) -> Self {
        Self {
            name: name.into(),
            csr: csr.into(),
            usages,
        }
    }
}

/// Identifies a submitted request at the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    /// Request name.
    pub name: String,

    /// Server-assigned identity of this particular request, if reported.
    pub uid: Option<String>,
}

impl RequestHandle {
    /// Create a handle for a named request.
    pub fn new(name: impl Into<String>, uid: Option<String>) -> Self {
        Self {
            name: name.into(),
            uid,
        }
    }
}

/// Status of a request as reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// No decision yet, or approved but not yet issued.
    Pending,

    /// Approved and issued.
    Approved {
        /// Signed certificate bytes (PEM).
        certificate: Vec<u8>,
    },

    /// Denied or failed.
    Denied {
        /// Reason stated by the authority.
        reason: String,
    },
}

/// An authority that accepts certificate requests and decides on them.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Submit a request.
    ///
    /// Fails with [`RequesterError::Submission`] if the name is already in
    /// use or the authority cannot be reached.
    async fn create(&self, request: &CertificateRequest) -> Result<RequestHandle>;

    /// Read the current status of a submitted request.
    ///
    /// Reads are idempotent; callers may retry on error.
    async fn get(&self, handle: &RequestHandle) -> Result<RequestStatus>;
}

/// Create a cluster client from an optional kubeconfig path.
///
/// Without a path the configuration is inferred, which inside a pod means
/// the mounted service account.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                RequesterError::cluster(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| RequesterError::cluster(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| RequesterError::cluster(format!("failed to infer config: {}", e)))?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config)
        .map_err(|e| RequesterError::cluster(format!("failed to create client: {}", e)))
}

/// Authority backed by Kubernetes `CertificateSigningRequest` objects.
#[derive(Clone)]
pub struct KubeAuthority {
    api: Api<CertificateSigningRequest>,
    signer_name: String,
}

impl KubeAuthority {
    /// Create an authority that submits requests for the given signer.
    pub fn new(client: Client, signer_name: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            signer_name: signer_name.into(),
        }
    }

    fn to_object(&self, request: &CertificateRequest) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some(request.name.clone()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                request: ByteString(request.csr.clone()),
                signer_name: self.signer_name.clone(),
                usages: Some(request.usages.clone()),
                ..Default::default()
            },
            status: None,
        }
    }
}

impl std::fmt::Debug for KubeAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAuthority")
            .field("signer_name", &self.signer_name)
            .finish()
    }
}

#[async_trait]
impl CertificateAuthority for KubeAuthority {
    async fn create(&self, request: &CertificateRequest) -> Result<RequestHandle> {
        debug!(request = %request.name, signer = %self.signer_name, "POST CertificateSigningRequest");

        match self
            .api
            .create(&PostParams::default(), &self.to_object(request))
            .await
        {
            Ok(created) => Ok(RequestHandle::new(
                created.metadata.name.unwrap_or_else(|| request.name.clone()),
                created.metadata.uid,
            )),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(RequesterError::submission(
                &request.name,
                format!("name already in use: {}", e.message),
            )),
            Err(e) => Err(RequesterError::submission(&request.name, e.to_string())),
        }
    }

    async fn get(&self, handle: &RequestHandle) -> Result<RequestStatus> {
        match self.api.get(&handle.name).await {
            Ok(csr) => Ok(request_status(&csr, handle)),
            // Deleted while waiting; it will never be decided
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(RequestStatus::Denied {
                reason: format!("certificate signing request {} was deleted", handle.name),
            }),
            Err(e) => Err(RequesterError::cluster(format!(
                "failed to read certificate signing request {}: {}",
                handle.name, e
            ))),
        }
    }
}

/// Derive the decision from a `CertificateSigningRequest` object.
///
/// A denial or failure condition wins over approval. An approved request
/// without an issued certificate is still pending. An object whose UID
/// differs from the submitted one replaced the original request, which is
/// reported as a denial.
pub fn request_status(csr: &CertificateSigningRequest, handle: &RequestHandle) -> RequestStatus {
    if let (Some(expected), Some(actual)) = (handle.uid.as_deref(), csr.metadata.uid.as_deref()) {
        if expected != actual {
            return RequestStatus::Denied {
                reason: format!(
                    "certificate signing request {} was replaced (uid {} != {})",
                    handle.name, actual, expected
                ),
            };
        }
    }

    let Some(status) = csr.status.as_ref() else {
        return RequestStatus::Pending;
    };

    let mut approved = false;
    for condition in status.conditions.iter().flatten() {
        match condition.type_.as_str() {
            CONDITION_DENIED | CONDITION_FAILED => {
                let reason = [condition.message.as_deref(), condition.reason.as_deref()]
                    .into_iter()
                    .flatten()
                    .find(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("request {}", condition.type_.to_lowercase()));
                return RequestStatus::Denied { reason };
            }
            CONDITION_APPROVED => approved = true,
            _ => {}
        }
    }

    match status.certificate.as_ref() {
        Some(cert) if approved && !cert.0.is_empty() => RequestStatus::Approved {
            certificate: cert.0.clone(),
        },
        _ => RequestStatus::Pending,
    }
}
