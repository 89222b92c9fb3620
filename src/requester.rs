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

//! End-to-end certificate request flow.
//!
//! One pass, no retries: resolve the key, default the subject, build the
//! CSR, submit it, wait for a decision, write the artifacts. The first
//! failure is returned to the caller, which is expected to exit.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::approval::ApprovalClient;
use crate::artifacts::write_artifacts;
use crate::authority::{CertificateAuthority, CertificateRequest};
use crate::config::RequesterConfig;
use crate::csr::CsrBuilder;
use crate::error::{RequesterError, Result};
use crate::key::load_or_generate;
use crate::subject::local_hostname;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Name the request was submitted under.
    pub request_name: String,

    /// Common name bound into the certificate.
    pub common_name: String,

    /// Whether the private key was generated during this run.
    pub key_generated: bool,

    /// Public certificate path.
    pub public_cert: PathBuf,

    /// Certificate + key bundle path.
    pub bundle: PathBuf,
}

/// Obtain a certificate, using the host name as the default common name.
pub async fn run<A>(
    config: &RequesterConfig,
    authority: A,
    cancel: &CancellationToken,
) -> Result<Outcome>
where
    A: CertificateAuthority,
{
    run_with_identity(config, authority, local_hostname, cancel).await
}

/// Obtain a certificate, resolving a defaulted common name with
/// `local_identity`.
pub async fn run_with_identity<A, F>(
    config: &RequesterConfig,
    authority: A,
    local_identity: F,
    cancel: &CancellationToken,
) -> Result<Outcome>
where
    A: CertificateAuthority,
    F: FnOnce() -> Result<String>,
{
    config.validate()?;

    let key = load_or_generate(&config.paths.private_key)?;

    let mut subject = config.subject.clone();
    subject.apply_defaults(local_identity, &config.paths.namespace_file)?;
    let common_name = subject
        .common_name()
        .ok_or_else(|| RequesterError::config("common name could not be resolved"))?
        .to_string();

    let csr = CsrBuilder::new(&subject)
        .alt_names(config.request.alt_names.clone())
        .build(&key)?;
    info!(common_name = %common_name, "Built certificate signing request");

    let request_name = config.request_name(&common_name).to_string();
    let request = CertificateRequest::new(&request_name, csr, config.request.usages.clone());

    // Cancelled before anything reached the cluster
    if cancel.is_cancelled() {
        info!(request = %request_name, "Cancelled before submitting");
        return Err(RequesterError::Cancelled);
    }

    let mut client = ApprovalClient::new(authority, config.request.poll.clone());
    let handle = client.submit(&request).await?;
    let certificate = client
        .await_decision(&handle, config.approval_timeout(), cancel)
        .await?;

    let written = write_artifacts(
        &config.paths.public_cert,
        &config.paths.private_cert,
        &certificate,
        &key,
    )?;

    Ok(Outcome {
        request_name,
        common_name,
        key_generated: key.is_generated(),
        public_cert: written.public_cert,
        bundle: written.bundle,
    })
}
