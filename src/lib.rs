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

//! # kube-csr-requester
//!
//! Obtain a signed workload certificate from the Kubernetes certificates API.
//!
//! A single run resolves or generates a private key, builds a PKCS#10
//! certificate signing request from the configured subject, submits it as a
//! `CertificateSigningRequest`, waits for an approver to decide, and writes
//! the issued certificate plus a certificate + key bundle to disk.
//!
//! ## Features
//!
//! - **Key reuse across restarts**: an existing key is never replaced
//! - **Subject defaulting** from the pod host name and namespace
//! - **Bounded, cancellable wait** for approval with capped backoff
//! - **Pluggable authority** behind the [`CertificateAuthority`] trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use kube_csr_requester::authority::{connect, KubeAuthority};
//! use kube_csr_requester::{requester, RequesterConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = RequesterConfig::default();
//!     config.subject.organization = vec!["acme".into()];
//!     config.request.usages = vec!["server auth".into()];
//!
//!     let client = connect(None).await?;
//!     let authority = KubeAuthority::new(client, &config.request.signer_name);
//!
//!     let outcome = requester::run(&config, authority, &CancellationToken::new()).await?;
//!     println!("certificate written to {}", outcome.public_cert.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod approval;
pub mod artifacts;
pub mod authority;
pub mod config;
pub mod csr;
pub mod error;
pub mod key;
pub mod logging;
pub mod requester;
pub mod subject;

// Re-export main types at crate root for convenience
pub use approval::{ApprovalClient, ApprovalState, CertificateResult, PollConfig};
pub use authority::{
    CertificateAuthority, CertificateRequest, KubeAuthority, RequestHandle, RequestStatus,
};
pub use config::RequesterConfig;
pub use csr::{CsrBuilder, SubjectAltNames};
pub use error::{RequesterError, Result, Stage};
pub use key::KeyMaterial;
pub use subject::SubjectDescriptor;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
