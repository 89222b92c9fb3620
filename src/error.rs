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

//! Error types for the certificate requester.
//!
//! Every failure in the request lifecycle is fatal to the process. Each
//! variant maps onto the [`Stage`] that produced it so the top-level handler
//! can report where the pipeline stopped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`RequesterError`].
pub type Result<T> = std::result::Result<T, RequesterError>;

/// Errors that can occur while obtaining a certificate.
#[derive(Debug, Error)]
pub enum RequesterError {
    /// Invalid configuration or missing local identity.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cluster credentials could not be obtained.
    #[error("Cluster client error: {0}")]
    Cluster(String),

    /// The private key location could not be read or written.
    #[error("Private key I/O error at {path}: {source}")]
    KeyIo {
        /// Key storage location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Existing key content is not a parseable private key.
    #[error("Invalid private key at {path}: {message}")]
    KeyFormat {
        /// Key storage location.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A new private key could not be generated.
    #[error("Failed to generate private key for {path}: {message}")]
    KeyGeneration {
        /// Key storage location.
        path: PathBuf,
        /// Generator diagnostic.
        message: String,
    },

    /// The CSR could not be built from the key material and subject.
    #[error("CSR construction error: {0}")]
    CsrConstruction(String),

    /// The authority rejected or could not receive the request.
    #[error("Failed to submit certificate signing request {name}: {message}")]
    Submission {
        /// Request name.
        name: String,
        /// Cause reported by the authority or transport.
        message: String,
    },

    /// The authority denied the request.
    #[error("Certificate signing request denied: {reason}")]
    RequestDenied {
        /// Reason stated by the authority.
        reason: String,
    },

    /// No decision was reached within the wait bound.
    #[error("No decision on certificate signing request after {}s", timeout.as_secs_f64())]
    ApprovalTimeout {
        /// The wait bound that elapsed.
        timeout: Duration,
    },

    /// The wait was cancelled by the caller.
    #[error("Wait for certificate signing request was cancelled")]
    Cancelled,

    /// An output artifact could not be written.
    #[error("Failed to write {path}: {source}")]
    ArtifactIo {
        /// Artifact location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration, subject defaulting and cluster client setup.
    Config,
    /// Key material resolution.
    Key,
    /// CSR construction.
    Csr,
    /// Submission to the authority.
    Submit,
    /// Waiting for the authority's decision.
    Approval,
    /// Writing output files.
    Artifacts,
}

impl Stage {
    /// Get the stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Key => "key",
            Self::Csr => "csr",
            Self::Submit => "submit",
            Self::Approval => "approval",
            Self::Artifacts => "artifacts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequesterError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cluster client error with the given message.
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a key I/O error for the given location.
    pub fn key_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::KeyIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a key format error for the given location.
    pub fn key_format(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::KeyFormat {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a key generation error for the given location.
    pub fn key_generation(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::KeyGeneration {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a CSR construction error with the given message.
    pub fn csr(msg: impl Into<String>) -> Self {
        Self::CsrConstruction(msg.into())
    }

    /// Create a submission error for the named request.
    pub fn submission(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Submission {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a denial error carrying the authority's reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::RequestDenied {
            reason: reason.into(),
        }
    }

    /// Create an approval timeout error.
    pub fn approval_timeout(timeout: Duration) -> Self {
        Self::ApprovalTimeout { timeout }
    }

    /// Create an artifact I/O error for the given location.
    pub fn artifact_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::Cluster(_) => Stage::Config,
            Self::KeyIo { .. } | Self::KeyFormat { .. } | Self::KeyGeneration { .. } => Stage::Key,
            Self::CsrConstruction(_) => Stage::Csr,
            Self::Submission { .. } => Stage::Submit,
            Self::RequestDenied { .. } | Self::ApprovalTimeout { .. } | Self::Cancelled => {
                Stage::Approval
            }
            Self::ArtifactIo { .. } => Stage::Artifacts,
        }
    }

    /// Returns the denial reason if this is a `RequestDenied` error.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::RequestDenied { reason } => Some(reason),
            _ => None,
        }
    }
}
