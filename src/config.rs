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

//! Requester configuration.
//!
//! A [`RequesterConfig`] is assembled once at startup from built-in
//! defaults, an optional TOML file, and command-line overrides, then passed
//! by reference into [`crate::requester::run`].
//!
//! # Example Configuration
//!
//! ```toml
//! [paths]
//! private_key = "/etc/ssl/certs/kubernetes/private.key"
//! public_cert = "/etc/ssl/certs/kubernetes/public.crt"
//! private_cert = "/etc/ssl/certs/kubernetes/private.crt"
//!
//! [subject]
//! common_name = "<hostname>"
//! organization = ["acme"]
//!
//! [request]
//! usages = ["digital signature", "key encipherment", "server auth"]
//! signer_name = "example.com/serving"
//! approval_timeout_secs = 3600
//!
//! [request.alt_names]
//! dns = ["svc-1.team-a.svc"]
//!
//! [request.poll]
//! initial_interval_ms = 250
//! max_interval_ms = 4000
//! multiplier = 2.0
//!
//! [cluster]
//! kubeconfig = "/root/.kube/config"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::approval::PollConfig;
use crate::csr::SubjectAltNames;
use crate::error::{RequesterError, Result};
use crate::subject::{SubjectDescriptor, DEFAULT_NAMESPACE_FILE, HOSTNAME_PLACEHOLDER};

/// Default private key location.
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "/etc/ssl/certs/kubernetes/private.key";

/// Default public certificate location.
pub const DEFAULT_PUBLIC_CERT_PATH: &str = "/etc/ssl/certs/kubernetes/public.crt";

/// Default certificate + key bundle location.
pub const DEFAULT_PRIVATE_CERT_PATH: &str = "/etc/ssl/certs/kubernetes/private.crt";

/// Default Kubernetes signer.
pub const DEFAULT_SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";

/// Complete requester configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterConfig {
    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Subject attributes for the request.
    #[serde(default = "default_subject")]
    pub subject: SubjectDescriptor,

    /// Request and approval settings.
    #[serde(default)]
    pub request: RequestConfig,

    /// Cluster connection settings.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            subject: default_subject(),
            request: RequestConfig::default(),
            cluster: ClusterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_subject() -> SubjectDescriptor {
    SubjectDescriptor::with_common_name(HOSTNAME_PLACEHOLDER)
}

impl RequesterConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown keys.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| RequesterError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RequesterError::config(format!("TOML serialize: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RequesterError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Validate the configuration for completeness and consistency.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        for (name, path) in [
            ("paths.private_key", &self.paths.private_key),
            ("paths.public_cert", &self.paths.public_cert),
            ("paths.private_cert", &self.paths.private_cert),
        ] {
            if path.as_os_str().is_empty() {
                errors.push(format!("{name} is required"));
            }
        }

        if self.paths.public_cert == self.paths.private_cert {
            errors.push("paths.public_cert and paths.private_cert must differ".to_string());
        }
        if self.paths.private_key == self.paths.private_cert
            || self.paths.private_key == self.paths.public_cert
        {
            errors.push("paths.private_key must differ from the certificate paths".to_string());
        }

        if let Some(name) = &self.request.name {
            if name.is_empty() {
                errors.push("request.name must not be empty when set".to_string());
            }
        }

        if self.request.signer_name.is_empty() {
            errors.push("request.signer_name is required".to_string());
        }

        if self.request.approval_timeout_secs == 0 {
            errors.push("request.approval_timeout_secs must be > 0".to_string());
        }

        if let Err(e) = self.request.poll.validate() {
            errors.push(match e {
                RequesterError::Config(msg) => msg,
                other => other.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RequesterError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Upper bound on the wait for a decision.
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.request.approval_timeout_secs)
    }

    /// Name to submit the request under, falling back to the common name.
    pub fn request_name<'a>(&'a self, common_name: &'a str) -> &'a str {
        self.request
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(common_name)
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Private key, reused when present.
    pub private_key: PathBuf,

    /// Public certificate output.
    pub public_cert: PathBuf,

    /// Certificate followed by private key.
    pub private_cert: PathBuf,

    /// File holding the workload namespace.
    pub namespace_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from(DEFAULT_PRIVATE_KEY_PATH),
            public_cert: PathBuf::from(DEFAULT_PUBLIC_CERT_PATH),
            private_cert: PathBuf::from(DEFAULT_PRIVATE_CERT_PATH),
            namespace_file: PathBuf::from(DEFAULT_NAMESPACE_FILE),
        }
    }
}

/// Request and approval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    /// Request name; the common name when unset.
    pub name: Option<String>,

    /// Key usage tokens, passed through verbatim.
    pub usages: Vec<String>,

    /// Signer that should issue the certificate.
    pub signer_name: String,

    /// Upper bound on the wait for a decision, in seconds.
    pub approval_timeout_secs: u64,

    /// Subject alternative names.
    pub alt_names: SubjectAltNames,

    /// Status polling backoff.
    pub poll: PollConfig,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            name: None,
            usages: Vec::new(),
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            approval_timeout_secs: 60 * 60,
            alt_names: SubjectAltNames::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Cluster connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// Kubeconfig file; in-cluster or inferred configuration when unset.
    pub kubeconfig: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
