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

//! Certificate subject description and defaulting.
//!
//! A workload usually does not know its own name when the configuration is
//! written, so the common name may be left unset (or set to
//! [`HOSTNAME_PLACEHOLDER`]) and is filled in from the host name, which
//! inside a cluster is the pod name. When that happens and no
//! organizational unit was given, the pod's namespace is used instead.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RequesterError, Result};

/// Common name value that asks for the local host name.
pub const HOSTNAME_PLACEHOLDER: &str = "<hostname>";

/// Well-known location of the pod namespace inside a cluster.
pub const DEFAULT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Identity attributes the requested certificate should assert.
///
/// Multi-valued attributes are unordered sets from the caller's point of
/// view; they are encoded in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubjectDescriptor {
    /// Common Name (CN).
    pub common_name: Option<String>,

    /// Serial Number attribute of the subject (not the certificate serial).
    pub serial_number: Option<String>,

    /// Country (C) values.
    pub country: Vec<String>,

    /// Organization (O) values.
    pub organization: Vec<String>,

    /// Organizational Unit (OU) values.
    pub organizational_unit: Vec<String>,

    /// Locality (L) values.
    pub locality: Vec<String>,

    /// State or Province (ST) values.
    pub province: Vec<String>,

    /// Street Address values.
    pub street_address: Vec<String>,

    /// Postal Code values.
    pub postal_code: Vec<String>,
}

impl SubjectDescriptor {
    /// Create a descriptor with only the common name set.
    pub fn with_common_name(cn: impl Into<String>) -> Self {
        Self {
            common_name: Some(cn.into()),
            ..Default::default()
        }
    }

    /// The common name, if one has been set.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref().filter(|cn| !cn.is_empty())
    }

    /// Whether the common name still needs to be resolved from the host.
    pub fn needs_common_name(&self) -> bool {
        matches!(self.common_name(), None | Some(HOSTNAME_PLACEHOLDER))
    }

    /// Fill in unset fields from the local environment.
    ///
    /// `local_identity` is only called when the common name is unset or the
    /// placeholder. An unreadable namespace file is not an error and leaves
    /// the organizational unit unset.
    pub fn apply_defaults<F>(&mut self, local_identity: F, namespace_file: &Path) -> Result<()>
    where
        F: FnOnce() -> Result<String>,
    {
        if !self.needs_common_name() {
            return Ok(());
        }

        let identity = local_identity()?;
        if identity.is_empty() {
            return Err(RequesterError::config("local host name is empty"));
        }
        debug!(common_name = %identity, "Defaulted common name to local host name");
        self.common_name = Some(identity);

        if self.organizational_unit.is_empty() {
            match std::fs::read_to_string(namespace_file) {
                Ok(ns) => {
                    let ns = ns.trim();
                    if !ns.is_empty() {
                        debug!(organizational_unit = %ns, "Defaulted organizational unit to namespace");
                        self.organizational_unit = vec![ns.to_string()];
                    }
                }
                Err(e) => {
                    debug!(
                        path = %namespace_file.display(),
                        error = %e,
                        "Namespace file unavailable, leaving organizational unit unset"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Resolve the local host name (the pod name when running in a cluster).
pub fn local_hostname() -> Result<String> {
    hostname::get()
        .map_err(|e| RequesterError::config(format!("failed to read host name: {e}")))?
        .into_string()
        .map_err(|_| RequesterError::config("host name is not valid UTF-8"))
}
