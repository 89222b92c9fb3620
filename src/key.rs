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

//! Private key resolution.
//!
//! The requester keeps its private key across restarts: an existing key at
//! the configured location is reused byte-for-byte, otherwise a new ECDSA
//! P-256 key is generated and stored there before anything else uses it.
//!
//! # Example
//!
//! ```no_run
//! use kube_csr_requester::key::load_or_generate;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let key = load_or_generate("/etc/ssl/certs/kubernetes/private.key")?;
//! if key.is_generated() {
//!     println!("generated a new key");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use rcgen::KeyPair;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{RequesterError, Result};

/// PEM-encoded private key plus where it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pem: Vec<u8>,
    generated: bool,
}

impl KeyMaterial {
    /// Wrap PEM bytes that were obtained elsewhere.
    pub fn new(pem: impl Into<Vec<u8>>, generated: bool) -> Self {
        Self {
            pem: pem.into(),
            generated,
        }
    }

    /// The raw PEM bytes, exactly as stored.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pem
    }

    /// The PEM text, if it is valid UTF-8.
    pub fn as_pem(&self) -> Option<&str> {
        std::str::from_utf8(&self.pem).ok()
    }

    /// Whether the key was generated during this run.
    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.pem.len())
            .field("generated", &self.generated)
            .finish()
    }
}

/// Load the private key at `path`, or generate and store one if absent.
///
/// # Errors
///
/// Returns [`RequesterError::KeyIo`] if the location cannot be read or
/// written for a reason other than absence,
/// [`RequesterError::KeyFormat`] if existing content is not a PEM private
/// key, and [`RequesterError::KeyGeneration`] if a new key cannot be made.
pub fn load_or_generate(path: impl AsRef<Path>) -> Result<KeyMaterial> {
    let path = path.as_ref();

    match fs::read(path) {
        Ok(data) => {
            validate_pem(path, &data)?;
            info!(path = %path.display(), "Reusing existing private key");
            Ok(KeyMaterial::new(data, false))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => generate(path),
        Err(e) => Err(RequesterError::key_io(path, e)),
    }
}

/// Generate a key and publish it at `path` only if nothing is there yet.
///
/// The key is written to a temporary file in the same directory and linked
/// into place, so a reader never sees a partial key. If another process
/// publishes first, its key wins and is returned instead.
fn generate(path: &Path) -> Result<KeyMaterial> {
    let key_pair =
        KeyPair::generate().map_err(|e| RequesterError::key_generation(path, e.to_string()))?;
    let pem = key_pair.serialize_pem();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| RequesterError::key_io(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RequesterError::key_io(path, e))?;
    tmp.write_all(pem.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| RequesterError::key_io(path, e))?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            info!(path = %path.display(), "Generated new private key");
            Ok(KeyMaterial::new(pem.as_bytes(), true))
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            warn!(
                path = %path.display(),
                "Private key appeared while generating, reusing the stored key"
            );
            let data = fs::read(path).map_err(|e| RequesterError::key_io(path, e))?;
            validate_pem(path, &data)?;
            Ok(KeyMaterial::new(data, false))
        }
        Err(e) => Err(RequesterError::key_io(path, e.error)),
    }
}

/// Check that `data` holds a PKCS#8 or SEC1 PEM private key.
fn validate_pem(path: &Path, data: &[u8]) -> Result<()> {
    let text = std::str::from_utf8(data)
        .map_err(|_| RequesterError::key_format(path, "content is not PEM text"))?;

    if text.trim().is_empty() {
        return Err(RequesterError::key_format(path, "file is empty"));
    }

    match KeyPair::from_pem(text) {
        Ok(_) => Ok(()),
        Err(pkcs8_err) => {
            if p256::SecretKey::from_sec1_pem(text).is_ok() {
                Ok(())
            } else {
                Err(RequesterError::key_format(path, pkcs8_err.to_string()))
            }
        }
    }
}
