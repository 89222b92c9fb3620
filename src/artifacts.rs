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

//! Certificate artifact output.
//!
//! Two files are produced: the public certificate on its own, and a bundle
//! holding the certificate followed by the private key. The public file is
//! written first and is left in place if the bundle cannot be written.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::approval::CertificateResult;
use crate::error::{RequesterError, Result};
use crate::key::KeyMaterial;

/// Mode for the public certificate file.
pub const PUBLIC_CERT_MODE: u32 = 0o644;

/// Mode for the certificate + key bundle.
pub const BUNDLE_MODE: u32 = 0o600;

/// Where the artifacts were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifacts {
    /// Public certificate path.
    pub public_cert: PathBuf,

    /// Certificate + key bundle path.
    pub bundle: PathBuf,
}

/// Write the public certificate and the certificate + key bundle.
///
/// # Errors
///
/// Returns [`RequesterError::ArtifactIo`] naming the file that could not be
/// written.
pub fn write_artifacts(
    public_cert: &Path,
    bundle: &Path,
    certificate: &CertificateResult,
    key: &KeyMaterial,
) -> Result<WrittenArtifacts> {
    write_file(public_cert, certificate.as_bytes(), PUBLIC_CERT_MODE)?;
    info!(path = %public_cert.display(), "Wrote public certificate");

    let mut combined = Vec::with_capacity(certificate.as_bytes().len() + key.as_bytes().len());
    combined.extend_from_slice(certificate.as_bytes());
    combined.extend_from_slice(key.as_bytes());

    write_file(bundle, &combined, BUNDLE_MODE)?;
    info!(path = %bundle.display(), "Wrote certificate and key bundle");

    Ok(WrittenArtifacts {
        public_cert: public_cert.to_path_buf(),
        bundle: bundle.to_path_buf(),
    })
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RequesterError::artifact_io(path, e))?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options
        .open(path)
        .map_err(|e| RequesterError::artifact_io(path, e))?;

    // An existing file keeps its old mode through open(); tighten it before any bytes land
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| RequesterError::artifact_io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| RequesterError::artifact_io(path, e))?;

    Ok(())
}
