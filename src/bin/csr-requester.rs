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

//! Kubernetes Certificate Requester
//!
//! Requests a certificate for the running workload through the Kubernetes
//! certificates API and writes it to disk once approved.
//!
//! # Usage
//!
//! ```text
//! csr-requester [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>               Path to configuration file
//!       --private-key-path <PATH>     Where to store the private key
//!       --public-cert-path <PATH>     Where to store the signed certificate
//!       --private-cert-path <PATH>    Where to store certificate + key
//!       --common-name <CN>            Subject CommonName ("<hostname>" for the host name)
//!       --organization <O>            Subject Organization (repeatable)
//!       --usage <USAGE>               Key usage for the request (repeatable)
//!       --approval-timeout <SECS>     How long to wait for approval
//!   -v, --verbose                     Enable verbose output
//!   -q, --quiet                       Suppress non-error output
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Request a serving certificate for this pod
//! csr-requester --organization acme --usage "digital signature" \
//!     --usage "key encipherment" --usage "server auth"
//!
//! # Run against a local cluster
//! csr-requester --kubeconfig ~/.kube/config --common-name svc-1
//! ```

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use kube_csr_requester::authority::{connect, KubeAuthority};
use kube_csr_requester::logging::{self, LogLevel};
use kube_csr_requester::{requester, RequesterConfig, RequesterError, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Kubernetes Certificate Requester
#[derive(Parser)]
#[command(name = "csr-requester")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Request a workload certificate from the Kubernetes certificates API", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where to store the private key on disk
    #[arg(long, value_name = "PATH")]
    private_key_path: Option<PathBuf>,

    /// Where to store the public signed certificate on disk
    #[arg(long, value_name = "PATH")]
    public_cert_path: Option<PathBuf>,

    /// Where to store the file containing both the certificate and private key
    #[arg(long, value_name = "PATH")]
    private_cert_path: Option<PathBuf>,

    /// File holding the namespace used as the default OrganizationalUnit
    #[arg(long, value_name = "PATH")]
    namespace_file: Option<PathBuf>,

    /// Subject CommonName; "<hostname>" resolves to the local host name
    #[arg(long, value_name = "CN")]
    common_name: Option<String>,

    /// Subject SerialNumber
    #[arg(long, value_name = "SERIAL")]
    serial_number: Option<String>,

    /// Subject Country (multiple allowed)
    #[arg(long, value_name = "C")]
    country: Vec<String>,

    /// Subject Organization (multiple allowed)
    #[arg(long, value_name = "O")]
    organization: Vec<String>,

    /// Subject OrganizationalUnit (multiple allowed)
    #[arg(long, value_name = "OU")]
    organizational_unit: Vec<String>,

    /// Subject Locality (multiple allowed)
    #[arg(long, value_name = "L")]
    locality: Vec<String>,

    /// Subject Province (multiple allowed)
    #[arg(long, value_name = "ST")]
    province: Vec<String>,

    /// Subject StreetAddress (multiple allowed)
    #[arg(long, value_name = "STREET")]
    street_address: Vec<String>,

    /// Subject PostalCode (multiple allowed)
    #[arg(long, value_name = "CODE")]
    postal_code: Vec<String>,

    /// Usages to put in the certificate request (multiple allowed)
    #[arg(long, value_name = "USAGE")]
    usage: Vec<String>,

    /// DNS subject alternative name (multiple allowed)
    #[arg(long, value_name = "DNS")]
    dns_name: Vec<String>,

    /// IP subject alternative name (multiple allowed)
    #[arg(long, value_name = "IP")]
    ip_address: Vec<IpAddr>,

    /// Name of the CertificateSigningRequest object (defaults to the CommonName)
    #[arg(long, value_name = "NAME")]
    request_name: Option<String>,

    /// Signer that should issue the certificate
    #[arg(long, value_name = "SIGNER")]
    signer_name: Option<String>,

    /// Seconds to wait for the request to be approved
    #[arg(long, value_name = "SECS")]
    approval_timeout: Option<u64>,

    /// Kubeconfig file (in-cluster configuration when omitted)
    #[arg(long, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides on top.
    fn load_config(&self) -> Result<RequesterConfig> {
        let mut config = match &self.config {
            Some(path) => RequesterConfig::load(path)?,
            None => RequesterConfig::default(),
        };

        let paths = &mut config.paths;
        override_with(&mut paths.private_key, &self.private_key_path);
        override_with(&mut paths.public_cert, &self.public_cert_path);
        override_with(&mut paths.private_cert, &self.private_cert_path);
        override_with(&mut paths.namespace_file, &self.namespace_file);

        let subject = &mut config.subject;
        if self.common_name.is_some() {
            subject.common_name = self.common_name.clone();
        }
        if self.serial_number.is_some() {
            subject.serial_number = self.serial_number.clone();
        }
        extend_with(&mut subject.country, &self.country);
        extend_with(&mut subject.organization, &self.organization);
        extend_with(&mut subject.organizational_unit, &self.organizational_unit);
        extend_with(&mut subject.locality, &self.locality);
        extend_with(&mut subject.province, &self.province);
        extend_with(&mut subject.street_address, &self.street_address);
        extend_with(&mut subject.postal_code, &self.postal_code);

        let request = &mut config.request;
        extend_with(&mut request.usages, &self.usage);
        extend_with(&mut request.alt_names.dns, &self.dns_name);
        extend_with(&mut request.alt_names.ip, &self.ip_address);
        if self.request_name.is_some() {
            request.name = self.request_name.clone();
        }
        override_with(&mut request.signer_name, &self.signer_name);
        override_with(&mut request.approval_timeout_secs, &self.approval_timeout);

        if self.kubeconfig.is_some() {
            config.cluster.kubeconfig = self.kubeconfig.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn extend_with<T: Clone>(target: &mut Vec<T>, values: &[T]) {
    target.extend_from_slice(values);
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(LogLevel::from_flags(cli.quiet, cli.verbose, LogLevel::Info));
            return fail(&e);
        }
    };

    let configured = match config.logging.level.parse::<LogLevel>() {
        Ok(level) => level,
        Err(e) => {
            logging::init(LogLevel::from_flags(cli.quiet, cli.verbose, LogLevel::Info));
            return fail(&e);
        }
    };
    logging::init(LogLevel::from_flags(cli.quiet, cli.verbose, configured));

    // Create runtime for async operations
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

async fn run(config: RequesterConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        watcher.cancel();
    });

    let client = connect(config.cluster.kubeconfig.as_deref()).await?;
    let authority = KubeAuthority::new(client, &config.request.signer_name);

    let outcome = requester::run(&config, authority, &cancel).await?;
    info!(
        request = %outcome.request_name,
        common_name = %outcome.common_name,
        key_generated = outcome.key_generated,
        public_cert = %outcome.public_cert.display(),
        bundle = %outcome.bundle.display(),
        "Certificate obtained"
    );
    Ok(())
}

fn fail(e: &RequesterError) -> ExitCode {
    error!(stage = %e.stage(), error = %e, "Certificate request failed");
    eprintln!("Error: {}", e);
    ExitCode::FAILURE
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => {
                error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, abandoning wait");
        }
        _ = terminate => {
            info!("received SIGTERM, abandoning wait");
        }
    }
}
