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

//! Integration test utilities and helpers
//!
//! Provides a scripted in-memory authority, a mock Kubernetes API server
//! for the certificates API, and config helpers rooted in a temp dir.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::prelude::*;
use kube_csr_requester::{
    CertificateAuthority, CertificateRequest, KubeAuthority, PollConfig, RequestHandle,
    RequestStatus, RequesterConfig, Result,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Collection path of the certificates API
pub const PATH_CSRS: &str = "/apis/certificates.k8s.io/v1/certificatesigningrequests";

/// Certificate bytes returned by approving authorities
pub const CERT: &[u8] = b"-----BEGIN CERTIFICATE-----\nQ0VSVA==\n-----END CERTIFICATE-----\n";

/// In-memory authority whose decision can be changed while a wait is running
#[derive(Clone)]
pub struct MockAuthority {
    status: Arc<Mutex<RequestStatus>>,
    submitted: Arc<Mutex<Vec<CertificateRequest>>>,
    gets: Arc<AtomicUsize>,
}

impl MockAuthority {
    /// Authority that reports `status` for every read
    pub fn new(status: RequestStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
            submitted: Arc::new(Mutex::new(Vec::new())),
            gets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Authority that approves immediately with [`CERT`]
    pub fn approving() -> Self {
        Self::new(RequestStatus::Approved {
            certificate: CERT.to_vec(),
        })
    }

    /// Authority that never decides
    pub fn silent() -> Self {
        Self::new(RequestStatus::Pending)
    }

    /// Change the reported decision
    pub fn set_status(&self, status: RequestStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Requests received so far
    pub fn submitted(&self) -> Vec<CertificateRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Number of status reads so far
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateAuthority for MockAuthority {
    async fn create(&self, request: &CertificateRequest) -> Result<RequestHandle> {
        self.submitted.lock().unwrap().push(request.clone());
        Ok(RequestHandle::new(&request.name, Some("uid-1".to_string())))
    }

    async fn get(&self, _handle: &RequestHandle) -> Result<RequestStatus> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Mock Kubernetes API server serving `CertificateSigningRequest` objects
pub struct MockApiServer {
    server: MockServer,
}

impl MockApiServer {
    /// Start a new mock API server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get a reference to the inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Authority talking to this server
    pub fn authority(&self, signer_name: &str) -> KubeAuthority {
        let config = kube::Config::new(self.server.uri().parse().expect("mock server uri"));
        let client = kube::Client::try_from(config).expect("client for mock server");
        KubeAuthority::new(client, signer_name)
    }

    /// Mock a successful create returning an object with `uid`
    pub async fn mock_create_success(&self, name: &str, uid: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_CSRS))
            .respond_with(ResponseTemplate::new(201).set_body_json(csr_object(name, uid, json!(null))))
            .mount(&self.server)
            .await;
    }

    /// Mock a create rejected because the name is taken (HTTP 409)
    pub async fn mock_create_conflict(&self, name: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_CSRS))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": format!("certificatesigningrequests.certificates.k8s.io \"{name}\" already exists"),
                "reason": "AlreadyExists",
                "code": 409
            })))
            .mount(&self.server)
            .await;
    }

    /// Mock reads of `name` returning the given status block
    pub async fn mock_get(&self, name: &str, uid: &str, status: Value) {
        Mock::given(method("GET"))
            .and(path(format!("{PATH_CSRS}/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(csr_object(name, uid, status)))
            .mount(&self.server)
            .await;
    }

    /// Mock reads of `name` returning an approved object carrying [`CERT`]
    pub async fn mock_get_approved(&self, name: &str, uid: &str) {
        self.mock_get(
            name,
            uid,
            json!({
                "conditions": [condition("Approved", "AutoApproved", "approved by test")],
                "certificate": BASE64_STANDARD.encode(CERT)
            }),
        )
        .await;
    }
}

/// A `CertificateSigningRequest` object as served by the API server
pub fn csr_object(name: &str, uid: &str, status: Value) -> Value {
    let mut object = json!({
        "apiVersion": "certificates.k8s.io/v1",
        "kind": "CertificateSigningRequest",
        "metadata": { "name": name, "uid": uid },
        "spec": {
            "request": BASE64_STANDARD.encode(b"csr"),
            "signerName": "example.com/serving",
            "usages": ["server auth"]
        }
    });
    if !status.is_null() {
        object["status"] = status;
    }
    object
}

/// A true condition of the given type
pub fn condition(type_: &str, reason: &str, message: &str) -> Value {
    json!({
        "type": type_,
        "status": "True",
        "reason": reason,
        "message": message
    })
}

/// Config with every path inside `dir` and fast polling
pub fn test_config(dir: &TempDir) -> RequesterConfig {
    let mut config = RequesterConfig::default();
    config.paths.private_key = dir.path().join("private.key");
    config.paths.public_cert = dir.path().join("public.crt");
    config.paths.private_cert = dir.path().join("private.crt");
    config.paths.namespace_file = dir.path().join("namespace");
    config.request.poll = PollConfig {
        initial_interval_ms: 20,
        max_interval_ms: 100,
        multiplier: 2.0,
    };
    config
}
