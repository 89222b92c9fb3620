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

//! Integration tests for the full request flow

use crate::integration::{test_config, MockApiServer, MockAuthority, CERT, PATH_CSRS};
use der::DecodePem;
use kube_csr_requester::{requester, RequestStatus, RequesterError, Stage};
use serde_json::json;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};
use x509_cert::request::CertReq;

#[tokio::test]
async fn test_happy_path_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());
    config.subject.organization = vec!["acme".into()];
    config.request.usages = vec!["server auth".into()];

    let authority = MockAuthority::approving();
    let outcome = requester::run(&config, authority.clone(), &CancellationToken::new())
        .await
        .expect("request flow");

    assert!(outcome.key_generated);
    assert_eq!(outcome.request_name, "svc-1");

    let key = fs::read(&config.paths.private_key).expect("key written");
    assert_eq!(fs::read(&config.paths.public_cert).unwrap(), CERT);
    assert_eq!(
        fs::read(&config.paths.private_cert).unwrap(),
        [CERT, key.as_slice()].concat()
    );

    let submitted = authority.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].name, "svc-1");
    assert_eq!(submitted[0].usages, vec!["server auth".to_string()]);
}

#[tokio::test]
async fn test_namespace_becomes_organizational_unit() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("namespace"), "team-a").unwrap();
    let config = test_config(&dir);

    let authority = MockAuthority::approving();
    let outcome = requester::run_with_identity(
        &config,
        authority.clone(),
        || Ok("pod-1".to_string()),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.common_name, "pod-1");

    let csr_pem = String::from_utf8(authority.submitted()[0].csr.clone()).unwrap();
    let csr = CertReq::from_pem(csr_pem.as_bytes()).unwrap();
    let subject = csr.info.subject.to_string();
    assert!(subject.contains("OU=team-a"), "subject was {subject}");
    assert!(subject.contains("CN=pod-1"), "subject was {subject}");
}

#[tokio::test]
async fn test_denial_is_fatal_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());

    let authority = MockAuthority::new(RequestStatus::Denied {
        reason: "policy violation".into(),
    });
    let err = requester::run(&config, authority, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Approval);
    assert_eq!(err.denial_reason(), Some("policy violation"));
    assert!(!config.paths.public_cert.exists());
    assert!(!config.paths.private_cert.exists());
    // The key survives so the next run reuses it
    assert!(config.paths.private_key.exists());
}

#[tokio::test]
async fn test_timeout_is_bounded() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());
    config.request.approval_timeout_secs = 1;

    let start = Instant::now();
    let err = requester::run(&config, MockAuthority::silent(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RequesterError::ApprovalTimeout { .. }));
    assert!(start.elapsed() <= Duration::from_millis(1500));
}

#[tokio::test]
async fn test_cancellation_is_prompt() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());

    let authority = MockAuthority::silent();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = requester::run(&config, authority.clone(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RequesterError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(authority.submitted().len(), 1);
}

#[tokio::test]
async fn test_against_kubernetes_api() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());
    config.request.usages = vec!["server auth".into()];

    let mock = MockApiServer::start().await;
    mock.mock_create_success("svc-1", "uid-1").await;
    mock.mock_get_approved("svc-1", "uid-1").await;

    let authority = mock.authority(&config.request.signer_name);
    requester::run(&config, authority, &CancellationToken::new())
        .await
        .expect("request flow");

    let key = fs::read(&config.paths.private_key).unwrap();
    assert_eq!(fs::read(&config.paths.public_cert).unwrap(), CERT);
    assert_eq!(
        fs::read(&config.paths.private_cert).unwrap(),
        [CERT, key.as_slice()].concat()
    );
}

#[tokio::test]
async fn test_deleted_request_ends_wait_promptly() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.subject.common_name = Some("svc-1".into());
    config.request.approval_timeout_secs = 30;

    let mock = MockApiServer::start().await;
    mock.mock_create_success("svc-1", "uid-1").await;
    Mock::given(method("GET"))
        .and(path(format!("{PATH_CSRS}/svc-1")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "certificatesigningrequests.certificates.k8s.io \"svc-1\" not found",
            "reason": "NotFound",
            "code": 404
        })))
        .mount(mock.inner())
        .await;

    let start = Instant::now();
    let authority = mock.authority(&config.request.signer_name);
    let err = requester::run(&config, authority, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.denial_reason(),
        Some("certificate signing request svc-1 was deleted")
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!config.paths.public_cert.exists());
}
