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

//! Integration tests for the Kubernetes-backed authority

use crate::integration::{condition, csr_object, MockApiServer, CERT, PATH_CSRS};
use base64::prelude::*;
use kube_csr_requester::{
    CertificateAuthority, CertificateRequest, RequestHandle, RequestStatus, RequesterError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn request() -> CertificateRequest {
    CertificateRequest::new(
        "svc-1",
        b"-----BEGIN CERTIFICATE REQUEST-----\n".to_vec(),
        vec!["digital signature".into(), "server auth".into()],
    )
}

#[tokio::test]
async fn test_create_posts_signer_and_usages() {
    let mock = MockApiServer::start().await;

    Mock::given(method("POST"))
        .and(path(PATH_CSRS))
        .and(body_partial_json(json!({
            "metadata": { "name": "svc-1" },
            "spec": {
                "signerName": "example.com/serving",
                "usages": ["digital signature", "server auth"],
                "request": BASE64_STANDARD.encode(b"-----BEGIN CERTIFICATE REQUEST-----\n")
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(csr_object(
            "svc-1",
            "uid-1",
            json!(null),
        )))
        .expect(1)
        .mount(mock.inner())
        .await;

    let authority = mock.authority("example.com/serving");
    let handle = authority.create(&request()).await.expect("create");

    assert_eq!(handle.name, "svc-1");
    assert_eq!(handle.uid.as_deref(), Some("uid-1"));
}

#[tokio::test]
async fn test_create_name_conflict() {
    let mock = MockApiServer::start().await;
    mock.mock_create_conflict("svc-1").await;

    let authority = mock.authority("example.com/serving");
    let err = authority.create(&request()).await.unwrap_err();

    match err {
        RequesterError::Submission { name, message } => {
            assert_eq!(name, "svc-1");
            assert!(message.contains("already in use"), "message was {message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_create_server_error() {
    let mock = MockApiServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_CSRS))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(mock.inner())
        .await;

    let authority = mock.authority("example.com/serving");
    let err = authority.create(&request()).await.unwrap_err();
    assert!(matches!(err, RequesterError::Submission { .. }));
}

#[tokio::test]
async fn test_get_pending_without_status() {
    let mock = MockApiServer::start().await;
    mock.mock_get("svc-1", "uid-1", json!(null)).await;

    let authority = mock.authority("example.com/serving");
    let status = authority
        .get(&RequestHandle::new("svc-1", Some("uid-1".into())))
        .await
        .unwrap();
    assert_eq!(status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_get_approved() {
    let mock = MockApiServer::start().await;
    mock.mock_get_approved("svc-1", "uid-1").await;

    let authority = mock.authority("example.com/serving");
    let status = authority
        .get(&RequestHandle::new("svc-1", Some("uid-1".into())))
        .await
        .unwrap();
    assert_eq!(
        status,
        RequestStatus::Approved {
            certificate: CERT.to_vec()
        }
    );
}

#[tokio::test]
async fn test_get_denied_carries_message() {
    let mock = MockApiServer::start().await;
    mock.mock_get(
        "svc-1",
        "uid-1",
        json!({ "conditions": [condition("Denied", "PolicyDenied", "policy violation")] }),
    )
    .await;

    let authority = mock.authority("example.com/serving");
    let status = authority
        .get(&RequestHandle::new("svc-1", Some("uid-1".into())))
        .await
        .unwrap();
    assert_eq!(
        status,
        RequestStatus::Denied {
            reason: "policy violation".into()
        }
    );
}

#[tokio::test]
async fn test_get_replaced_object_is_denied() {
    let mock = MockApiServer::start().await;
    mock.mock_get_approved("svc-1", "uid-2").await;

    let authority = mock.authority("example.com/serving");
    let status = authority
        .get(&RequestHandle::new("svc-1", Some("uid-1".into())))
        .await
        .unwrap();
    assert!(matches!(status, RequestStatus::Denied { .. }));
}

#[tokio::test]
async fn test_get_deleted_object_is_denied() {
    let mock = MockApiServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PATH_CSRS}/svc-1")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "not found",
            "reason": "NotFound",
            "code": 404
        })))
        .mount(mock.inner())
        .await;

    let authority = mock.authority("example.com/serving");
    let status = authority
        .get(&RequestHandle::new("svc-1", None))
        .await
        .unwrap();
    assert_eq!(
        status,
        RequestStatus::Denied {
            reason: "certificate signing request svc-1 was deleted".into()
        }
    );
}

#[tokio::test]
async fn test_get_server_error_is_cluster_error() {
    let mock = MockApiServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{PATH_CSRS}/svc-1")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "etcd unavailable",
            "reason": "InternalError",
            "code": 500
        })))
        .mount(mock.inner())
        .await;

    let authority = mock.authority("example.com/serving");
    let err = authority
        .get(&RequestHandle::new("svc-1", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RequesterError::Cluster(_)));
}
