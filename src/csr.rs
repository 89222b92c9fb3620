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

//! CSR (Certificate Signing Request) generation.
//!
//! This module builds PKCS#10 requests from a [`SubjectDescriptor`] and the
//! resolved [`KeyMaterial`]. The TBS structure is assembled with `x509-cert`
//! and signed with ECDSA P-256 using RFC 6979 nonces, so the same inputs
//! always produce the same bytes.
//!
//! Each subject attribute type becomes one RDN holding all of its values,
//! in the order C, ST, L, street, postal code, O, OU, CN, serial number.

use std::net::IpAddr;

use const_oid::ObjectIdentifier;
use der::asn1::{Ia5String, OctetString, SetOfVec};
use der::pem::LineEnding;
use der::{Any, Encode, EncodePem, Tag};
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::CertReq;

use crate::error::{RequesterError, Result};
use crate::key::KeyMaterial;
use crate::subject::SubjectDescriptor;

const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_STREET_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
const OID_POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");

/// Subject Alternative Names to bind into the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubjectAltNames {
    /// DNS names.
    pub dns: Vec<String>,

    /// IP addresses.
    pub ip: Vec<IpAddr>,
}

impl SubjectAltNames {
    /// Returns true if no alternative names are set.
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty() && self.ip.is_empty()
    }
}

/// Builder for PKCS#10 Certificate Signing Requests.
///
/// # Example
///
/// ```no_run
/// use kube_csr_requester::csr::CsrBuilder;
/// use kube_csr_requester::key::load_or_generate;
/// use kube_csr_requester::subject::SubjectDescriptor;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let key = load_or_generate("/tmp/private.key")?;
/// let subject = SubjectDescriptor::with_common_name("svc-1");
///
/// let csr_pem = CsrBuilder::new(&subject).build(&key)?;
/// # Ok(())
/// # }
/// ```
pub struct CsrBuilder<'a> {
    subject: &'a SubjectDescriptor,
    alt_names: SubjectAltNames,
}

impl<'a> CsrBuilder<'a> {
    /// Create a builder for the given subject with no alternative names.
    pub fn new(subject: &'a SubjectDescriptor) -> Self {
        Self {
            subject,
            alt_names: SubjectAltNames::default(),
        }
    }

    /// Replace the alternative names.
    pub fn alt_names(mut self, alt_names: SubjectAltNames) -> Self {
        self.alt_names = alt_names;
        self
    }

    /// Add a DNS Subject Alternative Name.
    pub fn san_dns(mut self, dns: impl Into<String>) -> Self {
        self.alt_names.dns.push(dns.into());
        self
    }

    /// Add an IP address Subject Alternative Name.
    pub fn san_ip(mut self, ip: IpAddr) -> Self {
        self.alt_names.ip.push(ip);
        self
    }

    /// Build the CSR and return it PEM-encoded.
    pub fn build(self, key: &KeyMaterial) -> Result<Vec<u8>> {
        let req = self.build_request(key)?;
        let pem = req
            .to_pem(LineEnding::LF)
            .map_err(|e| RequesterError::csr(format!("Failed to encode CSR: {}", e)))?;
        Ok(pem.into_bytes())
    }

    /// Build the CSR and return it DER-encoded.
    pub fn build_der(self, key: &KeyMaterial) -> Result<Vec<u8>> {
        self.build_request(key)?
            .to_der()
            .map_err(|e| RequesterError::csr(format!("Failed to encode CSR: {}", e)))
    }

    fn build_request(self, key: &KeyMaterial) -> Result<CertReq> {
        if self.subject.common_name().is_none() {
            return Err(RequesterError::csr("Subject common name is empty"));
        }

        let signer = signing_key(key)?;
        let subject = subject_name(self.subject)?;

        let mut builder = RequestBuilder::new(subject, &signer)
            .map_err(|e| RequesterError::csr(format!("Failed to start CSR: {}", e)))?;

        if !self.alt_names.is_empty() {
            builder
                .add_extension(&alt_names_extension(&self.alt_names)?)
                .map_err(|e| RequesterError::csr(format!("Failed to add SAN extension: {}", e)))?;
        }

        builder
            .build::<DerSignature>()
            .map_err(|e| RequesterError::csr(format!("Failed to sign CSR: {}", e)))
    }
}

/// Parse the key material as an ECDSA P-256 signing key.
///
/// Both PKCS#8 and SEC1 PEM encodings are accepted.
fn signing_key(key: &KeyMaterial) -> Result<SigningKey> {
    let pem = key
        .as_pem()
        .ok_or_else(|| RequesterError::csr("Private key is not PEM text"))?;

    if let Ok(signer) = SigningKey::from_pkcs8_pem(pem) {
        return Ok(signer);
    }

    p256::SecretKey::from_sec1_pem(pem)
        .map(SigningKey::from)
        .map_err(|_| RequesterError::csr("Private key is not a usable ECDSA P-256 key"))
}

/// Encode the subject as an RDN sequence.
fn subject_name(subject: &SubjectDescriptor) -> Result<Name> {
    let common_name: Vec<String> = subject.common_name().map(str::to_string).into_iter().collect();
    let serial_number: Vec<String> = subject
        .serial_number
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();

    let attributes: [(ObjectIdentifier, &[String]); 9] = [
        (OID_COUNTRY, &subject.country),
        (OID_PROVINCE, &subject.province),
        (OID_LOCALITY, &subject.locality),
        (OID_STREET_ADDRESS, &subject.street_address),
        (OID_POSTAL_CODE, &subject.postal_code),
        (OID_ORGANIZATION, &subject.organization),
        (OID_ORGANIZATIONAL_UNIT, &subject.organizational_unit),
        (OID_COMMON_NAME, &common_name),
        (OID_SERIAL_NUMBER, &serial_number),
    ];

    let mut rdns = Vec::new();
    for (oid, values) in attributes {
        if values.is_empty() {
            continue;
        }

        let mut set = SetOfVec::new();
        for value in values {
            let atv = AttributeTypeAndValue {
                oid,
                value: directory_string(value)?,
            };
            // Repeated values collapse into one
            if !set.iter().any(|existing| existing == &atv) {
                set.insert(atv)
                    .map_err(|e| RequesterError::csr(format!("Invalid subject: {}", e)))?;
            }
        }
        rdns.push(RelativeDistinguishedName(set));
    }

    Ok(RdnSequence(rdns))
}

/// Encode a subject value as PrintableString when possible, else UTF8String.
fn directory_string(value: &str) -> Result<Any> {
    let tag = if value.chars().all(is_printable) {
        Tag::PrintableString
    } else {
        Tag::Utf8String
    };

    Any::new(tag, value.as_bytes())
        .map_err(|e| RequesterError::csr(format!("Invalid subject value '{}': {}", value, e)))
}

fn is_printable(c: char) -> bool {
    c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
}

fn alt_names_extension(alt_names: &SubjectAltNames) -> Result<SubjectAltName> {
    let mut names = Vec::with_capacity(alt_names.dns.len() + alt_names.ip.len());

    for dns in &alt_names.dns {
        let name = Ia5String::new(dns)
            .map_err(|e| RequesterError::csr(format!("Invalid DNS name '{}': {}", dns, e)))?;
        names.push(GeneralName::DnsName(name));
    }

    for ip in &alt_names.ip {
        let octets = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        let octets = OctetString::new(octets)
            .map_err(|e| RequesterError::csr(format!("Invalid IP address '{}': {}", ip, e)))?;
        names.push(GeneralName::IpAddress(octets));
    }

    Ok(SubjectAltName(names))
}
