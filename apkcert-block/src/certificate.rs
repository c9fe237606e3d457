// Copyright 2024 Google LLC
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

use apkcert_common::*;
use rasn::types::Integer;
use rasn_pkix::Name;
use sha2::{Digest, Sha256};

use crate::ber;

/// An X.509 signing certificate together with the bytes it was encoded as.
///
/// Fingerprints are computed over [der](Certificate::der), so they match what
/// `apksigner`, `keytool` and Google Play Console show. Those bytes are kept
/// verbatim even when the encoding is BER rather than strict DER, as some
/// older signing certificates are.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    der: Vec<u8>,
    parsed: rasn_pkix::Certificate
}

impl Certificate {
    /// Decodes an X.509 certificate that makes up all of `der`.
    ///
    /// Bytes after the certificate are [ApkCertError::Corrupted].
    pub fn from_der(der: &[u8]) -> Result<Certificate> {
        let cert = Certificate::decode_prefix(der, 0)?;
        if cert.der.len() != der.len() {
            return Err(ApkCertError::Corrupted {
                offset: cert.der.len() as u64,
                reason: "trailing bytes after certificate"
            });
        }
        Ok(cert)
    }

    /// Decodes the certificate at the start of `data`, which sits at absolute
    /// `offset`, keeping only its own bytes.
    pub(crate) fn decode_prefix(data: &[u8], offset: u64) -> Result<Certificate> {
        let parsed = rasn::ber::decode::<rasn_pkix::Certificate>(data)?;
        let element = ber::read_element(data, offset)?;
        Ok(Certificate {
            der: element.raw.to_vec(),
            parsed
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn parsed(&self) -> &rasn_pkix::Certificate {
        &self.parsed
    }

    pub fn subject(&self) -> &Name {
        &self.parsed.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.parsed.tbs_certificate.issuer
    }

    pub fn serial_number(&self) -> &Integer {
        &self.parsed.tbs_certificate.serial_number
    }

    /// SHA-256 of the encoded certificate as lowercase hex.
    pub fn sha256_fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }

    /// The certificate as a `-----BEGIN CERTIFICATE-----` block.
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.der.clone()))
    }
}
