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

//! Most of this package is concerned with the APK Signing Block, but this
//! module reads Signature Scheme v1, aka. Signed JAR File format: the
//! PKCS#7 `META-INF/*.RSA` (or `.DSA`, `.EC`) signature block.

use apkcert_common::*;
use rasn::types::Oid;
use rasn_cms::{pkcs7_compat::SignedData, ContentInfo, SignerIdentifier};

use crate::ber;
use crate::certificate::Certificate;

const OID_PKCS7_SIGNED_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

const TAG_SEQUENCE: u8 = 0x30;
// certificates [0] IMPLICIT SET OF CertificateChoices, constructed
const TAG_CERTIFICATES: u8 = 0xa0;

fn pkcs7_error(value: rasn::error::DecodeError) -> ApkCertError {
    ApkCertError::Pkcs7ParsingFailed(value.into())
}

/// Returns the certificate of the one and only signer of a v1 signature block.
///
/// Zero or several `SignerInfo`s is an error rather than a reason to pick one.
/// The certificate is the one whose issuer and serial number match the
/// signer's; signers identified by key identifier fall back to the only
/// certificate present. The certificate keeps the exact bytes it has inside
/// the signature block.
pub fn only_signer_certificate(signature_block: &[u8]) -> Result<Certificate> {
    // jarsigner emits BER with indefinite lengths, so this can't be strict DER
    let content_info = rasn::ber::decode::<ContentInfo>(signature_block).map_err(pkcs7_error)?;
    if *content_info.content_type != *OID_PKCS7_SIGNED_DATA {
        return Err(ApkCertError::Pkcs7NotSignedData);
    }
    let signed_data =
        rasn::ber::decode::<SignedData>(content_info.content.as_bytes()).map_err(pkcs7_error)?;

    let signers = signed_data.signer_infos.to_vec();
    if signers.len() != 1 {
        return Err(ApkCertError::Pkcs7SignerCount(signers.len()));
    }

    let certificates = embedded_certificates(signature_block)?;
    let signer_certificate = match &signers[0].sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates
            .into_iter()
            .find(|cert| *cert.issuer() == id.issuer && *cert.serial_number() == id.serial_number),
        SignerIdentifier::SubjectKeyIdentifier(_) if certificates.len() == 1 => {
            certificates.into_iter().next()
        }
        SignerIdentifier::SubjectKeyIdentifier(_) => None
    };

    signer_certificate.ok_or(ApkCertError::NoCertificate)
}

/// Decodes the X.509 certificates of a `ContentInfo { SignedData }` in the
/// order they are stored, each from its own encoded bytes.
fn embedded_certificates(signature_block: &[u8]) -> Result<Vec<Certificate>> {
    // ContentInfo ::= SEQUENCE { contentType, [0] EXPLICIT SignedData }
    let content_info = ber::read_element(signature_block, 0)?;
    let Some(explicit_content) = ber::children(&content_info)?.into_iter().nth(1) else {
        return Ok(vec![]);
    };
    let Some(signed_data) = ber::children(&explicit_content)?.into_iter().next() else {
        return Ok(vec![]);
    };
    // version, digestAlgorithms and encapContentInfo come first, none tagged [0]
    let Some(certificate_set) = ber::children(&signed_data)?
        .into_iter()
        .find(|field| field.tag == TAG_CERTIFICATES)
    else {
        return Ok(vec![]);
    };

    ber::children(&certificate_set)?
        .into_iter()
        // Other CertificateChoices are context tagged
        .filter(|choice| choice.tag == TAG_SEQUENCE)
        .map(|cert| Certificate::decode_prefix(cert.raw, cert.offset))
        .collect()
}
