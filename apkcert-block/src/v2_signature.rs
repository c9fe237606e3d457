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

// Decoded APK Signature Scheme v2 block, based on
// https://source.android.com/docs/security/features/apksigning/v2

use apkcert_common::*;

use crate::certificate::Certificate;
use crate::tlv::TlvCursor;

// Named according to the APK Signature Scheme v2 doc

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureScheme {
    pub signers: Vec<Signer>
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signer {
    pub signed_data: SignedData,
    pub signatures: Vec<SignatureEntry>,
    // SubjectPublicKeyInfo, ASN.1 DER form
    pub public_key: Vec<u8>
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedData {
    pub digests: Vec<DigestEntry>,
    pub certificates: Vec<Certificate>,
    pub additional_attributes: Vec<AttributeEntry>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub algorithm_id: u32,
    pub digest: Vec<u8>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub algorithm_id: u32,
    pub signature: Vec<u8>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    pub id: u32,
    pub value: Vec<u8>
}

/// Signature algorithm IDs used by digests and signatures.
///
/// See <https://source.android.com/docs/security/features/apksigning/v2#signature-algorithm-ids>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    RsaPssWithSha256,
    RsaPssWithSha512,
    RsaPkcs1v15WithSha256,
    RsaPkcs1v15WithSha512,
    EcdsaWithSha256,
    EcdsaWithSha512,
    DsaWithSha256,
    // Only used by the v4 scheme and fs-verity digests
    VerityRsaPkcs1v15WithSha256,
    VerityEcdsaWithSha256,
    VerityDsaWithSha256
}

impl SignatureAlgorithm {
    pub fn from_id(id: u32) -> Option<Self> {
        use SignatureAlgorithm::*;
        Some(match id {
            0x0101 => RsaPssWithSha256,
            0x0102 => RsaPssWithSha512,
            0x0103 => RsaPkcs1v15WithSha256,
            0x0104 => RsaPkcs1v15WithSha512,
            0x0201 => EcdsaWithSha256,
            0x0202 => EcdsaWithSha512,
            0x0301 => DsaWithSha256,
            0x0421 => VerityRsaPkcs1v15WithSha256,
            0x0423 => VerityEcdsaWithSha256,
            0x0425 => VerityDsaWithSha256,
            _ => return None
        })
    }

    pub fn name(&self) -> &'static str {
        use SignatureAlgorithm::*;
        match self {
            RsaPssWithSha256 => "RSASSA-PSS with SHA2-256",
            RsaPssWithSha512 => "RSASSA-PSS with SHA2-512",
            RsaPkcs1v15WithSha256 => "RSASSA-PKCS1-v1_5 with SHA2-256",
            RsaPkcs1v15WithSha512 => "RSASSA-PKCS1-v1_5 with SHA2-512",
            EcdsaWithSha256 => "ECDSA with SHA2-256",
            EcdsaWithSha512 => "ECDSA with SHA2-512",
            DsaWithSha256 => "DSA with SHA2-256",
            VerityRsaPkcs1v15WithSha256 => "RSASSA-PKCS1-v1_5 with SHA2-256 (verity)",
            VerityEcdsaWithSha256 => "ECDSA with SHA2-256 (verity)",
            VerityDsaWithSha256 => "DSA with SHA2-256 (verity)"
        }
    }
}

/// Decodes the value of the APK Signature Scheme v2 pair.
///
/// Every length-prefixed group has to be consumed exactly by its elements,
/// anything left over is reported as [ApkCertError::Corrupted].
pub fn decode_v2(payload: &[u8]) -> Result<SignatureScheme> {
    let mut cursor = TlvCursor::new(payload);
    let signers = decode_sequence(&mut cursor, "trailing bytes in signer", Signer::decode)?;
    cursor.expect_drained("trailing bytes after signers")?;
    Ok(SignatureScheme { signers })
}

impl SignatureScheme {
    pub fn first_certificate(&self) -> Option<&Certificate> {
        self.signers
            .first()
            .and_then(|signer| signer.signed_data.certificates.first())
    }
}

impl Signer {
    fn decode(cursor: &mut TlvCursor) -> Result<Signer> {
        let mut signed_data_cursor = cursor.take_length_prefixed_cursor()?;
        let signed_data = SignedData::decode(&mut signed_data_cursor)?;
        signed_data_cursor.expect_drained("trailing bytes in signed data")?;

        let signatures = decode_sequence(cursor, "trailing bytes in signature", |entry| {
            Ok(SignatureEntry {
                algorithm_id: entry.take_u32_le()?,
                signature: entry.take_length_prefixed()?.to_vec()
            })
        })?;

        let public_key = cursor.take_length_prefixed()?.to_vec();
        Ok(Signer {
            signed_data,
            signatures,
            public_key
        })
    }
}

impl SignedData {
    fn decode(cursor: &mut TlvCursor) -> Result<SignedData> {
        let digests = decode_sequence(cursor, "trailing bytes in digest", |entry| {
            Ok(DigestEntry {
                algorithm_id: entry.take_u32_le()?,
                digest: entry.take_length_prefixed()?.to_vec()
            })
        })?;

        // Each element is one encoded certificate, nothing else
        let certificates = decode_sequence(cursor, "trailing bytes in certificate", |entry| {
            let cert = Certificate::decode_prefix(entry.rest(), entry.offset())?;
            entry.take_bytes(cert.der().len())?;
            Ok(cert)
        })?;

        let additional_attributes =
            decode_sequence(cursor, "trailing bytes in additional attribute", |entry| {
                Ok(AttributeEntry {
                    id: entry.take_u32_le()?,
                    value: entry.take_length_prefixed()?.to_vec()
                })
            })?;

        Ok(SignedData {
            digests,
            certificates,
            additional_attributes
        })
    }
}

/// Reads a length-prefixed sequence of length-prefixed elements, decoding
/// each element from its own bounded cursor.
fn decode_sequence<'a, T>(
    cursor: &mut TlvCursor<'a>,
    leftover_reason: &'static str,
    mut decode: impl FnMut(&mut TlvCursor<'a>) -> Result<T>
) -> Result<Vec<T>> {
    let mut sequence = cursor.take_length_prefixed_cursor()?;
    let mut elements = vec![];
    while !sequence.is_empty() {
        let mut element = sequence.take_length_prefixed_cursor()?;
        elements.push(decode(&mut element)?);
        element.expect_drained(leftover_reason)?;
    }
    Ok(elements)
}
