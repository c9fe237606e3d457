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

//! Builds signed APKs in memory for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use apkcert_api::{encode_signing_block, SignatureScheme, SigningBlock};
use apkcert_block::v2_signature::{DigestEntry, SignatureEntry, SignedData, Signer};
use apkcert_block::Certificate;
use rasn::types::Integer::Primitive;
use rasn::types::Oid;
use rasn_cms::algorithms::RSA;
use rasn_cms::{
    pkcs7_compat::SignedData as Pkcs7SignedData, CertificateChoices, ContentInfo,
    IssuerAndSerialNumber, SignerIdentifier, SignerInfo
};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

pub const EOCD_MAGIC: &[u8; 4] = &[0x50, 0x4B, 0x05, 0x06];

const OID_SHA256: &Oid =
    rasn::types::Oid::JOINT_ISO_ITU_T_COUNTRY_US_ORGANIZATION_GOV_CSOR_NIST_ALGORITHMS_HASH_SHA256;
const OID_PKCS7_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
const OID_PKCS7_SIGNED_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

/// Self-signs a throwaway certificate, returning it in ASN.1 DER form.
pub fn self_signed_der(common_name: &str) -> Vec<u8> {
    let key_pair = KeyPair::generate().unwrap();
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name);
    let mut cert_params = CertificateParams::new(vec![]).unwrap();
    cert_params.distinguished_name = distinguished_name;
    cert_params.self_signed(&key_pair).unwrap().der().to_vec()
}

/// Zips `files` the way an unsigned APK would be laid out.
pub fn zip_files(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(vec![]));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_alignment(4);
    for (path, data) in files {
        zip.start_file(*path, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Inserts an encoded APK Signing Block in front of the Central Directory and
/// points the End of Central Directory at its new location.
pub fn insert_signing_block(zip_buf: &[u8], signing_block: &[u8]) -> Vec<u8> {
    let eocd_start = (0..=(zip_buf.len() - 4))
        .rev()
        .find(|i| &zip_buf[*i..*i + 4] == EOCD_MAGIC)
        .unwrap();
    let cd_start =
        u32::from_le_bytes(zip_buf[eocd_start + 16..eocd_start + 20].try_into().unwrap()) as usize;

    let mut apk = vec![];
    apk.extend(&zip_buf[..cd_start]);
    apk.extend(signing_block);
    apk.extend(&zip_buf[cd_start..]);

    let new_eocd_start = eocd_start + signing_block.len();
    let new_cd_start = (cd_start + signing_block.len()) as u32;
    apk[new_eocd_start + 16..new_eocd_start + 20].copy_from_slice(&new_cd_start.to_le_bytes());
    apk
}

/// One signer, one SHA-256 digest, the given certificates, no additional
/// attributes, one signature and a placeholder public key.
pub fn v2_scheme(cert_ders: &[&[u8]]) -> SignatureScheme {
    SignatureScheme {
        signers: vec![Signer {
            signed_data: SignedData {
                digests: vec![DigestEntry {
                    algorithm_id: 0x0103,
                    digest: vec![0x5a; 32]
                }],
                certificates: cert_ders
                    .iter()
                    .map(|der| Certificate::from_der(der).unwrap())
                    .collect(),
                additional_attributes: vec![]
            },
            signatures: vec![SignatureEntry {
                algorithm_id: 0x0103,
                signature: vec![0x77; 256]
            }],
            public_key: vec![0x42; 32]
        }]
    }
}

/// A minimal APK signed only with the pairs in `blocks`.
pub fn apk_with_blocks(blocks: &[SigningBlock]) -> Vec<u8> {
    let zip = zip_files(&[
        ("AndroidManifest.xml", b"<manifest/>"),
        ("classes.dex", b"dex\n035\0")
    ]);
    insert_signing_block(&zip, &encode_signing_block(blocks).unwrap())
}

/// A detached PKCS#7 signature block over nothing in particular, carrying
/// `cert_der` and one signer that refers to it.
pub fn pkcs7_block(cert_der: &[u8]) -> Vec<u8> {
    let cert: rasn_pkix::Certificate = rasn::der::decode(cert_der).unwrap();

    let signer_info = SignerInfo {
        version: Primitive(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone()
        }),
        digest_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None
        },
        signed_attrs: None,
        signature_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: RSA.into(),
            parameters: None
        },
        signature: vec![0x5a; 256].into(),
        unsigned_attrs: None
    };

    let signed_data = Pkcs7SignedData {
        version: Primitive(1),
        digest_algorithms: vec![rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None
        }]
        .into(),
        encap_content_info: rasn_cms::pkcs7_compat::EncapsulatedContentInfo {
            content_type: OID_PKCS7_DATA.into(),
            content: None
        },
        certificates: Some(vec![CertificateChoices::Certificate(Box::new(cert))].into()),
        crls: None,
        signer_infos: vec![signer_info].into()
    };

    let wrapper = ContentInfo {
        content_type: OID_PKCS7_SIGNED_DATA.into(),
        content: rasn::types::Any::new(rasn::der::encode(&signed_data).unwrap())
    };
    rasn::der::encode(&wrapper).unwrap()
}
