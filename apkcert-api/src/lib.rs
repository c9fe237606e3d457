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

//! # apkcert API
//!
//! This crate exposes the main public API through which other projects can
//! find out who signed an APK.
//!
//! ## Fingerprinting an APK
//!
//! The following reads the signing certificate of an APK on disk and prints
//! the same SHA-256 fingerprint that `apksigner verify --print-certs` shows.
//!
//! ```no_run
//! use apkcert_api::sha256_fingerprint;
//!
//! let apk = std::fs::File::open("app.apk")?;
//! let size = apk.metadata()?.len();
//! println!("{}", sha256_fingerprint(&apk, size)?);
//! # Ok::<(), apkcert_api::ApkCertError>(())
//! ```
//!
//! ## Looking inside the APK Signing Block
//!
//! ```no_run
//! use apkcert_api::{decode_v2, find_v2_block, locate, DuplicatePolicy};
//!
//! let apk = std::fs::read("app.apk")?;
//! let blocks = locate(&apk, apk.len() as u64)?;
//! if let Some(v2) = find_v2_block(&blocks, DuplicatePolicy::First)? {
//!     let scheme = decode_v2(&v2.payload)?;
//!     println!("{} signer(s)", scheme.signers.len());
//! }
//! # Ok::<(), apkcert_api::ApkCertError>(())
//! ```

use apkcert_block::signing_block::{SIGNATURE_SCHEME_V2_BLOCK_ID, SIGNATURE_SCHEME_V3_BLOCK_ID};
use log::debug;

pub use apkcert_block::{
    decode_v2, encode_signing_block, locate, locate_with_options, only_signer_certificate,
    select_block, BlockId, ByteSource, Certificate, DuplicatePolicy, LocatorOptions,
    SignatureAlgorithm, SignatureScheme, SigningBlock, SourceReader
};
pub use apkcert_common::{ApkCertError, Result};

/// Returns the certificate of the first signer of an APK (or any signed JAR).
///
/// Signature schemes are tried in this order:
///
///  - v1: a single `META-INF/*.{RSA,DSA,EC}` PKCS#7 block. Several of them
///    is reported as [ApkCertError::AmbiguousSignature] instead of guessing.
///  - v2: the first certificate of the first signer in the APK Signature
///    Scheme v2 block.
///  - v3: recognised, but reported as [ApkCertError::UnsupportedScheme].
///
/// An APK with no signature at all fails with [ApkCertError::NotFound].
pub fn first_signer_certificate<S: ByteSource + ?Sized>(
    source: &S,
    size: u64
) -> Result<Certificate> {
    first_signer_certificate_with_options(source, size, &LocatorOptions::default())
}

pub fn first_signer_certificate_with_options<S: ByteSource + ?Sized>(
    source: &S,
    size: u64,
    options: &LocatorOptions
) -> Result<Certificate> {
    let mut archive = apkcert_zip::open_archive(SourceReader::new(source, size))?;
    let mut v1_files = apkcert_zip::find_v1_signature_files(&archive);
    if v1_files.len() > 1 {
        return Err(ApkCertError::AmbiguousSignature(v1_files));
    }
    if let Some(name) = v1_files.pop() {
        debug!("using v1 signature from {name}");
        let signature_block =
            apkcert_zip::read_entry(&mut archive, &name, apkcert_zip::MAX_SIGNATURE_FILE_SIZE)?;
        return only_signer_certificate(&signature_block);
    }

    let blocks = locate_with_options(source, size, options)?;
    let Some(v2) = find_v2_block(&blocks, options.duplicate_v2_policy)? else {
        if blocks.iter().any(|b| b.id == SIGNATURE_SCHEME_V3_BLOCK_ID) {
            return Err(ApkCertError::UnsupportedScheme(SIGNATURE_SCHEME_V3_BLOCK_ID));
        }
        return Err(ApkCertError::NoCertificate);
    };

    debug!("using APK Signature Scheme v2 block of {} bytes", v2.payload.len());
    let scheme = decode_v2(&v2.payload)?;
    scheme
        .first_certificate()
        .cloned()
        .ok_or(ApkCertError::NoCertificate)
}

/// SHA-256 of the first signer's certificate (see [first_signer_certificate])
/// as lowercase hex.
pub fn sha256_fingerprint<S: ByteSource + ?Sized>(source: &S, size: u64) -> Result<String> {
    Ok(first_signer_certificate(source, size)?.sha256_fingerprint())
}

/// Finds the APK Signature Scheme v2 pair among the pairs of an APK Signing
/// Block.
pub fn find_v2_block(
    blocks: &[SigningBlock],
    policy: DuplicatePolicy
) -> Result<Option<&SigningBlock>> {
    select_block(blocks, SIGNATURE_SCHEME_V2_BLOCK_ID, policy)
}
