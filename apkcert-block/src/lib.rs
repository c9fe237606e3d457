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

// APK Signing Block based on https://source.android.com/docs/security/features/apksigning/v2#apk-signing-block
// APK Signature Scheme v2 based on https://source.android.com/docs/security/features/apksigning/v2
//! Reads the signing metadata of APKs: the APK Signing Block, the APK
//! Signature Scheme v2 block inside it, and v1 (JAR) PKCS#7 signature blocks.

mod ber;
pub mod byte_source;
pub mod certificate;
pub mod encoder;
pub mod signing_block;
mod signing_types;
pub mod tlv;
pub mod v1_signature;
pub mod v2_signature;

pub use byte_source::{ByteSource, SourceReader};
pub use certificate::Certificate;
pub use encoder::encode_signing_block;
pub use signing_block::{
    locate, locate_with_options, parse_signing_block, select_block, BlockId, DuplicatePolicy,
    LocatorOptions, SigningBlock
};
pub use v1_signature::only_signer_certificate;
pub use v2_signature::{decode_v2, SignatureAlgorithm, SignatureScheme};
