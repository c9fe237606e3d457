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

// Wire layout of the APK Signing Block, used when serialising
use apkcert_common::*;
use deku::prelude::*;

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct ApkSigningBlockWire {
    // Size of this structure MINUS this field!
    // This field appears twice, the 'minus' is only for one of them.
    // So if the structure is 128 bytes, this reads 120, NOT 112.
    #[deku(endian = "little")]
    pub size_of_self_not_counted: u64,
    pub pairs: SigningBlockPairs,
    #[deku(endian = "little")]
    pub size_of_self_counted: u64,
    pub magic: [u8; 16]
}

// This is in its own block so that we can determine its size before serialising its parent
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockPairs {
    pub pairs: Vec<U64LengthPrefixed<SigningBlockIdValuePair>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockIdValuePair {
    #[deku(endian = "little")]
    pub id: u32,
    pub value: Vec<u8>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SignatureSchemeV2Wire {
    pub signers: U32LengthPrefixed<Vec<U32LengthPrefixed<SignerWire>>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SignerWire {
    pub signed_data: U32LengthPrefixed<SignedDataWire>,
    pub signatures: U32LengthPrefixed<Vec<U32LengthPrefixed<IdValueWire>>>,
    // SubjectPublicKeyInfo, ASN.1 DER form
    pub public_key: U32LengthPrefixed<Vec<u8>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SignedDataWire {
    pub digests: U32LengthPrefixed<Vec<U32LengthPrefixed<IdValueWire>>>,
    // Array of X.509 Certificates (ASN.1 DER form) as bytes
    pub certificates: U32LengthPrefixed<Vec<U32LengthPrefixed<Vec<u8>>>>,
    pub additional_attributes: U32LengthPrefixed<Vec<U32LengthPrefixed<IdValueWire>>>
}

// Digests, signatures and additional attributes all share this shape
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct IdValueWire {
    #[deku(endian = "little")]
    pub id: u32,
    pub value: U32LengthPrefixed<Vec<u8>>
}

// Helper structures

// Outer APK Signing Block structures use u64 lengths
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct U64LengthPrefixed<T: DekuWriter> {
    #[deku(endian = "little")]
    pub length: u64,
    pub value: T
}
// The "Integrity-protected contents" block uses u32 lengths
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct U32LengthPrefixed<T: DekuWriter> {
    #[deku(endian = "little")]
    pub length: u32,
    pub value: T
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct RawWrapper<T: DekuWriter> {
    pub value: T
}

fn serialised_len<T: DekuWriter + Clone>(thing: &T) -> Result<usize> {
    let wrap = RawWrapper {
        value: thing.clone()
    };
    Ok(wrap.to_bytes()?.len())
}

// Constructs length-prefixed things
pub fn len_pfx_u32<T: DekuWriter + Clone>(thing: T) -> Result<U32LengthPrefixed<T>> {
    Ok(U32LengthPrefixed {
        length: u32_length(serialised_len(&thing)?)?,
        value: thing
    })
}

pub fn len_pfx_u64<T: DekuWriter + Clone>(thing: T) -> Result<U64LengthPrefixed<T>> {
    Ok(U64LengthPrefixed {
        length: serialised_len(&thing)? as u64,
        value: thing
    })
}

// u32 prefixes cap each group at 4 GiB - 1
fn u32_length(length: usize) -> Result<u32> {
    u32::try_from(length).map_err(|_| ApkCertError::SizeTooLarge {
        declared: length as u64,
        limit: u32::MAX as u64
    })
}


/// Wraps each element in its own u32 length prefix, then the whole list.
pub fn len_pfx_vec<T: DekuWriter + Clone>(
    things: Vec<T>
) -> Result<U32LengthPrefixed<Vec<U32LengthPrefixed<T>>>> {
    let prefixed = things
        .into_iter()
        .map(len_pfx_u32)
        .collect::<Result<Vec<_>>>()?;
    len_pfx_u32(prefixed)
}
