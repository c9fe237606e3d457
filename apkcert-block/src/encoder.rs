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

//! Serialises decoded structures back into their exact wire form. Handy for
//! building fixtures and for re-emitting a block after inspecting it.

use crate::{
    signing_block::{SigningBlock, APK_SIGNING_BLOCK_MAGIC},
    signing_types::{
        len_pfx_u32, len_pfx_u64, len_pfx_vec, ApkSigningBlockWire, IdValueWire,
        SignatureSchemeV2Wire, SignedDataWire, SignerWire, SigningBlockIdValuePair,
        SigningBlockPairs
    },
    v2_signature::{SignatureScheme, SignedData, Signer}
};
use apkcert_common::*;
use deku::DekuContainerWrite;

/// Builds a complete APK Signing Block, magic included, holding `blocks` in
/// the given order.
pub fn encode_signing_block(blocks: &[SigningBlock]) -> Result<Vec<u8>> {
    let pairs = SigningBlockPairs {
        pairs: blocks
            .iter()
            .map(|block| {
                len_pfx_u64(SigningBlockIdValuePair {
                    id: block.id,
                    value: block.payload.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    let pairs_length = pairs.to_bytes()?.len();
    // Plus size_of_self_counted plus magic
    let sig_block_size = (pairs_length + 8 + 16) as u64;

    let wire = ApkSigningBlockWire {
        size_of_self_not_counted: sig_block_size,
        pairs,
        size_of_self_counted: sig_block_size,
        magic: *APK_SIGNING_BLOCK_MAGIC
    };
    Ok(wire.to_bytes()?)
}

impl SignatureScheme {
    /// Serialises the scheme into the value of an APK Signature Scheme v2 pair.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let signers = self
            .signers
            .iter()
            .map(SignerWire::from_signer)
            .collect::<Result<Vec<_>>>()?;
        let wire = SignatureSchemeV2Wire {
            signers: len_pfx_vec(signers)?
        };
        Ok(wire.to_bytes()?)
    }
}

impl SignerWire {
    fn from_signer(signer: &Signer) -> Result<SignerWire> {
        Ok(SignerWire {
            signed_data: len_pfx_u32(SignedDataWire::from_signed_data(&signer.signed_data)?)?,
            signatures: len_pfx_vec(
                signer
                    .signatures
                    .iter()
                    .map(|s| id_value(s.algorithm_id, &s.signature))
                    .collect::<Result<Vec<_>>>()?
            )?,
            public_key: len_pfx_u32(signer.public_key.clone())?
        })
    }
}

impl SignedDataWire {
    fn from_signed_data(signed_data: &SignedData) -> Result<SignedDataWire> {
        Ok(SignedDataWire {
            digests: len_pfx_vec(
                signed_data
                    .digests
                    .iter()
                    .map(|d| id_value(d.algorithm_id, &d.digest))
                    .collect::<Result<Vec<_>>>()?
            )?,
            certificates: len_pfx_vec(
                signed_data
                    .certificates
                    .iter()
                    .map(|cert| cert.der().to_vec())
                    .collect()
            )?,
            additional_attributes: len_pfx_vec(
                signed_data
                    .additional_attributes
                    .iter()
                    .map(|a| id_value(a.id, &a.value))
                    .collect::<Result<Vec<_>>>()?
            )?
        })
    }
}

fn id_value(id: u32, value: &[u8]) -> Result<IdValueWire> {
    Ok(IdValueWire {
        id,
        value: len_pfx_u32(value.to_vec())?
    })
}
