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

use apkcert_api::{decode_v2, BlockId, Result, SignatureAlgorithm, SigningBlock};
use std::fmt::Write;

fn algorithm_name(id: u32) -> String {
    SignatureAlgorithm::from_id(id)
        .map(|algorithm| algorithm.name().to_string())
        .unwrap_or_else(|| format!("unknown algorithm {id:#06x}"))
}

/// Human readable listing of the pairs of an APK Signing Block, with the
/// v2 scheme pair expanded.
pub fn describe_signing_block(blocks: &[SigningBlock]) -> Result<String> {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "APK Signing Block with {} pair(s)", blocks.len());
    for block in blocks {
        let _ = writeln!(
            out,
            "  {:#010x} {}: {} bytes",
            block.id,
            block.block_id().name(),
            block.payload.len()
        );
        if block.block_id() == BlockId::SignatureSchemeV2 {
            describe_v2(&mut out, &block.payload)?;
        }
    }
    Ok(out)
}

fn describe_v2(out: &mut String, payload: &[u8]) -> Result<()> {
    let scheme = decode_v2(payload)?;
    for (i, signer) in scheme.signers.iter().enumerate() {
        let _ = writeln!(out, "    signer #{}", i + 1);
        for digest in &signer.signed_data.digests {
            let _ = writeln!(
                out,
                "      digest: {} ({} bytes)",
                algorithm_name(digest.algorithm_id),
                digest.digest.len()
            );
        }
        for cert in &signer.signed_data.certificates {
            let _ = writeln!(out, "      certificate SHA-256: {}", cert.sha256_fingerprint());
            let _ = writeln!(out, "        subject: {:?}", cert.subject());
        }
        for attribute in &signer.signed_data.additional_attributes {
            let _ = writeln!(
                out,
                "      attribute {:#010x}: {} bytes",
                attribute.id,
                attribute.value.len()
            );
        }
        for signature in &signer.signatures {
            let _ = writeln!(
                out,
                "      signature: {} ({} bytes)",
                algorithm_name(signature.algorithm_id),
                signature.signature.len()
            );
        }
        let _ = writeln!(out, "      public key: {} bytes", signer.public_key.len());
    }
    Ok(())
}
