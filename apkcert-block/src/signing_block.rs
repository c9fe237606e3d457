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

//! Finds the APK Signing Block at the end of an APK and splits it into its
//! ID-value pairs.
//!
//! ```text
//! u64        size of block, not counting this field
//! pairs      repeated: u64 length, u32 ID, value (length - 4 bytes)
//! u64        size of block, same as the first one
//! [u8; 16]   "APK Sig Block 42"
//! ```

use apkcert_common::*;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::byte_source::ByteSource;
use crate::tlv::TlvCursor;

pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xF05368C0;
// Pads the block to a multiple of 4096 bytes for fs-verity
pub const VERITY_PADDING_BLOCK_ID: u32 = 0x42726577;
pub const CHANNEL_BLOCK_ID: u32 = 0x71777777;
// Encrypted dependency metadata added by the Android Gradle Plugin
pub const DEPENDENCY_INFO_BLOCK_ID: u32 = 0x504B4453;
pub const SOURCE_STAMP_V1_BLOCK_ID: u32 = 0x2B09189E;
pub const SOURCE_STAMP_V2_BLOCK_ID: u32 = 0x6DFF800D;
pub const PLAY_METADATA_BLOCK_ID: u32 = 0x2146444E;

pub const DEFAULT_SCAN_WINDOW: usize = 512 * 1024;
pub const MAX_SIGNING_BLOCK_SIZE: u64 = 10 * 1024 * 1024;

// Trailing size field plus magic
const FOOTER_LEN: u64 = 8 + 16;
// Pair length plus ID
const PAIR_HEADER_LEN: usize = 8 + 4;

/// One ID-value pair from the APK Signing Block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningBlock {
    pub id: u32,
    pub payload: Vec<u8>
}

/// What to do when more than one pair carries the same scheme ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Use the first pair, which is what Android's own verifier does.
    First,
    /// Use the last pair.
    Last,
    /// Fail with [ApkCertError::DuplicateBlock].
    #[default]
    Reject
}

/// Tunables for [locate_with_options].
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    /// How many bytes from the end of the file are scanned for the magic.
    pub initial_window: usize,
    /// Declared block sizes above this are refused without being read.
    pub max_block_size: u64,
    /// Rescan with a larger window when the block does not fit in the
    /// current one, up to the whole file.
    pub grow_window: bool,
    /// How duplicate v2 scheme pairs are resolved.
    pub duplicate_v2_policy: DuplicatePolicy
}

impl Default for LocatorOptions {
    fn default() -> Self {
        LocatorOptions {
            initial_window: DEFAULT_SCAN_WINDOW,
            max_block_size: MAX_SIGNING_BLOCK_SIZE,
            grow_window: true,
            duplicate_v2_policy: DuplicatePolicy::default()
        }
    }
}

/// The IDs known to appear in the APK Signing Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    SignatureSchemeV2,
    SignatureSchemeV3,
    VerityPadding,
    Channel,
    DependencyInfo,
    SourceStampV1,
    SourceStampV2,
    PlayMetadata,
    Unknown(u32)
}

impl BlockId {
    pub fn from_id(id: u32) -> Self {
        use BlockId::*;
        match id {
            SIGNATURE_SCHEME_V2_BLOCK_ID => SignatureSchemeV2,
            SIGNATURE_SCHEME_V3_BLOCK_ID => SignatureSchemeV3,
            VERITY_PADDING_BLOCK_ID => VerityPadding,
            CHANNEL_BLOCK_ID => Channel,
            DEPENDENCY_INFO_BLOCK_ID => DependencyInfo,
            SOURCE_STAMP_V1_BLOCK_ID => SourceStampV1,
            SOURCE_STAMP_V2_BLOCK_ID => SourceStampV2,
            PLAY_METADATA_BLOCK_ID => PlayMetadata,
            other => Unknown(other)
        }
    }

    pub fn id(&self) -> u32 {
        use BlockId::*;
        match self {
            SignatureSchemeV2 => SIGNATURE_SCHEME_V2_BLOCK_ID,
            SignatureSchemeV3 => SIGNATURE_SCHEME_V3_BLOCK_ID,
            VerityPadding => VERITY_PADDING_BLOCK_ID,
            Channel => CHANNEL_BLOCK_ID,
            DependencyInfo => DEPENDENCY_INFO_BLOCK_ID,
            SourceStampV1 => SOURCE_STAMP_V1_BLOCK_ID,
            SourceStampV2 => SOURCE_STAMP_V2_BLOCK_ID,
            PlayMetadata => PLAY_METADATA_BLOCK_ID,
            Unknown(id) => *id
        }
    }

    pub fn name(&self) -> &'static str {
        use BlockId::*;
        match self {
            SignatureSchemeV2 => "APK Signature Scheme v2",
            SignatureSchemeV3 => "APK Signature Scheme v3",
            VerityPadding => "Verity padding",
            Channel => "Channel",
            DependencyInfo => "Dependency info",
            SourceStampV1 => "Source stamp v1",
            SourceStampV2 => "Source stamp v2",
            PlayMetadata => "Google Play metadata",
            Unknown(_) => "Unknown"
        }
    }
}

impl SigningBlock {
    pub fn block_id(&self) -> BlockId {
        BlockId::from_id(self.id)
    }
}

/// Locates the APK Signing Block in `source` and returns its pairs in file
/// order, using [LocatorOptions::default].
pub fn locate<S: ByteSource + ?Sized>(source: &S, size: u64) -> Result<Vec<SigningBlock>> {
    locate_with_options(source, size, &LocatorOptions::default())
}

pub fn locate_with_options<S: ByteSource + ?Sized>(
    source: &S,
    size: u64,
    options: &LocatorOptions
) -> Result<Vec<SigningBlock>> {
    let mut window = (options.initial_window as u64).min(size);
    loop {
        let (magic_offset, declared_size) = match scan_window(source, size, window, options) {
            Err(ApkCertError::WindowTooSmall {
                magic_offset,
                declared_size,
                ..
            }) => (magic_offset, declared_size),
            other => return other
        };

        if window >= size {
            // There is nothing left to read, so the block claims to start before the file does
            return Err(ApkCertError::Truncated {
                offset: 0,
                needed: declared_size.map_or(8, |declared| declared + 8),
                available: magic_offset as u64
            });
        }
        if !options.grow_window {
            return Err(ApkCertError::WindowTooSmall {
                magic_offset,
                declared_size,
                window: window as usize
            });
        }

        // Bytes needed from the end of the file so the leading size field fits
        let tail = window - magic_offset as u64;
        let needed = match declared_size {
            Some(declared) => tail + declared - 8,
            None => tail + 8
        };
        let grown = needed.max(window.saturating_mul(2)).min(size);
        debug!("APK Signing Block does not fit in {window} byte window, retrying with {grown}");
        window = grown;
    }
}

fn scan_window<S: ByteSource + ?Sized>(
    source: &S,
    size: u64,
    window_len: u64,
    options: &LocatorOptions
) -> Result<Vec<SigningBlock>> {
    let window_base = size - window_len;
    let mut window = vec![0; window_len as usize];
    source.read_exact_at(window_base, &mut window)?;

    let magic_offset = window
        .windows(APK_SIGNING_BLOCK_MAGIC.len())
        .rposition(|candidate| candidate == APK_SIGNING_BLOCK_MAGIC)
        .ok_or(ApkCertError::NotFound)?;
    if magic_offset < 8 {
        return Err(ApkCertError::WindowTooSmall {
            magic_offset,
            declared_size: None,
            window: window.len()
        });
    }

    let declared_size = LittleEndian::read_u64(&window[magic_offset - 8..magic_offset]);
    if declared_size > options.max_block_size {
        return Err(ApkCertError::SizeTooLarge {
            declared: declared_size,
            limit: options.max_block_size
        });
    }
    if declared_size < FOOTER_LEN {
        return Err(ApkCertError::Corrupted {
            offset: window_base + magic_offset as u64 - 8,
            reason: "APK Signing Block size smaller than its own footer"
        });
    }
    // The declared size counts everything after the leading size field
    let declared = declared_size as usize;
    if declared > magic_offset + 8 {
        return Err(ApkCertError::WindowTooSmall {
            magic_offset,
            declared_size: Some(declared_size),
            window: window.len()
        });
    }

    let leading_start = magic_offset + 8 - declared;
    let body_start = leading_start + 8;
    let body_end = magic_offset - 8;
    let leading_size = LittleEndian::read_u64(&window[leading_start..body_start]);
    if leading_size != declared_size {
        return Err(ApkCertError::SizeMismatch {
            offset: window_base + leading_start as u64,
            leading: leading_size,
            trailing: declared_size
        });
    }

    debug!(
        "found APK Signing Block of {declared_size} bytes at offset {}",
        window_base + leading_start as u64
    );
    parse_signing_block(&window[body_start..body_end])
}

/// Splits the body of the APK Signing Block, between the two size fields,
/// into its ID-value pairs.
pub fn parse_signing_block(body: &[u8]) -> Result<Vec<SigningBlock>> {
    let mut cursor = TlvCursor::new(body);
    let mut blocks = vec![];
    while !cursor.is_empty() {
        let offset = cursor.offset();
        if cursor.remaining_len() < PAIR_HEADER_LEN {
            return Err(ApkCertError::Corrupted {
                offset,
                reason: "not enough bytes left for an ID-value pair"
            });
        }
        let pair_length = cursor.take_u64_le()?;
        let id = cursor.take_u32_le()?;

        let payload = match pair_length {
            // Nothing but the ID, whose bytes were never counted
            0 => vec![],
            1..=3 => {
                return Err(ApkCertError::Corrupted {
                    offset,
                    reason: "ID-value pair shorter than its ID"
                })
            }
            _ => {
                let value_length = pair_length - 4;
                if value_length > cursor.remaining_len() as u64 {
                    return Err(ApkCertError::Corrupted {
                        offset,
                        reason: "ID-value pair longer than the APK Signing Block"
                    });
                }
                cursor.take_bytes(value_length as usize)?.to_vec()
            }
        };
        trace!("pair {id:#010x} with {} byte value at offset {offset}", payload.len());
        blocks.push(SigningBlock { id, payload });
    }
    Ok(blocks)
}

/// Picks the pair with the given ID, resolving duplicates with `policy`.
pub fn select_block(
    blocks: &[SigningBlock],
    id: u32,
    policy: DuplicatePolicy
) -> Result<Option<&SigningBlock>> {
    let mut matching = blocks.iter().filter(|block| block.id == id);
    let selected = match policy {
        DuplicatePolicy::First => matching.next(),
        DuplicatePolicy::Last => matching.last(),
        DuplicatePolicy::Reject => {
            let first = matching.next();
            let others = matching.count();
            if others > 0 {
                return Err(ApkCertError::DuplicateBlock {
                    id,
                    count: others + 1
                });
            }
            first
        }
    };
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_signing_block;

    const PREFIX_LEN: usize = 8192;
    // Stand-in for the Central Directory and EOCD that follow the block
    const SUFFIX: &[u8] = b"PK\x01\x02 central directory PK\x05\x06 end";

    fn sample_blocks() -> Vec<SigningBlock> {
        vec![
            SigningBlock {
                id: SIGNATURE_SCHEME_V2_BLOCK_ID,
                payload: vec![0xab; 600]
            },
            SigningBlock {
                id: VERITY_PADDING_BLOCK_ID,
                payload: vec![0xcd; 100]
            },
        ]
    }

    /// Lays out `prefix | block | suffix`, returning the file and the block's offset.
    fn apk_with(blocks: &[SigningBlock], prefix_len: usize) -> (Vec<u8>, usize) {
        let mut apk = vec![0; prefix_len];
        apk.extend(encode_signing_block(blocks).unwrap());
        apk.extend_from_slice(SUFFIX);
        (apk, prefix_len)
    }

    fn trailing_size_offset(apk: &[u8]) -> usize {
        apk.len() - SUFFIX.len() - FOOTER_LEN as usize
    }

    #[test]
    fn missing_magic_is_not_found() {
        let apk = vec![0x50u8; 4096];
        assert!(matches!(locate(&apk, apk.len() as u64), Err(ApkCertError::NotFound)));
        let empty: Vec<u8> = vec![];
        assert!(matches!(locate(&empty, 0), Err(ApkCertError::NotFound)));
    }

    #[test]
    fn recovers_pairs_in_order() {
        let blocks = sample_blocks();
        let (apk, _) = apk_with(&blocks, PREFIX_LEN);
        assert_eq!(locate(&apk, apk.len() as u64).unwrap(), blocks);
    }

    #[test]
    fn recovers_empty_and_repeated_pairs() {
        let blocks = vec![
            SigningBlock {
                id: CHANNEL_BLOCK_ID,
                payload: vec![]
            },
            SigningBlock {
                id: 0xdeadbeef,
                payload: b"one".to_vec()
            },
            SigningBlock {
                id: 0xdeadbeef,
                payload: b"two".to_vec()
            },
        ];
        let (apk, _) = apk_with(&blocks, 16);
        assert_eq!(locate(&apk, apk.len() as u64).unwrap(), blocks);
    }

    #[test]
    fn locating_twice_gives_identical_results() {
        let (apk, _) = apk_with(&sample_blocks(), PREFIX_LEN);
        let first = locate(&apk, apk.len() as u64).unwrap();
        let second = locate(&apk, apk.len() as u64).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn flipped_trailing_size_never_parses() {
        let (apk, _) = apk_with(&sample_blocks(), PREFIX_LEN);
        let size_at = trailing_size_offset(&apk);
        for bit in 0..64 {
            let mut corrupt = apk.clone();
            corrupt[size_at + bit / 8] ^= 1 << (bit % 8);
            let result = locate(&corrupt, corrupt.len() as u64);
            assert!(
                matches!(
                    result,
                    Err(ApkCertError::SizeMismatch { .. }
                        | ApkCertError::SizeTooLarge { .. }
                        | ApkCertError::Truncated { offset: 0, .. })
                ),
                "bit {bit}: {result:?}"
            );
        }
    }

    #[test]
    fn flipped_low_trailing_size_bits_are_a_mismatch() {
        let (apk, _) = apk_with(&sample_blocks(), PREFIX_LEN);
        let size_at = trailing_size_offset(&apk);
        // Higher bits move the block start before the file or past the size ceiling
        for bit in 0..12 {
            let mut corrupt = apk.clone();
            corrupt[size_at + bit / 8] ^= 1 << (bit % 8);
            let result = locate(&corrupt, corrupt.len() as u64);
            assert!(
                matches!(result, Err(ApkCertError::SizeMismatch { .. })),
                "bit {bit}: {result:?}"
            );
        }
    }

    #[test]
    fn flipped_leading_size_is_a_mismatch() {
        let (apk, block_at) = apk_with(&sample_blocks(), PREFIX_LEN);
        let mut corrupt = apk.clone();
        corrupt[block_at] ^= 0x01;
        assert!(matches!(
            locate(&corrupt, corrupt.len() as u64),
            Err(ApkCertError::SizeMismatch { offset, .. }) if offset == block_at as u64
        ));
    }

    #[test]
    fn oversized_block_is_refused() {
        let (mut apk, _) = apk_with(&sample_blocks(), 64);
        let size_at = trailing_size_offset(&apk);
        let huge = MAX_SIGNING_BLOCK_SIZE + 1;
        apk[size_at..size_at + 8].copy_from_slice(&huge.to_le_bytes());
        assert!(matches!(
            locate(&apk, apk.len() as u64),
            Err(ApkCertError::SizeTooLarge { declared, .. }) if declared == huge
        ));

        apk[size_at..size_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            locate(&apk, apk.len() as u64),
            Err(ApkCertError::SizeTooLarge { .. })
        ));
    }

    #[test]
    fn size_smaller_than_footer_is_corrupted() {
        let (mut apk, _) = apk_with(&sample_blocks(), 64);
        let size_at = trailing_size_offset(&apk);
        apk[size_at..size_at + 8].copy_from_slice(&8u64.to_le_bytes());
        assert!(matches!(
            locate(&apk, apk.len() as u64),
            Err(ApkCertError::Corrupted { .. })
        ));
    }

    #[test]
    fn block_starting_before_file_is_truncated() {
        let (mut apk, _) = apk_with(&sample_blocks(), 0);
        let size_at = trailing_size_offset(&apk);
        let declared = u64::from_le_bytes(apk[size_at..size_at + 8].try_into().unwrap());
        apk[size_at..size_at + 8].copy_from_slice(&(declared + 64).to_le_bytes());
        assert!(matches!(
            locate(&apk, apk.len() as u64),
            Err(ApkCertError::Truncated { .. })
        ));
    }

    #[test]
    fn magic_at_start_of_file_is_truncated() {
        let mut apk = APK_SIGNING_BLOCK_MAGIC.to_vec();
        apk.extend_from_slice(SUFFIX);
        assert!(matches!(
            locate(&apk, apk.len() as u64),
            Err(ApkCertError::Truncated { .. })
        ));
    }

    #[test]
    fn small_window_grows_to_fit_block() {
        let blocks = vec![SigningBlock {
            id: SIGNATURE_SCHEME_V2_BLOCK_ID,
            payload: vec![0x11; 5000]
        }];
        let (apk, _) = apk_with(&blocks, 100_000);
        let options = LocatorOptions {
            initial_window: 1024,
            ..Default::default()
        };
        assert_eq!(locate_with_options(&apk, apk.len() as u64, &options).unwrap(), blocks);
    }

    #[test]
    fn small_window_without_growth_fails() {
        let blocks = vec![SigningBlock {
            id: SIGNATURE_SCHEME_V2_BLOCK_ID,
            payload: vec![0x11; 5000]
        }];
        let (apk, _) = apk_with(&blocks, 100_000);
        let options = LocatorOptions {
            initial_window: 1024,
            grow_window: false,
            ..Default::default()
        };
        assert!(matches!(
            locate_with_options(&apk, apk.len() as u64, &options),
            Err(ApkCertError::WindowTooSmall {
                declared_size: Some(_),
                window: 1024,
                ..
            })
        ));
    }

    #[test]
    fn pair_longer_than_body_is_corrupted() {
        let mut body = vec![];
        body.extend(100u64.to_le_bytes());
        body.extend(SIGNATURE_SCHEME_V2_BLOCK_ID.to_le_bytes());
        body.extend([0u8; 10]);
        assert!(matches!(
            parse_signing_block(&body),
            Err(ApkCertError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn huge_pair_length_is_corrupted() {
        let mut body = vec![];
        body.extend(u64::MAX.to_le_bytes());
        body.extend(1u32.to_le_bytes());
        assert!(matches!(
            parse_signing_block(&body),
            Err(ApkCertError::Corrupted { .. })
        ));
    }

    #[test]
    fn trailing_garbage_in_body_is_corrupted() {
        let mut body = vec![];
        body.extend(5u64.to_le_bytes());
        body.extend(7u32.to_le_bytes());
        body.push(0x42);
        body.extend([1, 2, 3]);
        assert!(matches!(
            parse_signing_block(&body),
            Err(ApkCertError::Corrupted { offset: 13, .. })
        ));
    }

    #[test]
    fn pair_shorter_than_its_id_is_corrupted() {
        for pair_length in 1u64..=3 {
            let mut body = vec![];
            body.extend(pair_length.to_le_bytes());
            body.extend(CHANNEL_BLOCK_ID.to_le_bytes());
            body.extend([0u8; 3]);
            assert!(matches!(
                parse_signing_block(&body),
                Err(ApkCertError::Corrupted { offset: 0, .. })
            ));
        }
    }

    #[test]
    fn zero_length_pair_has_no_payload() {
        let mut body = vec![];
        body.extend(0u64.to_le_bytes());
        body.extend(CHANNEL_BLOCK_ID.to_le_bytes());
        let blocks = parse_signing_block(&body).unwrap();
        assert_eq!(
            blocks,
            vec![SigningBlock {
                id: CHANNEL_BLOCK_ID,
                payload: vec![]
            }]
        );
    }

    #[test]
    fn duplicate_policy_is_applied() {
        let blocks = vec![
            SigningBlock {
                id: SIGNATURE_SCHEME_V2_BLOCK_ID,
                payload: vec![1]
            },
            SigningBlock {
                id: SIGNATURE_SCHEME_V3_BLOCK_ID,
                payload: vec![2]
            },
            SigningBlock {
                id: SIGNATURE_SCHEME_V2_BLOCK_ID,
                payload: vec![3]
            },
        ];
        let id = SIGNATURE_SCHEME_V2_BLOCK_ID;
        let first = select_block(&blocks, id, DuplicatePolicy::First).unwrap();
        assert_eq!(first.unwrap().payload, vec![1]);
        let last = select_block(&blocks, id, DuplicatePolicy::Last).unwrap();
        assert_eq!(last.unwrap().payload, vec![3]);
        assert!(matches!(
            select_block(&blocks, id, DuplicatePolicy::Reject),
            Err(ApkCertError::DuplicateBlock { count: 2, .. })
        ));
        let v3 = select_block(&blocks, SIGNATURE_SCHEME_V3_BLOCK_ID, DuplicatePolicy::Reject);
        assert_eq!(v3.unwrap().unwrap().payload, vec![2]);
        assert!(select_block(&blocks, CHANNEL_BLOCK_ID, DuplicatePolicy::Reject)
            .unwrap()
            .is_none());
    }

    #[test]
    fn known_ids_have_names() {
        assert_eq!(BlockId::from_id(0x7109871a), BlockId::SignatureSchemeV2);
        assert_eq!(BlockId::from_id(0x2146444e).name(), "Google Play metadata");
        assert_eq!(BlockId::from_id(0x12345678), BlockId::Unknown(0x12345678));
        assert_eq!(BlockId::SourceStampV2.id(), 0x6dff800d);
    }
}
