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

//! Just enough of an ASN.1 BER tag-length-value walker to find where an
//! element starts and ends. `rasn` decodes the values; this keeps the exact
//! bytes they were decoded from, which fingerprints are computed over.

use apkcert_common::*;

const CONSTRUCTED: u8 = 0x20;
const HIGH_TAG_NUMBER: u8 = 0x1f;
const INDEFINITE_LENGTH: u8 = 0x80;
// Nested indefinite lengths recurse, so hostile input must not go arbitrarily deep
const MAX_DEPTH: usize = 32;

/// One encoded element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Element<'a> {
    /// First identifier octet: class, constructed bit and low tag number.
    pub tag: u8,
    /// Absolute offset of the element.
    pub offset: u64,
    /// The whole element, header included.
    pub raw: &'a [u8],
    /// The contents octets, without any end-of-contents marker.
    pub contents: &'a [u8],
    /// Absolute offset of the contents, for error reporting.
    contents_offset: u64
}

/// Reads the element at the start of `data`, which sits at absolute
/// `offset`. Bytes after the element are ignored.
pub(crate) fn read_element(data: &[u8], offset: u64) -> Result<Element<'_>> {
    read_element_at_depth(data, offset, 0)
}

/// Splits the contents of a constructed element into its children.
pub(crate) fn children<'a>(element: &Element<'a>) -> Result<Vec<Element<'a>>> {
    let mut children = vec![];
    let mut pos = 0;
    while pos < element.contents.len() {
        let child = read_element(
            &element.contents[pos..],
            element.contents_offset + pos as u64
        )?;
        pos += child.raw.len();
        children.push(child);
    }
    Ok(children)
}

fn read_element_at_depth(data: &[u8], offset: u64, depth: usize) -> Result<Element<'_>> {
    if depth > MAX_DEPTH {
        return Err(ApkCertError::Corrupted {
            offset,
            reason: "ASN.1 nesting too deep"
        });
    }
    let truncated = |needed: usize| ApkCertError::Truncated {
        offset,
        needed: needed as u64,
        available: data.len() as u64
    };

    let tag = *data.first().ok_or_else(|| truncated(2))?;
    let mut pos = 1;
    if tag & HIGH_TAG_NUMBER == HIGH_TAG_NUMBER {
        // Tag number continues while the top bit is set
        loop {
            let byte = *data.get(pos).ok_or_else(|| truncated(pos + 2))?;
            pos += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
    }

    let first_length = *data.get(pos).ok_or_else(|| truncated(pos + 1))?;
    pos += 1;
    let header_len = match first_length {
        INDEFINITE_LENGTH => pos,
        short if short < 0x80 => pos,
        long => pos + (long & 0x7f) as usize
    };

    if first_length == INDEFINITE_LENGTH {
        if tag & CONSTRUCTED == 0 {
            return Err(ApkCertError::Corrupted {
                offset,
                reason: "indefinite length on a primitive ASN.1 element"
            });
        }
        // Children up to a two byte end-of-contents marker
        let mut end = header_len;
        loop {
            match data.get(end..end + 2) {
                Some([0, 0]) => break,
                Some(_) => {
                    let child =
                        read_element_at_depth(&data[end..], offset + end as u64, depth + 1)?;
                    end += child.raw.len();
                }
                None => return Err(truncated(end + 2))
            }
        }
        return Ok(Element {
            tag,
            offset,
            raw: &data[..end + 2],
            contents: &data[header_len..end],
            contents_offset: offset + header_len as u64
        });
    }

    let contents_len = if first_length < 0x80 {
        first_length as usize
    } else {
        let length_bytes = data.get(pos..header_len).ok_or_else(|| truncated(header_len))?;
        if length_bytes.len() > 8 {
            return Err(ApkCertError::Corrupted {
                offset,
                reason: "ASN.1 length field wider than 64 bits"
            });
        }
        let length = length_bytes
            .iter()
            .fold(0u64, |length, byte| (length << 8) | *byte as u64);
        usize::try_from(length).map_err(|_| truncated(usize::MAX))?
    };

    let end = header_len
        .checked_add(contents_len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| truncated(header_len.saturating_add(contents_len)))?;
    Ok(Element {
        tag,
        offset,
        raw: &data[..end],
        contents: &data[header_len..end],
        contents_offset: offset + header_len as u64
    })
}
