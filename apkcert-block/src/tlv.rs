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

use apkcert_common::*;
use byteorder::{ByteOrder, LittleEndian};

/// Bounds-checked reader over the length-prefixed structures of the APK
/// Signing Block.
///
/// Every length read from the data is compared with what is actually left
/// before anything is sliced, so a hostile length can never cause an
/// out-of-bounds read or a large allocation.
#[derive(Debug, Clone)]
pub struct TlvCursor<'a> {
    data: &'a [u8],
    pos: usize,
    // Offset of `data` inside the buffer the first cursor was created over
    base: usize
}

impl<'a> TlvCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        TlvCursor {
            data,
            pos: 0,
            base: 0
        }
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_len() == 0
    }

    /// Offset of the next byte, relative to the outermost cursor.
    pub fn offset(&self) -> u64 {
        (self.base + self.pos) as u64
    }

    /// Everything left, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn take_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining_len() {
            return Err(self.truncated(count as u64));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn take_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take_bytes(4)?))
    }

    pub fn take_u64_le(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take_bytes(8)?))
    }

    /// Reads a u32 length `L`, then the `L` bytes that follow it.
    pub fn take_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let length = self.take_u32_le()? as u64;
        if length > self.remaining_len() as u64 {
            let err = self.truncated(length);
            // Leave the cursor where it was so the error points at the prefix
            self.pos = start;
            return Err(err);
        }
        self.take_bytes(length as usize)
    }

    /// Same as [take_length_prefixed](Self::take_length_prefixed), but wraps
    /// the sub-sequence in its own cursor.
    pub fn take_length_prefixed_cursor(&mut self) -> Result<TlvCursor<'a>> {
        let base = self.base + self.pos + 4;
        let data = self.take_length_prefixed()?;
        Ok(TlvCursor { data, pos: 0, base })
    }

    /// Consumes everything left.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Fails with [ApkCertError::Corrupted] if any bytes have not been consumed.
    pub fn expect_drained(&self, reason: &'static str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApkCertError::Corrupted {
                offset: self.offset(),
                reason
            })
        }
    }

    fn truncated(&self, needed: u64) -> ApkCertError {
        ApkCertError::Truncated {
            offset: self.offset(),
            needed,
            available: self.remaining_len() as u64
        }
    }
}
