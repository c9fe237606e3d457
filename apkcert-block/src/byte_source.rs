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

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use apkcert_common::*;

/// Random access to the bytes of an APK.
///
/// Reads take `&self` so a single source can be shared between the ZIP reader
/// and the APK Signing Block locator without any locking.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes starting at `offset` and returns how many
    /// were read. Reading at or past the end returns `0`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Fills `buf` completely, failing with [ApkCertError::Truncated] if the
    /// source ends first.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if read == 0 {
                return Err(ApkCertError::Truncated {
                    offset,
                    needed: buf.len() as u64,
                    available: filled as u64
                });
            }
            filled += read;
        }
        Ok(())
    }
}

impl ByteSource for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let count = buf.len().min(self.len() - start);
        buf[..count].copy_from_slice(&self[start..start + count]);
        Ok(count)
    }
}

impl ByteSource for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

impl ByteSource for File {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        Ok(FileExt::read_at(self, buf, offset)?)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        Ok(self.seek_read(buf, offset)?)
    }
}

/// Adapts a [ByteSource] of known size to [Read] + [Seek], which is what the
/// `zip` crate wants for the v1 signature path.
pub struct SourceReader<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    size: u64,
    pos: u64
}

impl<'a, S: ByteSource + ?Sized> SourceReader<'a, S> {
    pub fn new(source: &'a S, size: u64) -> Self {
        SourceReader {
            source,
            size,
            pos: 0
        }
    }
}

impl<S: ByteSource + ?Sized> Read for SourceReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size {
            return Ok(0);
        }
        let wanted = buf.len().min((self.size - self.pos).try_into().unwrap_or(usize::MAX));
        let read = self
            .source
            .read_at(self.pos, &mut buf[..wanted])
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<S: ByteSource + ?Sized> Seek for SourceReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta)
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position"
            ));
        };
        self.pos = target;
        Ok(target)
    }
}
