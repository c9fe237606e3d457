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

//! Thin layer over the `zip` crate for the parts of an APK that the v1
//! (signed JAR) scheme lives in.

use apkcert_common::*;
use log::debug;
use std::io::{Read, Seek};
use zip::ZipArchive;

pub const META_INF_DIR: &str = "META-INF/";

/// Upper bound for a v1 signature block. Real ones hold a few certificates
/// and are a few KiB.
pub const MAX_SIGNATURE_FILE_SIZE: u64 = 1024 * 1024;

// PKCS#7 signature block extensions, one per key algorithm
const SIGNATURE_BLOCK_EXTENSIONS: &[&str] = &["RSA", "DSA", "EC"];

/// Opens a ZIP archive from anything seekable, eg. a [std::fs::File] or a
/// `Cursor` over an in-memory APK.
pub fn open_archive<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>> {
    Ok(ZipArchive::new(reader)?)
}

/// Whether `name` is a v1 signature block, ie. `META-INF/*.{RSA,DSA,EC}`.
///
/// Matching is case sensitive, as it is for Android's own JAR verifier.
pub fn is_v1_signature_file(name: &str) -> bool {
    name.strip_prefix(META_INF_DIR)
        .and_then(|rest| rest.rsplit_once('.'))
        .is_some_and(|(_, extension)| SIGNATURE_BLOCK_EXTENSIONS.contains(&extension))
}

/// Lists every v1 signature block in the archive, in central directory order.
pub fn find_v1_signature_files<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let found: Vec<String> = archive
        .file_names()
        .filter(|name| is_v1_signature_file(name))
        .map(String::from)
        .collect();
    debug!("found {} v1 signature file(s): {:?}", found.len(), found);
    found
}

/// Reads and decompresses a single entry of at most `limit` bytes.
///
/// The declared size is not trusted; decompression stops once the limit is
/// passed and the entry is reported as [ApkCertError::EntryTooLarge].
pub fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64
) -> Result<Vec<u8>> {
    let entry = archive.by_name(name)?;
    let mut data = vec![];
    entry.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(ApkCertError::EntryTooLarge {
            name: name.to_string(),
            limit
        });
    }
    Ok(data)
}
