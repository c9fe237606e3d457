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

use std::{fmt, io, rc::Rc};

use deku::prelude::*;
use zip::result::ZipError;

/// Common error type making it easier to share `Result`s between apkcert crates.
///
/// In general designed to avoid needing utilities like `map_err`. Structural
/// errors carry the offsets and sizes involved so corrupt files can be
/// diagnosed without a hex editor.
#[derive(Debug, Clone)]
pub enum ApkCertError {
    /// apkcert-cli encountered an error while processing something specific
    /// to the command line implementation, such as a missing argument.
    Cli(String),
    /// The `APK Sig Block 42` magic does not occur anywhere in the scanned
    /// tail of the file. Callers wanting the v1 path should treat this as
    /// "no v2/v3 signature" rather than as corruption.
    NotFound,
    /// The magic was found, but the scan window does not reach back far
    /// enough to hold the size fields or the start of the block.
    WindowTooSmall {
        /// Offset of the magic inside the window.
        magic_offset: usize,
        /// Block size declared in front of the magic, if it could be read.
        declared_size: Option<u64>,
        /// Length of the window that was scanned.
        window: usize
    },
    /// The declared APK Signing Block size is above the safety ceiling.
    /// Nothing of that size was allocated.
    SizeTooLarge { declared: u64, limit: u64 },
    /// The leading and trailing copies of the block size disagree.
    SizeMismatch {
        /// Absolute offset of the leading size field.
        offset: u64,
        leading: u64,
        trailing: u64
    },
    /// A record or group is structurally inconsistent, eg. bytes are left
    /// over once all of its elements were decoded.
    Corrupted {
        /// Offset of the offending bytes, absolute within the buffer that was
        /// being decoded.
        offset: u64,
        reason: &'static str
    },
    /// A declared length asks for more bytes than are available.
    Truncated {
        offset: u64,
        needed: u64,
        available: u64
    },
    /// A certificate's DER bytes could not be decoded as X.509.
    InvalidCertificate(Rc<rasn::error::DecodeError>),
    /// A v1 signature file is not a PKCS#7 `SignedData` structure.
    Pkcs7ParsingFailed(Rc<rasn::error::DecodeError>),
    /// The PKCS#7 `ContentInfo` wraps something other than `SignedData`.
    Pkcs7NotSignedData,
    /// The PKCS#7 structure must contain exactly one signer.
    Pkcs7SignerCount(usize),
    /// More than one `META-INF/*.{RSA,DSA,EC}` entry exists in the archive.
    AmbiguousSignature(Vec<String>),
    /// The signature container is well formed, but no signer certificate
    /// could be found in it.
    NoCertificate,
    /// Only a signature scheme that this library cannot decode is present.
    UnsupportedScheme(u32),
    /// Several outer records share an ID that must be unique.
    DuplicateBlock { id: u32, count: usize },
    /// An archive entry inflates to more than the given number of bytes.
    EntryTooLarge { name: String, limit: u64 },
    /// Reading from the underlying file failed.
    FileIoError(Rc<io::Error>),
    /// `apkcert-zip` failed to read the archive.
    ZipReadingFailed(Rc<ZipError>),
    /// Serialising an APK Signing Block failed. See [DekuError].
    ByteSerialisationFailed(DekuError)
}

/// Result type where the error is always [ApkCertError].
pub type Result<T> = std::result::Result<T, ApkCertError>;

impl fmt::Display for ApkCertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ApkCertError::*;
        match self {
            Cli(message) => write!(f, "{message}"),
            NotFound => write!(f, "APK Signing Block not found"),
            WindowTooSmall {
                magic_offset,
                declared_size,
                window
            } => write!(
                f,
                "scan window of {window} bytes too small (magic at {magic_offset}, declared size {declared_size:?})"
            ),
            SizeTooLarge { declared, limit } => write!(
                f,
                "APK Signing Block declares {declared} bytes, refusing more than {limit}"
            ),
            SizeMismatch {
                offset,
                leading,
                trailing
            } => write!(
                f,
                "APK Signing Block size mismatch at offset {offset}: leading {leading}, trailing {trailing}"
            ),
            Corrupted { offset, reason } => write!(f, "corrupted data at offset {offset}: {reason}"),
            Truncated {
                offset,
                needed,
                available
            } => write!(
                f,
                "truncated data at offset {offset}: needed {needed} bytes, {available} available"
            ),
            InvalidCertificate(e) => write!(f, "invalid X.509 certificate: {e}"),
            Pkcs7ParsingFailed(e) => write!(f, "invalid PKCS#7 signature file: {e}"),
            Pkcs7NotSignedData => write!(f, "PKCS#7 content is not SignedData"),
            Pkcs7SignerCount(count) => {
                write!(f, "expected exactly one PKCS#7 signer, found {count}")
            }
            AmbiguousSignature(names) => {
                write!(f, "multiple v1 signature files found: {}", names.join(", "))
            }
            NoCertificate => write!(f, "signature does not contain a certificate"),
            UnsupportedScheme(id) => write!(f, "unsupported signature scheme block {id:#010x}"),
            DuplicateBlock { id, count } => {
                write!(f, "block {id:#010x} occurs {count} times in the APK Signing Block")
            }
            EntryTooLarge { name, limit } => {
                write!(f, "{name} is larger than {limit} bytes")
            }
            FileIoError(e) => write!(f, "I/O error: {e}"),
            ZipReadingFailed(e) => write!(f, "ZIP error: {e}"),
            ByteSerialisationFailed(e) => write!(f, "serialisation failed: {e}")
        }
    }
}

impl std::error::Error for ApkCertError {}

// Automatic conversion from other types of error to ApkCertError makes the rest of the code cleaner
impl From<io::Error> for ApkCertError {
    fn from(value: io::Error) -> Self {
        ApkCertError::FileIoError(value.into())
    }
}

impl From<DekuError> for ApkCertError {
    fn from(value: DekuError) -> Self {
        ApkCertError::ByteSerialisationFailed(value)
    }
}

impl From<ZipError> for ApkCertError {
    fn from(value: ZipError) -> Self {
        ApkCertError::ZipReadingFailed(value.into())
    }
}

impl From<rasn::error::DecodeError> for ApkCertError {
    fn from(value: rasn::error::DecodeError) -> Self {
        ApkCertError::InvalidCertificate(value.into())
    }
}
