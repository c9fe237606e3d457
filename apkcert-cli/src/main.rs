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

use apkcert_api::{first_signer_certificate, locate, ApkCertError, Result};
use dump::describe_signing_block;
use std::env;
use std::fs::File;

pub mod dump;

const USAGE: &str = "Usage: apkcert <fingerprint|cert|dump> <apk>";

/// Prints who signed an APK.
///
/// ```
/// $ apkcert fingerprint app.apk
/// 3f2a...
/// $ apkcert cert app.apk > signer.pem
/// $ apkcert dump app.apk
/// ```
///
/// Set `RUST_LOG=debug` to see which signature scheme was used.
fn main() -> Result<()> {
    env_logger::init();

    let command = env::args()
        .nth(1)
        .ok_or(ApkCertError::Cli(USAGE.into()))?;
    let apk_path = env::args()
        .nth(2)
        .ok_or(ApkCertError::Cli("APK path not provided".into()))?;

    let apk = File::open(&apk_path)?;
    let size = apk.metadata()?.len();
    log::debug!("reading {apk_path} ({size} bytes)");

    match command.as_str() {
        "fingerprint" => {
            let cert = first_signer_certificate(&apk, size)?;
            println!("{}", cert.sha256_fingerprint());
        }
        "cert" => {
            let cert = first_signer_certificate(&apk, size)?;
            print!("{}", cert.to_pem());
        }
        "dump" => {
            let blocks = locate(&apk, size)?;
            print!("{}", describe_signing_block(&blocks)?);
        }
        other => {
            return Err(ApkCertError::Cli(format!(
                "Unknown command {other:?}. {USAGE}"
            )))
        }
    }

    Ok(())
}
