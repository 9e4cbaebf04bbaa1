// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A [SigningProvider] backed by a service account private key.

use crate::Result;
use crate::errors::CredentialsError;
use crate::signer::SigningProvider;
use rustls::crypto::CryptoProvider;
use rustls::sign::Signer as RustlsSigner;
use rustls_pemfile::Item;

/// Signs JWT assertions with an RSA private key in PEM format.
///
/// The key is loaded with the default [CryptoProvider] installed in the
/// process, or with the `ring` provider if none is installed.
pub struct ServiceAccountSigner {
    key_id: Option<String>,
    signer: Box<dyn RustlsSigner>,
}

impl ServiceAccountSigner {
    /// Loads a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// key.
    ///
    /// `key_id` is usually the `private_key_id` field of the service account
    /// key file.
    pub fn from_pem<S: Into<String>>(key_id: Option<S>, private_key: &str) -> Result<Self> {
        let key_provider = CryptoProvider::get_default().map_or_else(
            || rustls::crypto::ring::default_provider().key_provider,
            |p| p.key_provider,
        );

        let item = rustls_pemfile::read_one(&mut private_key.as_bytes())
            .map_err(CredentialsError::parsing)?
            .ok_or_else(|| CredentialsError::parsing("missing PEM section in private key"))?;
        let key = match item {
            Item::Pkcs8Key(item) => key_provider.load_private_key(item.into()),
            Item::Pkcs1Key(item) => key_provider.load_private_key(item.into()),
            other => {
                return Err(CredentialsError::parsing(format!(
                    "expected a PKCS#8 or PKCS#1 RSA private key, found {other:?}"
                )));
            }
        };
        let key = key.map_err(CredentialsError::signing)?;
        let signer = key
            .choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| {
                CredentialsError::signing(
                    "the private key does not support the RSA_PKCS1_SHA256 signing scheme",
                )
            })?;

        Ok(Self {
            key_id: key_id.map(Into::into),
            signer,
        })
    }
}

impl std::fmt::Debug for ServiceAccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountSigner")
            .field("key_id", &self.key_id)
            .field("private_key", &"[censored]")
            .finish()
    }
}

impl SigningProvider for ServiceAccountSigner {
    fn key_id(&self) -> Option<String> {
        self.key_id.clone()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(message).map_err(CredentialsError::signing)
    }
}
