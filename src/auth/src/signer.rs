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

//! Signers produce the RS256 signature for JWT assertions.
//!
//! Signing is a local, CPU-only operation. Applications keeping the private
//! key in an HSM or a remote signing service can implement [SigningProvider]
//! and wrap it in a [Signer].

use crate::Result;
use std::sync::Arc;

pub mod service_account;

/// A signer for JWT assertions.
///
/// `Signer` is cheap to clone, all clones share the same key.
#[derive(Clone, Debug)]
pub struct Signer {
    inner: Arc<dyn SigningProvider>,
}

impl<T> std::convert::From<T> for Signer
where
    T: SigningProvider + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Signer {
    /// The identifier of the signing key, included as `kid` in the JWT header.
    pub fn key_id(&self) -> Option<String> {
        self.inner.key_id()
    }

    /// Signs `message` using RSASSA-PKCS1-v1_5 with SHA-256.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.inner.sign(message)
    }
}

/// Implementations produce RS256 signatures.
///
/// Errors should be reported with
/// [CredentialsError::signing](crate::errors::CredentialsError::signing).
pub trait SigningProvider: Send + Sync + std::fmt::Debug {
    fn key_id(&self) -> Option<String>;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}
