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

//! Types and functions to attach OAuth 2.0 bearer tokens to requests.
//!
//! [Credentials] hold an access token and the means to obtain a new one. The
//! token is refreshed on demand, before a request is sent when the token is
//! missing or expired, or when an [AuthorizedSession] receives a response
//! indicating the token was rejected.
//!
//! [AuthorizedSession]: crate::session::AuthorizedSession

use crate::Result;
use crate::errors::CredentialsError;
use crate::token::Token;
use crate::transport::HttpClient;
use http::header::{AUTHORIZATION, HeaderValue};
use http::{HeaderMap, Method};
use std::future::Future;
use std::sync::Arc;

pub mod service_account;

/// An implementation of [CredentialsProvider].
///
/// Represents credentials whose token is shared by all clones. Refreshing
/// any clone updates the token seen by every other clone.
#[derive(Clone, Debug)]
pub struct Credentials {
    inner: Arc<dyn dynamic::CredentialsProvider>,
}

impl<T> std::convert::From<T> for Credentials
where
    T: CredentialsProvider + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Credentials {
    /// Returns `true` if a token is present and has not expired.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// Obtains a new token from the token endpoint, unconditionally.
    pub async fn refresh(&self, client: &dyn HttpClient) -> Result<()> {
        self.inner.refresh(client).await
    }

    /// Sets the `Authorization` header to the current token.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        self.inner.apply(headers)
    }

    /// Refreshes the credentials if needed, then applies the token to
    /// `headers`.
    ///
    /// The method and URL of the request are informational, the default
    /// credentials use the same token for all requests.
    pub async fn before_request(
        &self,
        client: &dyn HttpClient,
        method: &Method,
        url: &str,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        if !self.valid() {
            tracing::debug!(%method, url, "credentials not valid, refreshing before the request");
            self.refresh(client).await?;
        }
        self.apply(headers)
    }
}

/// Represents a source of OAuth 2.0 access tokens.
///
/// Implement this trait to create custom credentials, or to mock the
/// credentials in tests.
pub trait CredentialsProvider: std::fmt::Debug {
    /// Returns `true` if a token is present and has not expired.
    fn valid(&self) -> bool;

    /// Obtains a new token, replacing the current token on success.
    ///
    /// On failure the current token, if any, must remain unchanged.
    fn refresh(&self, client: &dyn HttpClient) -> impl Future<Output = Result<()>> + Send;

    /// Sets the `Authorization` header to the current token.
    fn apply(&self, headers: &mut HeaderMap) -> Result<()>;
}

pub(crate) mod dynamic {
    use super::Result;
    use crate::transport::HttpClient;
    use http::HeaderMap;

    /// A dyn-compatible, crate-private version of `CredentialsProvider`.
    #[async_trait::async_trait]
    pub trait CredentialsProvider: Send + Sync + std::fmt::Debug {
        fn valid(&self) -> bool;
        async fn refresh(&self, client: &dyn HttpClient) -> Result<()>;
        fn apply(&self, headers: &mut HeaderMap) -> Result<()>;
    }

    /// The public CredentialsProvider implements the dyn-compatible CredentialsProvider.
    #[async_trait::async_trait]
    impl<T> CredentialsProvider for T
    where
        T: super::CredentialsProvider + Send + Sync,
    {
        fn valid(&self) -> bool {
            T::valid(self)
        }
        async fn refresh(&self, client: &dyn HttpClient) -> Result<()> {
            T::refresh(self, client).await
        }
        fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
            T::apply(self, headers)
        }
    }
}

/// Inserts `Authorization: Bearer <token>`, replacing any previous value.
pub(crate) fn apply_bearer(token: Option<&Token>, headers: &mut HeaderMap) -> Result<()> {
    let token = token.ok_or_else(|| CredentialsError::missing_field("token"))?;
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token))
        .map_err(CredentialsError::parsing)?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
