// Copyright 2025 Google LLC
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

//! An HTTP session that attaches credentials to every request.
//!
//! [AuthorizedSession] wraps an [HttpClient]. Before each request it asks the
//! [Credentials] to refresh (if needed) and to set the `Authorization` header.
//! If the server rejects the request with one of the configured status codes,
//! the session forces a refresh and sends the request again, up to a fixed
//! number of times.
//!
//! Example:
//!
//! ```no_run
//! # use google_cloud_auth_session::credentials::{Credentials, service_account};
//! # use google_cloud_auth_session::session::AuthorizedSession;
//! # use google_cloud_auth_session::transport::RequestOptions;
//! # use http::Method;
//! # tokio_test::block_on(async {
//! let credentials = service_account::from_file("/path/to/key.json")?
//!     .with_scopes(["https://www.googleapis.com/auth/cloud-platform"]);
//! let session = AuthorizedSession::builder(Credentials::from(credentials)).build();
//! let response = session
//!     .request(
//!         Method::GET,
//!         "https://storage.googleapis.com/storage/v1/b?project=my-project",
//!         None,
//!         None,
//!         RequestOptions::default(),
//!     )
//!     .await?;
//! println!("status = {}", response.status());
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```

use crate::Result;
use crate::credentials::Credentials;
use crate::http::ReqwestClient;
use crate::transport::{HttpClient, Request, RequestOptions, Response};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;

/// The default number of times a request is retried after refreshing the
/// credentials.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 2;

/// The status codes that trigger a refresh by default.
pub const DEFAULT_REFRESH_STATUS_CODES: [StatusCode; 1] = [StatusCode::UNAUTHORIZED];

/// A builder for [AuthorizedSession].
#[derive(Debug)]
pub struct Builder {
    credentials: Credentials,
    client: Option<Arc<dyn HttpClient>>,
    refresh_status_codes: HashSet<StatusCode>,
    max_refresh_attempts: u32,
}

impl Builder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            client: None,
            refresh_status_codes: HashSet::from(DEFAULT_REFRESH_STATUS_CODES),
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
        }
    }

    /// Sets the status codes that indicate the credentials were rejected.
    pub fn with_refresh_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        self.refresh_status_codes = codes.into_iter().collect();
        self
    }

    /// Sets how many times a request is sent again after a refresh.
    ///
    /// With `0` the session never refreshes because of a response status.
    pub fn with_max_refresh_attempts(mut self, attempts: u32) -> Self {
        self.max_refresh_attempts = attempts;
        self
    }

    /// Sets the underlying HTTP client. Defaults to a [ReqwestClient].
    pub fn with_http_client<T>(mut self, client: T) -> Self
    where
        T: HttpClient + 'static,
    {
        self.client = Some(Arc::new(client));
        self
    }

    pub fn build(self) -> AuthorizedSession {
        AuthorizedSession {
            client: self
                .client
                .unwrap_or_else(|| Arc::new(ReqwestClient::new())),
            credentials: self.credentials,
            refresh_status_codes: self.refresh_status_codes,
            max_refresh_attempts: self.max_refresh_attempts,
        }
    }
}

/// An HTTP session authorized by [Credentials].
///
/// The session is cheap to clone, and may be used by many tasks at the same
/// time. All clones share the credentials and the underlying client.
#[derive(Clone, Debug)]
pub struct AuthorizedSession {
    client: Arc<dyn HttpClient>,
    credentials: Credentials,
    refresh_status_codes: HashSet<StatusCode>,
    max_refresh_attempts: u32,
}

impl AuthorizedSession {
    pub fn builder(credentials: Credentials) -> Builder {
        Builder::new(credentials)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn refresh_status_codes(&self) -> &HashSet<StatusCode> {
        &self.refresh_status_codes
    }

    pub fn max_refresh_attempts(&self) -> u32 {
        self.max_refresh_attempts
    }

    /// Sends an authorized request.
    ///
    /// `headers` are never modified, each attempt starts from a copy.
    ///
    /// Returns the last response received, even if its status indicates an
    /// error. Errors from the transport, or from refreshing the credentials,
    /// are returned immediately without retrying.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        headers: Option<&HeaderMap>,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut attempt = 0_u32;
        loop {
            let mut request_headers = headers.cloned().unwrap_or_default();
            self.credentials
                .before_request(self.client.as_ref(), &method, url, &mut request_headers)
                .await?;

            let request = Request {
                method: method.clone(),
                url: url.to_string(),
                headers: request_headers,
                body: body.clone(),
                options: options.clone(),
            };
            let response = self.client.request(request).await?;

            let status = response.status();
            if !self.refresh_status_codes.contains(&status) || attempt >= self.max_refresh_attempts
            {
                return Ok(response);
            }
            attempt += 1;
            tracing::info!(
                status = status.as_u16(),
                attempt,
                max_attempts = self.max_refresh_attempts,
                "refreshing credentials due to a {status} response"
            );
            self.credentials.refresh(self.client.as_ref()).await?;
        }
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::GET, url, None, None, RequestOptions::default())
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Bytes,
    ) -> Result<Response> {
        self.request(
            Method::POST,
            url,
            Some(body),
            headers,
            RequestOptions::default(),
        )
        .await
    }
}
