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

//! An [HttpClient] implemented with [reqwest].

use crate::Result;
use crate::errors::CredentialsError;
use crate::transport::{HttpClient, Request, Response};
use std::time::Duration;

/// The default [HttpClient], backed by a [reqwest::Client].
///
/// Cloning a `ReqwestClient` is cheap, all clones share the same connection
/// pool.
#[derive(Clone, Debug, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
    timeout: Option<Duration>,
}

/// A builder for [ReqwestClient].
#[derive(Debug, Default)]
pub struct Builder {
    inner: Option<reqwest::Client>,
    timeout: Option<Duration>,
}

impl Builder {
    /// Uses a pre-configured [reqwest::Client], e.g. one with custom TLS
    /// roots or proxies.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.inner = Some(client);
        self
    }

    /// Sets the default timeout for requests without a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ReqwestClient {
        ReqwestClient {
            inner: self.inner.unwrap_or_default(),
            timeout: self.timeout,
        }
    }
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    fn prepare_request(&self, request: Request) -> reqwest::RequestBuilder {
        let mut builder = self
            .inner
            .request(request.method, request.url)
            .headers(request.headers);
        if !request.options.query().is_empty() {
            builder = builder.query(request.options.query());
        }
        if let Some(timeout) = request.options.timeout().or(self.timeout) {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: Request) -> Result<Response> {
        let response = self
            .prepare_request(request)
            .send()
            .await
            .map_err(CredentialsError::transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(CredentialsError::transport)?;
        Ok(Response::new(status, headers, body))
    }
}
