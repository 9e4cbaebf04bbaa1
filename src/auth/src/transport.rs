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

//! The HTTP transport consumed by credentials and authorized sessions.
//!
//! This crate does not implement HTTP. Connection pooling, TLS, redirects and
//! the like are delegated to an [HttpClient] implementation. The default
//! implementation is [ReqwestClient](crate::http::ReqwestClient); tests and
//! applications with special needs may provide their own.

use crate::Result;
use crate::errors::CredentialsError;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;

/// A single HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub options: RequestOptions,
}

impl Request {
    pub fn new<U: Into<String>>(method: Method, url: U) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }
}

/// Transport options passed through, unmodified, to the [HttpClient].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Sets a timeout for the complete request, including reading the body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a query parameter to the request URL.
    pub fn with_query<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }
}

/// A complete HTTP response, with the body already read.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// The response body decoded as UTF-8.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(CredentialsError::parsing)
    }

    /// The response body decoded as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(CredentialsError::parsing)
    }
}

impl From<(StatusCode, &'static str)> for Response {
    fn from(value: (StatusCode, &'static str)) -> Self {
        Self::new(value.0, HeaderMap::new(), Bytes::from_static(value.1.as_bytes()))
    }
}

/// The HTTP client used to reach token endpoints and APIs.
///
/// Implementations must not retry or interpret the response status, they
/// return every response the server sends. Failures to send the request or
/// read the response are reported as [transport] errors.
///
/// [transport]: CredentialsError::is_transport
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync + std::fmt::Debug {
    /// Sends `request` and reads the full response.
    async fn request(&self, request: Request) -> Result<Response>;

    /// Sends a `POST` request with the given headers and body.
    async fn post(&self, url: &str, headers: HeaderMap, body: Bytes) -> Result<Response> {
        let mut request = Request::new(Method::POST, url);
        request.headers = headers;
        request.body = Some(body);
        self.request(request).await
    }
}
