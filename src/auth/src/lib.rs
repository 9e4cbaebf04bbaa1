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

//! Authorized HTTP sessions for service accounts.
//!
//! This crate attaches OAuth 2.0 bearer tokens to outgoing HTTP requests, and
//! refreshes the tokens when they expire or are rejected by the server. The
//! tokens are obtained by exchanging a JWT signed with a service account key
//! at an OAuth 2.0 token endpoint, see [RFC 7523].
//!
//! The main types are:
//! - [credentials::service_account::ServiceAccountCredentials], which hold the
//!   key, the requested scopes and claims, and the current token.
//! - [session::AuthorizedSession], which wraps an
//!   [HttpClient](transport::HttpClient), decorates each request with the
//!   token, and retries (once the credentials are refreshed) requests
//!   rejected with `401 Unauthorized`.
//! - [client::Client], which bundles credentials, a project, and a session.
//!
//! [Authentication methods at Google] is a good introduction on the topic of
//! authentication for Google Cloud services and other Google products.
//!
//! [Authentication methods at Google]: https://cloud.google.com/docs/authentication
//! [RFC 7523]: https://datatracker.ietf.org/doc/html/rfc7523

pub mod errors;

/// Service account credentials and the trait implemented by all credentials.
pub mod credentials;

pub mod client;
pub mod http;
pub mod oauth2;
pub mod session;
pub mod signer;
pub mod token;
pub mod transport;

/// A `Result` alias where the `Err` case is
/// `google_cloud_auth_session::errors::CredentialsError`.
pub type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;
