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

//! OAuth 2.0 client for the authorization server's token endpoint.
//!
//! The functions in this module perform a single exchange with the token
//! endpoint, they never retry. See [Section 3.2 of RFC 6749] for details
//! about the token endpoint.
//!
//! [Section 3.2 of RFC 6749]: https://datatracker.ietf.org/doc/html/rfc6749#section-3.2

use crate::Result;
use crate::errors::CredentialsError;
use crate::transport::HttpClient;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;

const URLENCODED_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// JWT bearer grant type, see [RFC 7523 section 2.1].
///
/// [RFC 7523 section 2.1]: https://datatracker.ietf.org/doc/html/rfc7523#section-2.1
pub const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh token grant type, see [RFC 6749 section 6].
///
/// [RFC 6749 section 6]: https://datatracker.ietf.org/doc/html/rfc6749#section-6
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// The result of a [jwt_grant].
#[derive(Clone, PartialEq)]
pub struct JwtGrant {
    pub access_token: String,
    /// Computed from `expires_in`, `None` if the server omitted it.
    pub expires_at: Option<Instant>,
    /// The full decoded response, including any fields not captured above.
    pub response: Map<String, Value>,
}

/// The result of a [refresh_grant].
#[derive(Clone, PartialEq)]
pub struct RefreshGrant {
    pub access_token: String,
    /// The rotated refresh token, or the original one if the server did not
    /// rotate it.
    pub refresh_token: String,
    pub expires_at: Option<Instant>,
    pub response: Map<String, Value>,
}

impl std::fmt::Debug for JwtGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtGrant")
            .field("access_token", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("access_token", &"[censored]")
            .field("refresh_token", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Makes a request to the token endpoint.
///
/// The body is sent as `application/x-www-form-urlencoded`. Returns the
/// decoded JSON object on `200 OK`, and an [auth server] error carrying the
/// response body for any other status.
///
/// [auth server]: CredentialsError::is_auth_server
pub async fn token_endpoint_request(
    client: &dyn HttpClient,
    token_uri: &str,
    body: &[(&str, &str)],
) -> Result<Map<String, Value>> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(body)
        .finish();
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(URLENCODED_CONTENT_TYPE),
    );

    let response = client
        .post(token_uri, headers, Bytes::from(body))
        .await?;
    let text = response.text()?;

    if response.status() != StatusCode::OK {
        let error = CredentialsError::auth_server(response.status(), text);
        if let Some(e) = error.auth_server_error() {
            tracing::warn!(
                status = %e.status(),
                error = e.error().unwrap_or_default(),
                "token endpoint rejected the grant"
            );
        }
        return Err(error);
    }

    serde_json::from_str::<Map<String, Value>>(&text).map_err(CredentialsError::parsing)
}

/// Implements the JWT Profile for OAuth 2.0 Authorization Grants.
///
/// See [RFC 7523 section 4].
///
/// [RFC 7523 section 4]: https://datatracker.ietf.org/doc/html/rfc7523#section-4
pub async fn jwt_grant(
    client: &dyn HttpClient,
    token_uri: &str,
    assertion: &str,
) -> Result<JwtGrant> {
    let body = [("assertion", assertion), ("grant_type", JWT_GRANT_TYPE)];
    let response = token_endpoint_request(client, token_uri, &body).await?;
    let access_token = access_token(&response)?;
    let expires_at = parse_expiry(&response);

    Ok(JwtGrant {
        access_token,
        expires_at,
        response,
    })
}

/// Implements the OAuth 2.0 refresh token grant.
///
/// See [RFC 6749 section 6].
///
/// [RFC 6749 section 6]: https://datatracker.ietf.org/doc/html/rfc6749#section-6
pub async fn refresh_grant(
    client: &dyn HttpClient,
    token_uri: &str,
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<RefreshGrant> {
    let body = [
        ("grant_type", REFRESH_GRANT_TYPE),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
    ];
    let response = token_endpoint_request(client, token_uri, &body).await?;
    let access_token = access_token(&response)?;
    // Refresh tokens are not always rotated.
    let refresh_token = response
        .get("refresh_token")
        .and_then(Value::as_str)
        .unwrap_or(refresh_token)
        .to_string();
    let expires_at = parse_expiry(&response);

    Ok(RefreshGrant {
        access_token,
        refresh_token,
        expires_at,
        response,
    })
}

fn access_token(response: &Map<String, Value>) -> Result<String> {
    match response.get("access_token").and_then(Value::as_str) {
        Some(token) => Ok(token.to_string()),
        None => Err(CredentialsError::missing_token(response.clone())),
    }
}

// Some servers send `expires_in` as a string. Negative lifetimes yield a
// token that is already expired.
fn parse_expiry(response: &Map<String, Value>) -> Option<Instant> {
    let seconds = match response.get("expires_in")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if seconds.is_nan() {
        return None;
    }
    let now = Instant::now();
    let lifetime = Duration::try_from_secs_f64(seconds.max(0.0)).ok()?;
    now.checked_add(lifetime)
}
