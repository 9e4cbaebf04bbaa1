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

//! Errors created while obtaining or using credentials.

use http::StatusCode;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credentials, token endpoint exchanges and authorized
/// sessions.
///
/// Applications rarely need to create instances of this error type. Use the
/// `is_*()` predicates to classify the error, and the accessors to extract
/// details reported by the token endpoint.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct CredentialsError(ErrorKind);

impl CredentialsError {
    /// The token endpoint returned a status other than `200 OK`.
    pub fn is_auth_server(&self) -> bool {
        matches!(self.0, ErrorKind::AuthServer(_))
    }

    /// The token endpoint returned `200 OK` without an `access_token`.
    pub fn is_missing_token(&self) -> bool {
        matches!(self.0, ErrorKind::MissingToken(_))
    }

    /// The HTTP client could not send the request or read the response.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ErrorKind::Transport(_))
    }

    /// The signer could not produce a signature for the JWT assertion.
    pub fn is_signing(&self) -> bool {
        matches!(self.0, ErrorKind::Signing(_))
    }

    /// A response body or a credentials document could not be decoded.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_))
    }

    /// A problem finding or opening the credentials file.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// A required field was missing from a builder or credentials document.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// The details reported by the token endpoint, if this is an
    /// [auth server error](Self::is_auth_server).
    pub fn auth_server_error(&self) -> Option<&AuthServerError> {
        match &self.0 {
            ErrorKind::AuthServer(e) => Some(e),
            _ => None,
        }
    }

    /// The full decoded response, if this is a
    /// [missing token error](Self::is_missing_token).
    pub fn missing_token_response(&self) -> Option<&Map<String, Value>> {
        match &self.0 {
            ErrorKind::MissingToken(response) => Some(&response.0),
            _ => None,
        }
    }

    pub(crate) fn auth_server<T: Into<String>>(status: StatusCode, body: T) -> Self {
        Self(ErrorKind::AuthServer(AuthServerError::new(status, body)))
    }

    pub(crate) fn missing_token(response: Map<String, Value>) -> Self {
        Self(ErrorKind::MissingToken(ResponseFields(response)))
    }

    pub(crate) fn transport<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Transport(source.into()))
    }

    /// Creates a signing error.
    ///
    /// Custom [SigningProvider](crate::signer::SigningProvider)
    /// implementations use this to report failures.
    pub fn signing<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Signing(source.into()))
    }

    pub(crate) fn parsing<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Parsing(source.into()))
    }

    pub(crate) fn loading<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Loading(source.into()))
    }

    pub(crate) fn missing_field(field: &'static str) -> Self {
        Self(ErrorKind::MissingField(field))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("the token endpoint rejected the request: {0}")]
    AuthServer(AuthServerError),
    #[error("no access token in the token endpoint response, fields: {0:?}")]
    MissingToken(ResponseFields),
    #[error("cannot send the request or read the response: {0}")]
    Transport(#[source] BoxError),
    #[error("cannot sign the JWT assertion: {0}")]
    Signing(#[source] BoxError),
    #[error("cannot parse the data: {0}")]
    Parsing(#[source] BoxError),
    #[error("could not find or open the credentials file: {0}")]
    Loading(#[source] BoxError),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// Token endpoint responses may carry other secrets, only the field names are
// printed.
struct ResponseFields(Map<String, Value>);

impl std::fmt::Debug for ResponseFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

/// A token endpoint rejection.
///
/// See [RFC 6749 section 5.2] for the format of the error details. Servers do
/// not always follow that format, the raw body is always available via
/// [body()](Self::body).
///
/// [RFC 6749 section 5.2]: https://datatracker.ietf.org/doc/html/rfc6749#section-5.2
#[derive(Clone, Debug)]
pub struct AuthServerError {
    status: StatusCode,
    body: String,
    details: Option<ErrorResponse>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_uri: Option<String>,
}

impl AuthServerError {
    pub(crate) fn new<T: Into<String>>(status: StatusCode, body: T) -> Self {
        let body = body.into();
        let details = serde_json::from_str::<ErrorResponse>(&body).ok();
        Self {
            status,
            body,
            details,
        }
    }

    /// The HTTP status code returned by the token endpoint.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response body, verbatim.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The `error` code, e.g. `invalid_grant`, if the body was an RFC 6749
    /// error object.
    pub fn error(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.error.as_str())
    }

    /// The `error_description`, if present.
    pub fn error_description(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.error_description.as_deref())
    }

    /// The `error_uri`, if present.
    pub fn error_uri(&self) -> Option<&str> {
        self.details.as_ref().and_then(|d| d.error_uri.as_deref())
    }
}

impl Display for AuthServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(ErrorResponse {
                error,
                error_description: Some(description),
                ..
            }) => write!(f, "status {}, {error}: {description}", self.status),
            Some(ErrorResponse { error, .. }) => write!(f, "status {}, {error}", self.status),
            None => write!(f, "status {}, body: {}", self.status, self.body),
        }
    }
}

impl std::error::Error for AuthServerError {}
