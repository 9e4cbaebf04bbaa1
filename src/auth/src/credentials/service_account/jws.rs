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

use crate::Result;
use crate::errors::CredentialsError;
use crate::signer::Signer;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use time::OffsetDateTime;

/// The lifetime requested for assertions, and thus for access tokens.
pub(crate) const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// The claims in a JWT bearer grant assertion.
#[derive(Serialize)]
pub(crate) struct JwsClaims<'a> {
    pub iss: &'a str,
    pub scope: String,
    pub aud: &'a str,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
}

impl<'a> JwsClaims<'a> {
    pub fn new(iss: &'a str, aud: &'a str, scopes: &[String], now: OffsetDateTime) -> Self {
        Self {
            iss,
            scope: scopes.join(" "),
            aud,
            iat: now,
            exp: now + DEFAULT_TOKEN_LIFETIME,
        }
    }

    /// Merges the additional claims and the subject into the standard claims.
    ///
    /// Additional claims replace standard claims with the same name. The
    /// subject does not replace a `sub` in the additional claims.
    fn payload(
        &self,
        subject: Option<&str>,
        additional_claims: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut payload = match serde_json::to_value(self).map_err(CredentialsError::parsing)? {
            Value::Object(map) => map,
            other => {
                return Err(CredentialsError::parsing(format!(
                    "expected claims to serialize as an object, got {other}"
                )));
            }
        };
        payload.extend(
            additional_claims
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(subject) = subject {
            payload
                .entry("sub")
                .or_insert_with(|| Value::String(subject.to_string()));
        }
        Ok(payload)
    }
}

/// The header that describes who, what, and how a token was created.
#[derive(Serialize)]
pub(crate) struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(CredentialsError::parsing)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Creates a signed JWT: `header.claims.signature`, each segment base64url
/// encoded without padding.
pub(crate) fn assertion(
    signer: &Signer,
    claims: &JwsClaims<'_>,
    subject: Option<&str>,
    additional_claims: &Map<String, Value>,
) -> Result<String> {
    let header = JwsHeader {
        alg: "RS256",
        typ: "JWT",
        kid: signer.key_id(),
    };
    let payload = claims.payload(subject, additional_claims)?;
    let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&payload)?);
    let signature = signer.sign(signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(signature)
    ))
}
