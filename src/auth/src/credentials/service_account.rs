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

//! [Service Account] Credentials type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. These credentials authenticate as the
//! service account by signing a JWT assertion with the account's private key,
//! and exchanging the assertion for an access token at the token endpoint,
//! using the JWT bearer grant defined in [RFC 7523].
//!
//! Services account keys should be treated as any other secret with security
//! implications. Think of them as unencrypted passwords. Do not store them
//! where unauthorized persons or programs may read them.
//!
//! The credentials are immutable except for the cached token. Use
//! [with_scopes](ServiceAccountCredentials::with_scopes),
//! [with_subject](ServiceAccountCredentials::with_subject) or
//! [with_claims](ServiceAccountCredentials::with_claims) to create credentials
//! with a different configuration.
//!
//! Example usage:
//!
//! ```no_run
//! # use google_cloud_auth_session::credentials::service_account::Builder;
//! # use google_cloud_auth_session::http::ReqwestClient;
//! # tokio_test::block_on(async {
//! let key = serde_json::json!({
//!     "client_email": "test-only@test-only-project.iam.gserviceaccount.com",
//!     "private_key_id": "test-only-key-id",
//!     "private_key": "", // <-- Provide a valid PEM key here
//! });
//! let credentials = Builder::new(key)
//!     .with_scopes(["https://www.googleapis.com/auth/cloud-platform"])
//!     .build()?;
//! credentials.refresh(&ReqwestClient::new()).await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```
//!
//! [RFC 7523]: https://datatracker.ietf.org/doc/html/rfc7523
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-overview

mod jws;

use crate::Result;
use crate::credentials::{CredentialsProvider, apply_bearer};
use crate::errors::CredentialsError;
use crate::oauth2;
use crate::signer::Signer;
use crate::signer::service_account::ServiceAccountSigner;
use crate::token::Token;
use crate::transport::HttpClient;
use http::HeaderMap;
use jws::JwsClaims;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use time::OffsetDateTime;
use tokio::time::Instant;

/// The token endpoint used when neither the key nor the builder set one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Creates credentials from a service account key file.
///
/// The file must contain a service account key in JSON format, as downloaded
/// from the console.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ServiceAccountCredentials> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(CredentialsError::loading)?;
    let key = serde_json::from_str::<Value>(&contents).map_err(CredentialsError::parsing)?;
    Builder::new(key).build()
}

/// A representation of a [service account key].
///
/// Only the fields used by these credentials are captured, other fields are
/// ignored.
///
/// [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating
#[derive(serde::Deserialize, Clone, Default, PartialEq)]
pub struct ServiceAccountKey {
    /// The client email address of the service account.
    #[serde(default)]
    pub client_email: String,
    /// ID of the service account's private key.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// The PEM-encoded RSA private key.
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

enum KeySource {
    Json(Value),
    Signer {
        signer: Signer,
        service_account_email: String,
    },
}

/// A builder for [ServiceAccountCredentials].
pub struct Builder {
    source: KeySource,
    token_uri: Option<String>,
    scopes: Vec<String>,
    subject: Option<String>,
    additional_claims: Map<String, Value>,
}

impl Builder {
    /// Creates a builder from a service account key in JSON format.
    ///
    /// The key is validated in [build()](Self::build).
    pub fn new(service_account_key: Value) -> Self {
        Self::with_source(KeySource::Json(service_account_key))
    }

    /// Creates a builder from an existing signer.
    ///
    /// Use this when the private key is not available to the application, for
    /// example, when it is kept in a hardware security module.
    pub fn from_signer<S: Into<String>>(signer: Signer, service_account_email: S) -> Self {
        Self::with_source(KeySource::Signer {
            signer,
            service_account_email: service_account_email.into(),
        })
    }

    fn with_source(source: KeySource) -> Self {
        Self {
            source,
            token_uri: None,
            scopes: Vec::new(),
            subject: None,
            additional_claims: Map::new(),
        }
    }

    /// Sets the token endpoint, overriding the `token_uri` in the key.
    pub fn with_token_uri<S: Into<String>>(mut self, token_uri: S) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Sets the [scopes] requested in the assertion.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Sets the user to impersonate with [domain-wide delegation].
    ///
    /// [domain-wide delegation]: https://support.google.com/a/answer/162106
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets claims added to the assertion, replacing any standard claims with
    /// the same name.
    pub fn with_additional_claims(mut self, additional_claims: Map<String, Value>) -> Self {
        self.additional_claims = additional_claims;
        self
    }

    /// Returns a [ServiceAccountCredentials] instance with the configured
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns a [CredentialsError] if the key is not a JSON object, is missing
    /// the `client_email` or `private_key` fields, or if the private key cannot
    /// be loaded.
    pub fn build(self) -> Result<ServiceAccountCredentials> {
        let (signer, service_account_email, key_token_uri, project_id) = match self.source {
            KeySource::Json(json) => {
                let key = serde_json::from_value::<ServiceAccountKey>(json)
                    .map_err(CredentialsError::parsing)?;
                if key.client_email.is_empty() {
                    return Err(CredentialsError::missing_field("client_email"));
                }
                if key.private_key.is_empty() {
                    return Err(CredentialsError::missing_field("private_key"));
                }
                let signer = ServiceAccountSigner::from_pem(key.private_key_id, &key.private_key)?;
                (
                    Signer::from(signer),
                    key.client_email,
                    key.token_uri,
                    key.project_id,
                )
            }
            KeySource::Signer {
                signer,
                service_account_email,
            } => (signer, service_account_email, None, None),
        };
        let token_uri = self
            .token_uri
            .or(key_token_uri)
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        Ok(ServiceAccountCredentials {
            signer,
            service_account_email,
            token_uri,
            scopes: self.scopes,
            subject: self.subject,
            additional_claims: self.additional_claims,
            project_id,
            token: Arc::default(),
        })
    }
}

/// Service account credentials using the JWT bearer grant.
///
/// Clones share the cached token. Credentials created by the `with_*()`
/// functions start without a token.
#[derive(Clone)]
pub struct ServiceAccountCredentials {
    signer: Signer,
    service_account_email: String,
    token_uri: String,
    scopes: Vec<String>,
    subject: Option<String>,
    additional_claims: Map<String, Value>,
    project_id: Option<String>,
    token: Arc<RwLock<Option<Token>>>,
}

impl ServiceAccountCredentials {
    /// Creates new credentials with the given scopes.
    pub fn with_scopes<I, S>(&self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(|s| s.into()).collect(),
            ..self.reconfigure()
        }
    }

    /// Creates new credentials acting on behalf of `subject`.
    pub fn with_subject<S: Into<String>>(&self, subject: S) -> Self {
        Self {
            subject: Some(subject.into()),
            ..self.reconfigure()
        }
    }

    /// Creates new credentials with additional claims merged into the existing
    /// ones. Values in `additional_claims` replace existing values with the
    /// same name.
    pub fn with_claims(&self, additional_claims: Map<String, Value>) -> Self {
        let mut new = self.reconfigure();
        new.additional_claims.extend(additional_claims);
        new
    }

    // A copy of the configuration, without the token.
    fn reconfigure(&self) -> Self {
        Self {
            token: Arc::default(),
            ..self.clone()
        }
    }

    /// Returns `true` if the credentials have no scopes.
    pub fn requires_scopes(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn service_account_email(&self) -> &str {
        &self.service_account_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn additional_claims(&self) -> &Map<String, Value> {
        &self.additional_claims
    }

    /// The `project_id` in the service account key, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// The current token, if any.
    pub fn token(&self) -> Option<Token> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The expiration of the current token.
    ///
    /// `None` if there is no token, or if the token does not expire.
    pub fn expiry(&self) -> Option<Instant> {
        self.token().and_then(|t| t.expires_at)
    }

    /// Returns `true` if a token is present and has not expired.
    pub fn valid(&self) -> bool {
        self.token().is_some_and(|t| t.is_valid())
    }

    /// Obtains a new token using the JWT bearer grant.
    ///
    /// The token is replaced only if the grant succeeds.
    pub async fn refresh(&self, client: &dyn HttpClient) -> Result<()> {
        tracing::debug!(
            service_account_email = self.service_account_email,
            token_uri = self.token_uri,
            "refreshing service account credentials"
        );
        let claims = JwsClaims::new(
            &self.service_account_email,
            &self.token_uri,
            &self.scopes,
            OffsetDateTime::now_utc(),
        );
        let assertion = jws::assertion(
            &self.signer,
            &claims,
            self.subject.as_deref(),
            &self.additional_claims,
        )?;
        let grant = oauth2::jwt_grant(client, &self.token_uri, &assertion).await?;
        tracing::debug!(expires_at = ?grant.expires_at, "obtained access token");

        let token = Token {
            token: grant.access_token,
            expires_at: grant.expires_at,
        };
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    /// Sets the `Authorization` header to the current token.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        apply_bearer(self.token().as_ref(), headers)
    }
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("signer", &self.signer)
            .field("service_account_email", &self.service_account_email)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .field("subject", &self.subject)
            .field("additional_claims", &self.additional_claims)
            .field("project_id", &self.project_id)
            .field("token", &self.token())
            .finish()
    }
}

impl CredentialsProvider for ServiceAccountCredentials {
    fn valid(&self) -> bool {
        ServiceAccountCredentials::valid(self)
    }

    async fn refresh(&self, client: &dyn HttpClient) -> Result<()> {
        ServiceAccountCredentials::refresh(self, client).await
    }

    fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        ServiceAccountCredentials::apply(self, headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::http::ReqwestClient;
    use crate::signer::service_account::tests::PKCS8_PEM;
    use crate::signer::tests::FakeSigner;
    use crate::transport::tests::MockHttpClient;
    use crate::transport::{Request, Response};
    use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
    use http::header::{AUTHORIZATION, HeaderValue};
    use http::{Method, StatusCode};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use rsa::RsaPrivateKey;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::sha2::Sha256;
    use rsa::signature::Verifier;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use test_case::test_case;

    type TestResult = anyhow::Result<()>;

    const EMAIL: &str = "test-only@test-only-project.iam.gserviceaccount.com";

    fn key_json() -> Value {
        json!({
            "type": "service_account",
            "project_id": "test-only-project",
            "private_key_id": "test-only-key-id",
            "private_key": PKCS8_PEM,
            "client_email": EMAIL,
            "token_uri": "https://test-only.example.com/token",
        })
    }

    fn fake_credentials() -> ServiceAccountCredentials {
        Builder::from_signer(Signer::from(FakeSigner::new()), EMAIL)
            .with_token_uri("https://example.com/token")
            .build()
            .unwrap()
    }

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // Returns the (header, claims) of the assertion in a captured request.
    fn captured_assertion(request: &Request) -> anyhow::Result<(Value, Value)> {
        let body = request.body.clone().unwrap_or_default();
        let form = url::form_urlencoded::parse(&body)
            .into_owned()
            .collect::<std::collections::HashMap<String, String>>();
        assert_eq!(
            form.get("grant_type").map(String::as_str),
            Some(oauth2::JWT_GRANT_TYPE)
        );
        let assertion = form
            .get("assertion")
            .ok_or_else(|| anyhow::anyhow!("missing assertion in {form:?}"))?;
        let (header, claims, _) = jws::tests::decode(assertion)?;
        Ok((header, claims))
    }

    fn token_response(body: &'static str) -> MockHttpClient {
        let mut mock = MockHttpClient::new();
        mock.expect_request()
            .returning(move |_| Ok(Response::from((StatusCode::OK, body))));
        mock
    }

    #[test]
    fn builder_from_key() -> TestResult {
        let credentials = Builder::new(key_json()).build()?;
        assert_eq!(credentials.service_account_email(), EMAIL);
        assert_eq!(
            credentials.token_uri(),
            "https://test-only.example.com/token"
        );
        assert_eq!(credentials.project_id(), Some("test-only-project"));
        assert_eq!(
            credentials.signer().key_id().as_deref(),
            Some("test-only-key-id")
        );
        assert!(credentials.scopes().is_empty());
        assert!(credentials.requires_scopes());
        assert_eq!(credentials.subject(), None);
        assert!(credentials.additional_claims().is_empty());
        assert!(credentials.token().is_none());
        assert!(!credentials.valid());
        Ok(())
    }

    #[test]
    fn builder_default_token_uri() -> TestResult {
        let mut key = key_json();
        key.as_object_mut().unwrap().remove("token_uri");
        let credentials = Builder::new(key).build()?;
        assert_eq!(credentials.token_uri(), DEFAULT_TOKEN_URI);
        Ok(())
    }

    #[test]
    fn builder_settings() -> TestResult {
        let credentials = Builder::new(key_json())
            .with_token_uri("https://example.com/token")
            .with_scopes(["scope1", "scope2"])
            .with_subject("user@example.com")
            .with_additional_claims(as_map(json!({"a": 1})))
            .build()?;
        assert_eq!(credentials.token_uri(), "https://example.com/token");
        assert_eq!(credentials.scopes(), &["scope1", "scope2"]);
        assert!(!credentials.requires_scopes());
        assert_eq!(credentials.subject(), Some("user@example.com"));
        assert_eq!(credentials.additional_claims(), &as_map(json!({"a": 1})));
        Ok(())
    }

    #[test_case("client_email")]
    #[test_case("private_key")]
    fn builder_missing_field(field: &str) {
        let mut key = key_json();
        key.as_object_mut().unwrap().remove(field);
        let err = Builder::new(key).build().unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
        assert!(err.to_string().contains(field), "{err}");
    }

    #[test_case(json!("not an object"); "string")]
    #[test_case(json!({"client_email": 42}); "wrong type")]
    fn builder_bad_json(key: Value) {
        let err = Builder::new(key).build().unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
    }

    #[test]
    fn builder_bad_private_key() {
        let mut key = key_json();
        key["private_key"] = json!("not a pem");
        let err = Builder::new(key).build().unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
    }

    #[test]
    fn from_file_success() -> TestResult {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), key_json().to_string())?;
        let credentials = from_file(file.path())?;
        assert_eq!(credentials.service_account_email(), EMAIL);
        Ok(())
    }

    #[test]
    fn from_file_errors() -> TestResult {
        let dir = tempfile::tempdir()?;
        let err = from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(err.is_loading(), "{err:?}");

        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "not json")?;
        let err = from_file(file.path()).unwrap_err();
        assert!(err.is_parsing(), "{err:?}");
        Ok(())
    }

    #[test]
    fn debug() -> TestResult {
        let credentials = Builder::new(key_json()).build()?;
        *credentials.token.write().unwrap() = Some(Token {
            token: "test-only-secret-token".to_string(),
            expires_at: None,
        });
        let fmt = format!("{credentials:?}");
        assert!(fmt.contains(EMAIL), "{fmt}");
        assert!(!fmt.contains("test-only-secret-token"), "{fmt}");
        assert!(!fmt.contains("PRIVATE KEY"), "{fmt}");

        let key = serde_json::from_value::<ServiceAccountKey>(key_json())?;
        let fmt = format!("{key:?}");
        assert!(fmt.contains("[censored]"), "{fmt}");
        assert!(!fmt.contains("PRIVATE KEY"), "{fmt}");
        Ok(())
    }

    // Captures the configuration visible through the accessors.
    fn snapshot(
        c: &ServiceAccountCredentials,
    ) -> (
        String,
        String,
        Vec<String>,
        Option<String>,
        Map<String, Value>,
        Option<Token>,
    ) {
        (
            c.service_account_email().to_string(),
            c.token_uri().to_string(),
            c.scopes().to_vec(),
            c.subject().map(str::to_string),
            c.additional_claims().clone(),
            c.token(),
        )
    }

    #[tokio::test]
    async fn with_functions_do_not_mutate() -> TestResult {
        let credentials = fake_credentials()
            .with_scopes(["scope1"])
            .with_claims(as_map(json!({"a": 1})));
        credentials
            .refresh(&token_response(r#"{"access_token": "test-only-token"}"#))
            .await?;
        let before = snapshot(&credentials);

        let scoped = credentials.with_scopes(["scope2"]);
        let delegated = credentials.with_subject("user@example.com");
        let claimed = credentials.with_claims(as_map(json!({"a": 2, "b": 3})));
        assert_eq!(snapshot(&credentials), before);
        assert!(credentials.valid());

        assert_eq!(scoped.scopes(), &["scope2"]);
        assert_eq!(delegated.subject(), Some("user@example.com"));
        assert_eq!(claimed.additional_claims(), &as_map(json!({"a": 2, "b": 3})));
        // Copies keep the configuration but not the token.
        for copy in [&scoped, &delegated, &claimed] {
            assert_eq!(copy.service_account_email(), EMAIL);
            assert_eq!(copy.token_uri(), "https://example.com/token");
            assert!(copy.token().is_none(), "{copy:?}");
            assert!(!copy.valid());
        }
        assert_eq!(delegated.scopes(), &["scope1"]);
        assert_eq!(scoped.additional_claims(), &as_map(json!({"a": 1})));
        Ok(())
    }

    #[test]
    fn with_claims_merges() {
        let credentials = fake_credentials();
        let merged = credentials
            .with_claims(as_map(json!({"a": 1})))
            .with_claims(as_map(json!({"b": 2})));
        assert_eq!(merged.additional_claims(), &as_map(json!({"a": 1, "b": 2})));

        let replaced = merged.with_claims(as_map(json!({"a": 2})));
        assert_eq!(
            replaced.additional_claims(),
            &as_map(json!({"a": 2, "b": 2}))
        );
        assert_eq!(merged.additional_claims(), &as_map(json!({"a": 1, "b": 2})));
    }

    #[tokio::test]
    async fn refresh_sends_assertion() -> TestResult {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let requests = captured.clone();
        let mut mock = MockHttpClient::new();
        mock.expect_request().times(1).returning(move |r| {
            requests.lock().unwrap().push(r);
            Ok(Response::from((
                StatusCode::OK,
                r#"{"access_token": "test-only-token", "expires_in": 3600}"#,
            )))
        });

        let credentials = fake_credentials()
            .with_scopes(["scope1", "scope2"])
            .with_subject("user@example.com")
            .with_claims(as_map(json!({"target_audience": "test-only-audience"})));
        let now = OffsetDateTime::now_utc().unix_timestamp();
        credentials.refresh(&mock).await?;

        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://example.com/token");
        assert_eq!(
            request.headers.get("content-type"),
            Some(&HeaderValue::from_static(
                "application/x-www-form-urlencoded"
            ))
        );
        let (header, claims) = captured_assertion(request)?;
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "test-only-key-id");
        assert_eq!(claims["iss"], EMAIL);
        assert_eq!(claims["aud"], "https://example.com/token");
        assert_eq!(claims["scope"], "scope1 scope2");
        assert_eq!(claims["sub"], "user@example.com");
        assert_eq!(claims["target_audience"], "test-only-audience");
        let iat = claims["iat"].as_i64().unwrap();
        assert!((now..now + 10).contains(&iat), "{claims}");
        assert_eq!(claims["exp"].as_i64(), Some(iat + 3600));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_sets_token() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::body(url_decoded(contains((
                    "grant_type",
                    oauth2::JWT_GRANT_TYPE
                )))),
                request::body(url_decoded(contains(key("assertion")))),
            ])
            .times(1)
            .respond_with(json_encoded(json!({"access_token": "T1", "expires_in": 3600}))),
        );

        let credentials = Builder::new(key_json())
            .with_token_uri(server.url("/token").to_string())
            .build()?;
        assert!(!credentials.valid());

        let before = Instant::now();
        credentials.refresh(&ReqwestClient::new()).await?;
        let after = Instant::now();

        assert_eq!(credentials.token().map(|t| t.token).as_deref(), Some("T1"));
        let expiry = credentials.expiry().unwrap();
        let lifetime = Duration::from_secs(3600);
        assert!(
            before + lifetime <= expiry && expiry <= after + lifetime,
            "{expiry:?}"
        );
        assert!(credentials.valid());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_signature_verifies() -> TestResult {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let requests = captured.clone();
        let mut mock = MockHttpClient::new();
        mock.expect_request().times(1).returning(move |r| {
            requests.lock().unwrap().push(r);
            Ok(Response::from((StatusCode::OK, r#"{"access_token": "T1"}"#)))
        });

        let credentials = Builder::new(key_json()).build()?;
        credentials.refresh(&mock).await?;

        let requests = captured.lock().unwrap();
        let body = requests[0].body.clone().unwrap_or_default();
        let assertion = url::form_urlencoded::parse(&body)
            .find(|(k, _)| k == "assertion")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let (signing_input, signature) = assertion.rsplit_once('.').unwrap();
        let signature = Signature::try_from(BASE64_URL_SAFE_NO_PAD.decode(signature)?.as_slice())?;
        let key = RsaPrivateKey::from_pkcs8_pem(PKCS8_PEM)?;
        VerifyingKey::<Sha256>::new(key.to_public_key())
            .verify(signing_input.as_bytes(), &signature)?;
        Ok(())
    }

    #[tokio::test]
    async fn refresh_invalid_grant() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .respond_with(status_code(400).body(r#"{"error":"invalid_grant"}"#)),
        );

        let credentials = Builder::new(key_json())
            .with_token_uri(server.url("/token").to_string())
            .build()?;
        let err = credentials
            .refresh(&ReqwestClient::new())
            .await
            .unwrap_err();
        assert!(err.is_auth_server(), "{err:?}");
        assert_eq!(
            err.auth_server_error().and_then(|e| e.error()),
            Some("invalid_grant")
        );
        assert!(err.to_string().contains("invalid_grant"), "{err}");
        assert!(credentials.token().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_keeps_token() -> TestResult {
        let credentials = fake_credentials();
        credentials
            .refresh(&token_response(r#"{"access_token": "test-only-token"}"#))
            .await?;

        let err = credentials
            .refresh(&token_response(r#"{"token_type": "Bearer"}"#))
            .await
            .unwrap_err();
        assert!(err.is_missing_token(), "{err:?}");
        assert_eq!(
            credentials.token().map(|t| t.token).as_deref(),
            Some("test-only-token")
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_signing_error() {
        let credentials = Builder::from_signer(Signer::from(FakeSigner::failing()), EMAIL)
            .build()
            .unwrap();
        // The token endpoint is never called.
        let mock = MockHttpClient::new();
        let err = credentials.refresh(&mock).await.unwrap_err();
        assert!(err.is_signing(), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_is_not_valid() -> TestResult {
        let credentials = fake_credentials();
        credentials
            .refresh(&token_response(
                r#"{"access_token": "test-only-token", "expires_in": 3600}"#,
            ))
            .await?;
        assert!(credentials.valid());

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(credentials.valid());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!credentials.valid());
        assert!(credentials.token().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn before_request_refreshes_once() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(1)
                .respond_with(json_encoded(
                    json!({"access_token": "test-only-token", "expires_in": 3600}),
                )),
        );

        let sa = Builder::new(key_json())
            .with_token_uri(server.url("/token").to_string())
            .build()?;
        let credentials = Credentials::from(sa.clone());
        let client = ReqwestClient::new();
        for _ in 0..3 {
            let mut headers = HeaderMap::new();
            credentials
                .before_request(&client, &Method::GET, "https://example.com", &mut headers)
                .await?;
            assert_eq!(
                headers.get(AUTHORIZATION),
                Some(&HeaderValue::from_static("Bearer test-only-token"))
            );
        }
        // The clone inside `Credentials` shares the token.
        assert!(sa.valid());
        Ok(())
    }

    #[test]
    fn apply_without_token() {
        let credentials = fake_credentials();
        let mut headers = HeaderMap::new();
        let err = credentials.apply(&mut headers).unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
    }
}
