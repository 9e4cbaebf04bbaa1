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

//! Bundles the configuration needed for API requests.
//!
//! A [Client] holds service account credentials, the project the client acts
//! on behalf of, and an [AuthorizedSession]. Service-specific clients embed a
//! `Client` and declare the scopes they need.

use crate::Result;
use crate::credentials::Credentials;
use crate::credentials::service_account::{self, ServiceAccountCredentials};
use crate::errors::CredentialsError;
use crate::session::AuthorizedSession;
use std::sync::OnceLock;

/// Names the service account key file used when no credentials are provided.
pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Names the project used when no project is provided.
pub const PROJECT_ENV_VAR: &str = "GOOGLE_CLOUD_PROJECT";

/// A builder for [Client].
#[derive(Debug, Default)]
pub struct Builder {
    credentials: Option<ServiceAccountCredentials>,
    project: Option<String>,
    http: Option<AuthorizedSession>,
    scopes: Vec<String>,
}

impl Builder {
    pub fn with_credentials(mut self, credentials: ServiceAccountCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_project<S: Into<String>>(mut self, project: S) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Uses an existing session instead of creating one from the credentials.
    ///
    /// The session and the credentials need not be related.
    pub fn with_http_session(mut self, session: AuthorizedSession) -> Self {
        self.http = Some(session);
        self
    }

    /// Sets the scopes required by the service.
    ///
    /// The scopes are applied only if the credentials do not have any scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Returns a [Client] with the configured settings.
    ///
    /// # Errors
    ///
    /// If neither credentials nor a session are configured, the credentials
    /// are loaded from the file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    /// Returns an error if that variable is not set, or the file cannot be
    /// loaded.
    pub fn build(self) -> Result<Client> {
        let credentials = match (self.credentials, &self.http) {
            (Some(c), _) => Some(c),
            (None, Some(_)) => None,
            (None, None) => Some(credentials_from_env()?),
        };
        let credentials = credentials.map(|c| {
            if c.requires_scopes() && !self.scopes.is_empty() {
                c.with_scopes(self.scopes.iter().cloned())
            } else {
                c
            }
        });

        let project = self
            .project
            .or_else(|| std::env::var(PROJECT_ENV_VAR).ok())
            .or_else(|| {
                credentials
                    .as_ref()
                    .and_then(|c| c.project_id().map(str::to_string))
            });

        let http = match (self.http, &credentials) {
            (Some(session), _) => Http::Injected(session),
            (None, Some(c)) => Http::Lazy {
                credentials: Credentials::from(c.clone()),
                session: OnceLock::new(),
            },
            (None, None) => return Err(CredentialsError::missing_field("credentials")),
        };

        Ok(Client {
            credentials,
            project,
            http,
        })
    }
}

fn credentials_from_env() -> Result<ServiceAccountCredentials> {
    let path = std::env::var_os(CREDENTIALS_ENV_VAR).ok_or_else(|| {
        CredentialsError::loading(format!(
            "no credentials provided and {CREDENTIALS_ENV_VAR} is not set"
        ))
    })?;
    service_account::from_file(path)
}

#[derive(Debug)]
enum Http {
    Injected(AuthorizedSession),
    Lazy {
        credentials: Credentials,
        session: OnceLock<AuthorizedSession>,
    },
}

/// Stores credentials, a project, and an HTTP session for API requests.
#[derive(Debug)]
pub struct Client {
    credentials: Option<ServiceAccountCredentials>,
    project: Option<String>,
    http: Http,
}

impl Client {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The credentials, `None` if the client was created with a session and
    /// no credentials.
    pub fn credentials(&self) -> Option<&ServiceAccountCredentials> {
        self.credentials.as_ref()
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// The session used for API requests.
    ///
    /// Unless a session was provided, it is created on first use and shares
    /// the token with [credentials()](Self::credentials).
    pub fn http(&self) -> &AuthorizedSession {
        match &self.http {
            Http::Injected(session) => session,
            Http::Lazy {
                credentials,
                session,
            } => session.get_or_init(|| AuthorizedSession::builder(credentials.clone()).build()),
        }
    }
}
