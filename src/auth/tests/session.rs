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

#[cfg(test)]
mod tests {
    use google_cloud_auth_session::client::Client;
    use google_cloud_auth_session::credentials::Credentials;
    use google_cloud_auth_session::credentials::service_account::Builder;
    use google_cloud_auth_session::http::ReqwestClient;
    use google_cloud_auth_session::session::AuthorizedSession;
    use google_cloud_auth_session::transport::RequestOptions;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    type TestResult = anyhow::Result<()>;

    const PKCS8_PEM: &str = include_str!("data/test-only-pkcs8.pem");

    fn key(token_uri: &str) -> serde_json::Value {
        json!({
            "type": "service_account",
            "project_id": "test-only-project",
            "private_key_id": "test-only-key-id",
            "private_key": PKCS8_PEM,
            "client_email": "test-only@test-only-project.iam.gserviceaccount.com",
            "token_uri": token_uri,
        })
    }

    #[tokio::test]
    async fn refresh_on_unauthorized() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/token"),
                request::body(url_decoded(contains((
                    "grant_type",
                    "urn:ietf:params:oauth:grant-type:jwt-bearer"
                )))),
            ])
            .times(2)
            .respond_with(httptest::cycle![
                json_encoded(json!({"access_token": "test-only-token-1", "expires_in": 3600})),
                json_encoded(json!({"access_token": "test-only-token-2", "expires_in": 3600})),
            ]),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v1/things"),
                request::headers(contains(("authorization", "Bearer test-only-token-1"))),
                request::headers(contains(("x-test-only", "value"))),
            ])
            .times(1)
            .respond_with(status_code(401)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v1/things"),
                request::headers(contains(("authorization", "Bearer test-only-token-2"))),
                request::headers(contains(("x-test-only", "value"))),
                request::query(url_decoded(contains(("alt", "json")))),
            ])
            .times(1)
            .respond_with(status_code(200).body(r#"{"things": []}"#)),
        );

        let credentials = Builder::new(key(&server.url("/token").to_string()))
            .with_scopes(["https://www.googleapis.com/auth/cloud-platform"])
            .build()?;
        let session = AuthorizedSession::builder(Credentials::from(credentials.clone()))
            .with_http_client(ReqwestClient::new())
            .build();

        let mut headers = HeaderMap::new();
        headers.insert("x-test-only", HeaderValue::from_static("value"));
        let response = session
            .request(
                Method::GET,
                &server.url("/v1/things").to_string(),
                None,
                Some(&headers),
                RequestOptions::default().with_query("alt", "json"),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>()?, json!({"things": []}));
        assert_eq!(headers.len(), 1, "{headers:?}");
        assert_eq!(
            credentials.token().map(|t| t.token).as_deref(),
            Some("test-only-token-2")
        );
        Ok(())
    }

    #[tokio::test]
    async fn token_endpoint_rejection() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token")).respond_with(
                status_code(400).body(
                    r#"{"error":"invalid_grant","error_description":"Invalid JWT Signature."}"#,
                ),
            ),
        );

        let credentials = Builder::new(key(&server.url("/token").to_string())).build()?;
        let session = AuthorizedSession::builder(Credentials::from(credentials)).build();
        let err = session
            .get(&server.url("/v1/things").to_string())
            .await
            .unwrap_err();
        assert!(err.is_auth_server(), "{err:?}");
        let details = err.auth_server_error().unwrap();
        assert_eq!(details.status(), StatusCode::BAD_REQUEST);
        assert_eq!(details.error(), Some("invalid_grant"));
        assert_eq!(details.error_description(), Some("Invalid JWT Signature."));
        Ok(())
    }

    #[tokio::test]
    async fn client_lazy_session() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/token"))
                .times(1)
                .respond_with(json_encoded(
                    json!({"access_token": "test-only-token", "expires_in": 3600}),
                )),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v1/projects/test-only-project"),
                request::headers(contains(("authorization", "Bearer test-only-token"))),
            ])
            .times(2)
            .respond_with(status_code(200)),
        );

        let credentials = Builder::new(key(&server.url("/token").to_string())).build()?;
        let client = Client::builder()
            .with_credentials(credentials)
            .with_project("test-only-project")
            .with_scopes(["https://www.googleapis.com/auth/cloud-platform"])
            .build()?;
        let url = server
            .url(&format!("/v1/projects/{}", client.project().unwrap_or_default()))
            .to_string();
        for _ in 0..2 {
            let response = client.http().get(&url).await?;
            assert_eq!(response.status(), StatusCode::OK);
        }
        Ok(())
    }
}
