use crate::domain::model::{OauthToken, User};
use crate::utils::error::{Result, StitchError};
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// `/o/token/` 的回應
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OauthResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub refresh_token: String,
}

impl OauthResponse {
    /// 以目前時間加上 `expires_in` 計算到期時間
    pub fn into_token(self) -> OauthToken {
        OauthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in),
        }
    }
}

/// Compute Studio 的 OAuth2 authorization-code 流程
#[derive(Clone)]
pub struct OauthClient {
    http: Client,
    cs_base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OauthClient {
    pub fn new(
        http: Client,
        cs_base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            cs_base_url: cs_base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn authorization_uri(&self, state: &str) -> Result<String> {
        let base = format!("{}/o/authorize/", self.cs_base_url);
        let url = Url::parse_with_params(
            &base,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| StitchError::ConfigError {
            message: format!("Invalid authorization URL {}: {}", base, e),
        })?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OauthResponse> {
        let url = format!("{}/o/token/", self.cs_base_url);
        tracing::debug!("📡 Exchanging authorization code at {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("❌ Token exchange failed with {}", status);
            return Err(StitchError::authentication(format!(
                "Token exchange failed with {}",
                status
            )));
        }
        Ok(response.json().await?)
    }

    /// 查詢目前使用者，匿名使用者視為驗證失敗
    pub async fn me(&self, access_token: &str) -> Result<User> {
        let url = format!("{}/users/me/", self.cs_base_url);
        let response = self.http.get(&url).bearer_auth(access_token).send().await?;

        if !response.status().is_success() {
            return Err(StitchError::DownstreamApi {
                app: "users/me".to_string(),
                status: Some(response.status().as_u16()),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let user: User = response.json().await?;
        if user.status == "anon" {
            return Err(StitchError::authentication("Anonymous user"));
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: &str) -> OauthClient {
        OauthClient::new(
            Client::new(),
            base_url,
            "client-id",
            "client-secret",
            "http://localhost:8000/oauth2/access/",
        )
    }

    #[test]
    fn test_authorization_uri_encodes_params() {
        let uri = client("https://compute.studio/")
            .authorization_uri("abc123")
            .unwrap();
        let parsed = Url::parse(&uri).unwrap();

        assert_eq!(parsed.path(), "/o/authorize/");
        let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            params,
            vec![
                ("response_type".to_string(), "code".to_string()),
                ("client_id".to_string(), "client-id".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://localhost:8000/oauth2/access/".to_string()
                ),
                ("state".to_string(), "abc123".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/o/token/")
                    .x_www_form_urlencoded_tuple("grant_type", "authorization_code")
                    .x_www_form_urlencoded_tuple("code", "the-code")
                    .x_www_form_urlencoded_tuple("client_secret", "client-secret");
                then.status(200).json_body(json!({
                    "access_token": "access",
                    "expires_in": 3600,
                    "token_type": "Bearer",
                    "scope": "read write",
                    "refresh_token": "refresh"
                }));
            })
            .await;

        let response = client(&server.base_url())
            .exchange_code("the-code")
            .await
            .unwrap();

        token_mock.assert_async().await;
        assert_eq!(response.access_token, "access");

        let before = Utc::now();
        let token = response.into_token();
        assert!(token.expires_at > before + ChronoDuration::seconds(3590));
    }

    #[tokio::test]
    async fn test_exchange_code_failure_is_authentication_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/o/token/");
                then.status(401).json_body(json!({"error": "invalid_grant"}));
            })
            .await;

        let err = client(&server.base_url())
            .exchange_code("bad")
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_me_rejects_anonymous_users() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users/me/")
                    .header("Authorization", "Bearer anon-token");
                then.status(200)
                    .json_body(json!({"username": "", "status": "anon"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users/me/")
                    .header("Authorization", "Bearer good-token");
                then.status(200)
                    .json_body(json!({"username": "hdoupe", "status": "profile"}));
            })
            .await;

        let oauth = client(&server.base_url());
        assert!(matches!(
            oauth.me("anon-token").await.unwrap_err(),
            StitchError::Authentication { .. }
        ));
        let user = oauth.me("good-token").await.unwrap();
        assert_eq!(user.username, "hdoupe");
    }
}
