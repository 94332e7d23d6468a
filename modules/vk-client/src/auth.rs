use std::fmt;

use async_trait::async_trait;

use crate::error::{Result, VkError};
use crate::types::TokenResponse;

/// Performs an authentication handshake and yields a fresh access token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<String>;
}

/// A pre-issued service or user token. Re-authenticating hands back the same token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn authenticate(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub app_id: String,
    pub app_secret: String,
    pub scope: Vec<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[redacted]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Direct-auth password grant against the OAuth endpoint.
pub struct PasswordAuthenticator {
    client: reqwest::Client,
    oauth_url: String,
    version: String,
    credentials: Credentials,
}

impl PasswordAuthenticator {
    pub fn new(
        oauth_url: impl Into<String>,
        version: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            oauth_url: oauth_url.into(),
            version: version.into(),
            credentials,
        }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/token", self.oauth_url.trim_end_matches('/'));
        let scope = self.credentials.scope.join(",");

        tracing::info!(username = %self.credentials.username, "Authenticating against VK");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "password"),
                ("client_id", self.credentials.app_id.as_str()),
                ("client_secret", self.credentials.app_secret.as_str()),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
                ("scope", scope.as_str()),
                ("v", self.version.as_str()),
            ])
            .send()
            .await?;

        let body = resp.text().await?;
        let token = token_from_body(&body)?;
        tracing::info!("VK session established");
        Ok(token)
    }
}

/// Extract the access token from a password-grant response body.
fn token_from_body(body: &str) -> Result<String> {
    let body: TokenResponse = serde_json::from_str(body)?;
    match (body.access_token, body.error) {
        (Some(token), _) => {
            tracing::debug!(user_id = ?body.user_id, expires_in = ?body.expires_in, "Token issued");
            Ok(token)
        }
        (None, Some(error)) => Err(VkError::Auth(format!(
            "{error}: {}",
            body.error_description.unwrap_or_default()
        ))),
        (None, None) => Err(VkError::Auth("token response has no access_token".to_string())),
    }
}
