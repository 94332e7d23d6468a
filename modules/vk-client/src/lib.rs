pub mod auth;
pub mod error;
pub mod executor;
pub mod transport;
pub mod types;

use std::sync::Arc;

pub use auth::{Authenticator, Credentials, PasswordAuthenticator, StaticToken};
pub use error::{Result, VkError};
pub use executor::{is_session_expired, RequestExecutor, SESSION_EXPIRED_CODE};
pub use transport::{ReqwestTransport, Transport};
pub use types::{ApiRequest, ApiResponse, HttpMethod};

pub const API_URL: &str = "https://api.vk.com/method";
pub const OAUTH_URL: &str = "https://oauth.vk.com";
pub const DEFAULT_API_VERSION: &str = "5.64";

/// Typed VK method calls on top of a [`RequestExecutor`].
///
/// Methods return the raw [`ApiResponse`]; response shape checks stay with
/// the caller, which knows what it asked for.
pub struct VkClient {
    executor: RequestExecutor,
}

impl VkClient {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Client over a pre-issued access token.
    pub fn with_token(token: String, version: &str) -> Self {
        let transport = Arc::new(ReqwestTransport::new(API_URL));
        let auth = Arc::new(StaticToken::new(token.clone()));
        Self::new(RequestExecutor::with_token(transport, auth, version, token))
    }

    /// Client that logs in with the password grant on first use and on session expiry.
    pub fn with_password(credentials: Credentials, version: &str) -> Self {
        let transport = Arc::new(ReqwestTransport::new(API_URL));
        let auth = Arc::new(PasswordAuthenticator::new(OAUTH_URL, version, credentials));
        Self::new(RequestExecutor::new(transport, auth, version))
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// One page of wall posts. `query` carries `owner_id`, `count`, `offset` and any extras.
    pub async fn wall_get(&self, query: &[(String, String)]) -> Result<ApiResponse> {
        let request = ApiRequest::get("wall.get").params(query.iter().map(|(k, v)| (k, v)));
        self.executor.send(&request).await
    }

    /// Profile listing for one or more comma-separated user ids.
    pub async fn users_get(&self, user_ids: &str) -> Result<ApiResponse> {
        let request = ApiRequest::get("users.get")
            .param("user_ids", user_ids)
            .param("fields", "blacklisted");
        self.executor.send(&request).await
    }

    pub async fn wall_post(
        &self,
        owner_id: i64,
        message: &str,
        attachments: &[String],
    ) -> Result<ApiResponse> {
        let mut request = ApiRequest::post("wall.post")
            .param("owner_id", owner_id)
            .param("message", message);
        if !attachments.is_empty() {
            request = request.param("attachments", attachments.join(","));
        }
        self.executor.send(&request).await
    }

    pub async fn groups_search(&self, city_id: i64, query: &str) -> Result<ApiResponse> {
        let request = ApiRequest::post("groups.search")
            .param("q", query)
            .param("city_id", city_id)
            .param("sort", 2)
            .param("count", 500);
        self.executor.send(&request).await
    }

    pub async fn groups_get_by_id(&self, group_ids: &[String]) -> Result<ApiResponse> {
        let request = ApiRequest::post("groups.getById").param("group_ids", group_ids.join(","));
        self.executor.send(&request).await
    }

    pub async fn board_get_topics(&self, group_id: i64) -> Result<ApiResponse> {
        let request = ApiRequest::post("board.getTopics").param("group_id", group_id);
        self.executor.send(&request).await
    }

    /// City lookup within Russia (`country_id = 1`).
    pub async fn database_get_cities(&self, query: &str) -> Result<ApiResponse> {
        let request = ApiRequest::post("database.getCities")
            .param("country_id", 1)
            .param("q", query);
        self.executor.send(&request).await
    }
}
