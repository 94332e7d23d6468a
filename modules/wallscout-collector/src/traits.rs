// Trait seams for the collector's network dependencies.
//
// FeedFetcher: one wall page per call, raw body back; the collector owns shape checks.
// UserLookup: raw user listing for the explorer.
//
// Both are implemented by VkClient (auth and reauth handled by its executor)
// and by the mocks in `testing`.

use anyhow::Result;
use async_trait::async_trait;

use vk_client::VkClient;

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the wall page described by `query` and return the response body.
    async fn wall_page(&self, query: &[(String, String)]) -> Result<String>;
}

#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Fetch the user listing for `id` and return the response body.
    async fn user_listing(&self, id: &str) -> Result<String>;
}

#[async_trait]
impl FeedFetcher for VkClient {
    async fn wall_page(&self, query: &[(String, String)]) -> Result<String> {
        let response = self.wall_get(query).await?.ensure_success()?;
        Ok(response.body)
    }
}

#[async_trait]
impl UserLookup for VkClient {
    async fn user_listing(&self, id: &str) -> Result<String> {
        let response = self.users_get(id).await?.ensure_success()?;
        Ok(response.body)
    }
}
