use async_trait::async_trait;

use crate::Result;

/// Port for downloading received media.
///
/// Implementations should apply their own request timeout; the sticker
/// workflow additionally bounds the whole call.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
