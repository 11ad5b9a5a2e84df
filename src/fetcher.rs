//! Page fetcher abstraction for the listing endpoint

use crate::{
    error::FetchError,
    types::{AuthContext, PageRequest, PageResult},
};
use async_trait::async_trait;

/// Trait for page fetchers
///
/// An implementation performs exactly one request per call and classifies
/// failures; it never retries. Retry policy, if any, belongs to the caller.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches one page of listings
    ///
    /// # Arguments
    /// * `request` - Target, 1-based page index and filters
    /// * `auth` - Opaque authorization forwarded with the request
    ///
    /// # Returns
    /// The parsed page, or a classified [`FetchError`]
    async fn fetch(&self, request: &PageRequest, auth: &AuthContext)
        -> Result<PageResult, FetchError>;

    /// Returns the name of this fetcher
    fn fetcher_name(&self) -> &'static str;
}
