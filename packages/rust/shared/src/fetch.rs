//! The page-fetching seam shared by discovery and retrieval.

use std::future::Future;

use crate::error::Result;

/// Fetches the rendered source of a remote page.
///
/// Implementations map page-load timeouts to [`HansardError::Timeout`] so that
/// callers can distinguish them from other transport failures.
///
/// [`HansardError::Timeout`]: crate::HansardError::Timeout
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its body as text.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}
