//! The range-capable fetcher contract.

use async_trait::async_trait;
use strata_core::{DenseData, Range, Uri};
use thiserror::Error;

/// Errors from origin fetches and name lookup.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("origin returned status {status}")]
    Status { status: u16 },

    #[error("request aborted")]
    Aborted,

    #[error("name lookup failed: {0}")]
    Lookup(String),

    #[error(transparent)]
    Core(#[from] strata_core::Error),
}

/// Result type for fetcher operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Something that can produce a dense run of an asset's bytes from an
/// origin.
///
/// Ranges are byte-accurate half-open intervals; a whole-file range from
/// offset zero fetches the entire body. The returned buffer records its own
/// offset and whether it is known to reach end-of-file.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, uri: &Uri, range: Range) -> FetchResult<DenseData>;
}
