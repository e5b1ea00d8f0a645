//! HTTP fetcher backed by reqwest.

use crate::fetcher::{FetchError, FetchResult, Fetcher};
use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::time::Duration;
use strata_core::{DenseData, NetworkConfig, Range, Uri};

/// Fetcher issuing ranged GET requests against HTTP origins.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the configured timeouts.
    pub fn new(config: &NetworkConfig) -> FetchResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    /// Build a fetcher around an existing client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// The `Range` header for a request; whole-file requests carry none.
    fn range_header(range: &Range) -> Option<String> {
        if range.goes_to_eof() {
            (range.start() > 0).then(|| format!("bytes={}-", range.start()))
        } else {
            Some(format!(
                "bytes={}-{}",
                range.start(),
                range.end().saturating_sub(1)
            ))
        }
    }
}

/// Total size from a `Content-Range: bytes a-b/total` header.
fn content_range_total(value: &str) -> Option<u64> {
    value.strip_prefix("bytes ")?.split('/').nth(1)?.parse().ok()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &Uri, range: Range) -> FetchResult<DenseData> {
        let mut request = self.http.get(uri.to_url());
        if let Some(header) = Self::range_header(&range) {
            request = request.header(RANGE, header);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total);
        let partial = status == StatusCode::PARTIAL_CONTENT;
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if partial {
            let start = range.start();
            let end = start + body.len() as u64;
            let eof = range.goes_to_eof() || total.is_some_and(|t| end >= t);
            Ok(if eof {
                DenseData::with_eof(start, body)
            } else {
                DenseData::new(start, body)
            })
        } else {
            // The origin ignored the range request and sent the full body.
            Ok(DenseData::with_eof(0, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_forms() {
        assert_eq!(HttpFetcher::range_header(&Range::whole()), None);
        assert_eq!(
            HttpFetcher::range_header(&Range::from_offset(6)),
            Some("bytes=6-".to_string())
        );
        assert_eq!(
            HttpFetcher::range_header(&Range::bounds(2, 6)),
            Some("bytes=2-5".to_string())
        );
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("bytes 2-5/10"), Some(10));
        assert_eq!(content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(content_range_total("bytes 2-5/*"), None);
        assert_eq!(content_range_total("items 2-5/10"), None);
    }
}
