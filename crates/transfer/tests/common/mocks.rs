use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{DenseData, Fingerprint, Range, Uri};
use strata_transfer::{FetchError, FetchResult, Fetcher};

/// Origin stand-in serving in-memory assets keyed by fingerprint.
///
/// Optional knobs: an artificial delay before responding, corrupted bodies
/// (first byte flipped) and unconditional transport failure.
pub struct MockFetcher {
    assets: Mutex<HashMap<Fingerprint, Bytes>>,
    fetch_count: AtomicUsize,
    delay: Option<Duration>,
    corrupt: bool,
    fail: bool,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Self::build(None, false, false)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Self::build(Some(delay), false, false)
    }

    pub fn corrupting() -> Arc<Self> {
        Self::build(None, true, false)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(None, false, true)
    }

    fn build(delay: Option<Duration>, corrupt: bool, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            assets: Mutex::new(HashMap::new()),
            fetch_count: AtomicUsize::new(0),
            delay,
            corrupt,
            fail,
        })
    }

    /// Register an asset body; returns its fingerprint.
    pub fn add_asset(&self, body: impl Into<Bytes>) -> Fingerprint {
        let body = body.into();
        let id = Fingerprint::compute(&body);
        self.assets.lock().unwrap().insert(id, body);
        id
    }

    /// How many times fetch() has been invoked.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, uri: &Uri, range: Range) -> FetchResult<DenseData> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(FetchError::Transport("injected failure".to_string()));
        }

        let body = self
            .assets
            .lock()
            .unwrap()
            .get(&uri.fingerprint())
            .cloned()
            .ok_or(FetchError::Status { status: 404 })?;
        let body = if self.corrupt {
            let mut flipped = body.to_vec();
            if let Some(first) = flipped.first_mut() {
                *first ^= 0xff;
            }
            Bytes::from(flipped)
        } else {
            body
        };

        // Byte-accurate range semantics: truncate at end of file.
        let total = body.len() as u64;
        let start = range.start().min(total);
        let end = if range.goes_to_eof() {
            total
        } else {
            range.end().min(total)
        };
        let slice = body.slice(start as usize..end as usize);
        Ok(if end >= total {
            DenseData::with_eof(start, slice)
        } else {
            DenseData::new(start, slice)
        })
    }
}
