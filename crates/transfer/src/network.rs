//! The terminal transfer layer.
//!
//! NetworkTransfer is not a cache: it turns `get_data` calls into origin
//! fetches and hands the body to every requester waiting on the same
//! fingerprint. Upstream layers record the bytes as the result travels back
//! up the chain.

use crate::fetcher::Fetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use strata_cache::{CacheLayer, SharedLayer};
use strata_core::{DenseData, Fingerprint, Range, SparseData, Uri};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Requests outstanding against one fingerprint: every waiter shares the
/// single in-flight fetch.
#[derive(Default)]
struct PendingRequest {
    waiters: Vec<(Range, oneshot::Sender<Option<SparseData>>)>,
    in_flight: bool,
    task: Option<JoinHandle<()>>,
}

/// Terminal layer issuing fetches through the external fetcher,
/// deduplicating concurrent requests per fingerprint.
pub struct NetworkTransfer {
    inner: Arc<NetInner>,
}

struct NetInner {
    fetcher: Arc<dyn Fetcher>,
    // Guarded separately from any cache index so no lock is ever held while
    // a waiter is delivered.
    pending: Mutex<HashMap<Fingerprint, PendingRequest>>,
}

impl NetworkTransfer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(NetInner {
                fetcher,
                pending: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl NetInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<Fingerprint, PendingRequest>> {
        self.pending.lock().expect("pending request map poisoned")
    }

    /// Drive one fetch to completion and deliver every waiter registered
    /// for the fingerprint. Runs as a detached task so a cancelled
    /// requester cannot strand the others.
    async fn run_fetch(self: Arc<Self>, uri: Uri, range: Range) {
        let id = uri.fingerprint();
        let body = match self.fetcher.fetch(&uri, range).await {
            Ok(dense) => {
                // Integrity gate: a body covering the whole asset must hash
                // to the fingerprint it was requested under.
                if dense.is_eof() && dense.start() == 0 {
                    let digest = Fingerprint::compute(dense.as_slice());
                    if digest == id {
                        Some(dense)
                    } else {
                        tracing::warn!(
                            expected = %id,
                            actual = %digest,
                            "integrity check failed, discarding body"
                        );
                        None
                    }
                } else {
                    Some(dense)
                }
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "origin fetch failed");
                None
            }
        };

        let waiters = {
            let mut pending = self.lock_pending();
            pending.remove(&id).map(|r| r.waiters).unwrap_or_default()
        };
        // Deliver with no lock held. Waiters whose range the body does not
        // cover get a miss.
        for (wanted, tx) in waiters {
            let reply = body.as_ref().and_then(|dense| {
                dense
                    .range()
                    .contains(&wanted)
                    .then(|| SparseData::from_dense(dense.clone()))
            });
            let _ = tx.send(reply);
        }
    }
}

#[async_trait]
impl CacheLayer for NetworkTransfer {
    async fn get_data(&self, uri: &Uri, range: Range) -> Option<SparseData> {
        let id = uri.fingerprint();
        let (tx, rx) = oneshot::channel();

        let start_fetch = {
            let mut pending = self.inner.lock_pending();
            let record = pending.entry(id).or_default();
            record.waiters.push((range, tx));
            !std::mem::replace(&mut record.in_flight, true)
        };

        if start_fetch {
            tracing::debug!(uri = %uri, range = %range, "starting origin fetch");
            let handle = tokio::spawn(NetInner::run_fetch(
                Arc::clone(&self.inner),
                uri.clone(),
                range,
            ));
            let mut pending = self.inner.lock_pending();
            if let Some(record) = pending.get_mut(&id) {
                record.task = Some(handle);
            }
        } else {
            tracing::debug!(uri = %uri, range = %range, "joining in-flight fetch");
        }

        // A dropped sender (teardown, aborted fetch) reads as a miss.
        rx.await.unwrap_or(None)
    }

    async fn purge(&self, _id: &Fingerprint) {
        // Not a cache; purges affect future requests only and in-flight
        // fetches are left to complete.
    }

    fn set_next(&self, _next: Option<SharedLayer>) {
        // Terminal layer.
    }

    async fn populate_cache(&self, _id: &Fingerprint, _data: &DenseData) {
        // Not a cache; upstream layers record fills.
    }

    async fn shutdown(&self) {
        // Let in-flight fetches finish; their completions deliver every
        // registered waiter.
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut pending = self.inner.lock_pending();
                pending
                    .values_mut()
                    .filter_map(|record| record.task.take())
                    .collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
        // Anything still queued without a driver gets a miss.
        let leftovers = {
            let mut pending = self.inner.lock_pending();
            std::mem::take(&mut *pending)
        };
        for (_, record) in leftovers {
            for (_, tx) in record.waiters {
                let _ = tx.send(None);
            }
        }
    }
}
