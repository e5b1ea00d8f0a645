//! Disk-backed cache layer.
//!
//! One file per fingerprint, named `<lowercase hex>.part`, holding the
//! asset's cached fragments as concatenated records of
//! `(offset: u64 BE, length: u64 BE, bytes…)`. The top bit of the length
//! field records that the fragment reaches end-of-file, so a rebuilt index
//! can still answer whole-file queries. Fills are coalesced in memory and
//! the file is rewritten atomically; startup indexes the directory from
//! record headers alone, and fragment bodies are read on demand.

use crate::layer::{CacheLayer, NextLayer, SharedLayer};
use crate::map::CacheMap;
use crate::policy::CachePolicy;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use strata_core::{DenseData, Fingerprint, Range, SparseData, Uri};
use strata_storage::{BlobStore, StorageResult};

const HEADER_LEN: u64 = 16;
const EOF_FLAG: u64 = 1 << 63;

/// Location of one fragment inside a `.part` file.
#[derive(Clone, Debug)]
struct FragmentMeta {
    start: u64,
    len: u64,
    eof: bool,
    body_at: u64,
}

impl FragmentMeta {
    fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Per-fingerprint index entry: the file key plus what it holds.
#[derive(Clone, Debug)]
struct DiskEntry {
    key: String,
    fragments: Vec<FragmentMeta>,
}

impl DiskEntry {
    /// The fragment covering `range`, if any. Fragments are disjoint,
    /// non-adjacent and sorted, so a contiguous range is covered by exactly
    /// one of them.
    fn covering(&self, range: &Range) -> Option<&FragmentMeta> {
        let frag = self
            .fragments
            .iter()
            .rev()
            .find(|f| f.start <= range.start())?;
        if range.start() > frag.end() {
            return None;
        }
        if range.goes_to_eof() && !frag.eof {
            return None;
        }
        (range.end() <= frag.end()).then_some(frag)
    }
}

fn part_key(id: &Fingerprint) -> String {
    format!("{}.part", id.to_hex())
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn split_len(raw: u64) -> (u64, bool) {
    (raw & !EOF_FLAG, raw & EOF_FLAG != 0)
}

fn encode_fragments(sparse: &SparseData) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        (sparse.total_bytes() + HEADER_LEN * sparse.fragment_count() as u64) as usize,
    );
    for frag in sparse.iter() {
        buf.put_u64(frag.start());
        let mut len = frag.len() as u64;
        if frag.is_eof() {
            len |= EOF_FLAG;
        }
        buf.put_u64(len);
        buf.extend_from_slice(frag.as_slice());
    }
    buf.freeze()
}

/// Parse a full fragment file. Trailing truncated records are ignored.
fn decode_fragments(raw: &Bytes) -> SparseData {
    let mut sparse = SparseData::new();
    let mut pos = 0u64;
    let total = raw.len() as u64;
    while pos + HEADER_LEN <= total {
        let header = &raw[pos as usize..(pos + HEADER_LEN) as usize];
        let start = read_u64(&header[..8]);
        let (len, eof) = split_len(read_u64(&header[8..]));
        let body_at = pos + HEADER_LEN;
        let Some(body_end) = body_at.checked_add(len) else {
            break;
        };
        if body_end > total {
            break;
        }
        let body = raw.slice(body_at as usize..body_end as usize);
        let data = if eof {
            DenseData::with_eof(start, body)
        } else {
            DenseData::new(start, body)
        };
        sparse.insert(data);
        pos = body_end;
    }
    sparse
}

/// Fragment locations for a sparse set as `encode_fragments` lays them out.
fn metas_for(sparse: &SparseData) -> Vec<FragmentMeta> {
    let mut metas = Vec::with_capacity(sparse.fragment_count());
    let mut pos = 0u64;
    for frag in sparse.iter() {
        let body_at = pos + HEADER_LEN;
        metas.push(FragmentMeta {
            start: frag.start(),
            len: frag.len() as u64,
            eof: frag.is_eof(),
            body_at,
        });
        pos = body_at + frag.len() as u64;
    }
    metas
}

/// Cache layer persisting fragments through a [`BlobStore`].
pub struct DiskCache {
    map: CacheMap<DiskEntry>,
    store: Arc<dyn BlobStore>,
    next: NextLayer,
}

impl DiskCache {
    /// Open the cache, rebuilding the index from the store's directory
    /// listing. Bodies are not loaded; only record headers are scanned.
    pub async fn open(
        policy: Arc<dyn CachePolicy>,
        store: Arc<dyn BlobStore>,
        next: Option<SharedLayer>,
    ) -> StorageResult<Arc<Self>> {
        let cache = Arc::new(Self {
            map: CacheMap::new(policy),
            store,
            next: NextLayer::new(next),
        });
        cache.rebuild_index().await?;
        Ok(cache)
    }

    async fn rebuild_index(&self) -> StorageResult<()> {
        let keys = self.store.list().await?;
        let mut found = Vec::new();
        for key in keys {
            let Some(hex) = key.strip_suffix(".part") else {
                continue;
            };
            let Ok(id) = Fingerprint::from_hex(hex) else {
                continue;
            };
            match self.scan_fragments(&key).await {
                Ok(fragments) if !fragments.is_empty() => found.push((id, key, fragments)),
                Ok(_) => {
                    let _ = self.store.delete(&key).await;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "unreadable cache file, removing");
                    let _ = self.store.delete(&key).await;
                }
            }
        }

        let stale = {
            let mut writer = self.map.write();
            for (id, key, fragments) in found {
                let bytes: u64 = fragments.iter().map(|f| f.len).sum();
                writer.insert(id, DiskEntry { key, fragments }, bytes);
            }
            // Trim anything a previous run left beyond the budget.
            writer.allocate(0);
            writer.take_evicted()
        };
        for (_, entry) in stale {
            let _ = self.store.delete(&entry.key).await;
        }
        Ok(())
    }

    /// Read record headers only, skipping over bodies. Stops at the first
    /// truncated record.
    async fn scan_fragments(&self, key: &str) -> StorageResult<Vec<FragmentMeta>> {
        let file_size = self.store.size(key).await?;
        let mut metas = Vec::new();
        let mut pos = 0u64;
        while pos + HEADER_LEN <= file_size {
            let header = self.store.read_range(key, pos, pos + HEADER_LEN).await?;
            let start = read_u64(&header[..8]);
            let (len, eof) = split_len(read_u64(&header[8..]));
            let body_at = pos + HEADER_LEN;
            let Some(body_end) = body_at.checked_add(len) else {
                break;
            };
            if body_end > file_size {
                break;
            }
            metas.push(FragmentMeta {
                start,
                len,
                eof,
                body_at,
            });
            pos = body_end;
        }
        Ok(metas)
    }

    async fn load_sparse(&self, key: &str) -> StorageResult<SparseData> {
        match self.store.read(key).await {
            Ok(raw) => Ok(decode_fragments(&raw)),
            Err(e) if e.is_not_found() => Ok(SparseData::new()),
            Err(e) => Err(e),
        }
    }

    async fn delete_entries(&self, entries: Vec<(Fingerprint, DiskEntry)>) {
        for (_, entry) in entries {
            if let Err(e) = self.store.delete(&entry.key).await {
                if !e.is_not_found() {
                    tracing::warn!(key = %entry.key, error = %e, "failed to delete evicted cache file");
                }
            }
        }
    }
}

#[async_trait]
impl CacheLayer for DiskCache {
    async fn get_data(&self, uri: &Uri, range: Range) -> Option<SparseData> {
        let id = uri.fingerprint();

        // Copy the fragment location out; the lock is never held across I/O.
        let local = {
            let reader = self.map.read();
            reader.get(&id).and_then(|entry| {
                entry.covering(&range).map(|frag| {
                    reader.touch(&id);
                    (entry.key.clone(), frag.clone())
                })
            })
        };
        if let Some((key, frag)) = local {
            let skip = range.start() - frag.start;
            let read = self
                .store
                .read_range(&key, frag.body_at + skip, frag.body_at + frag.len)
                .await;
            match read {
                Ok(body) => {
                    tracing::debug!(id = %id, range = %range, "disk cache hit");
                    let data = if frag.eof {
                        DenseData::with_eof(range.start(), body)
                    } else {
                        DenseData::new(range.start(), body)
                    };
                    return Some(SparseData::from_dense(data));
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "disk cache read failed, treating entry as evicted");
                    let dropped = {
                        let mut writer = self.map.write();
                        writer.erase(&id);
                        writer.take_evicted()
                    };
                    self.delete_entries(dropped).await;
                }
            }
        }

        let next = self.next.get()?;
        let fetched = next.get_data(uri, range).await?;
        for frag in fetched.iter() {
            self.populate_cache(&id, frag).await;
        }
        Some(fetched)
    }

    async fn purge(&self, id: &Fingerprint) {
        let dropped = {
            let mut writer = self.map.write();
            writer.erase(id);
            writer.take_evicted()
        };
        self.delete_entries(dropped).await;
        if let Some(next) = self.next.get() {
            next.purge(id).await;
        }
    }

    fn set_next(&self, next: Option<SharedLayer>) {
        self.next.set(next);
    }

    async fn populate_cache(&self, id: &Fingerprint, data: &DenseData) {
        if data.is_empty() {
            return;
        }
        let key = part_key(id);
        let mut sparse = match self.load_sparse(&key).await {
            Ok(sparse) => sparse,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "disk cache read failed, dropping fill");
                return;
            }
        };
        sparse.insert(data.clone());

        // Admission under the policy before touching the file.
        let (admitted, evicted) = {
            let mut writer = self.map.write();
            // The entry being grown must not be the eviction victim.
            writer.touch(id);
            let admitted = writer.allocate(data.len() as u64);
            (admitted, writer.take_evicted())
        };
        self.delete_entries(evicted).await;
        if !admitted {
            tracing::debug!(id = %id, size = data.len(), "fill exceeds disk budget, not caching");
            return;
        }

        if let Err(e) = self.store.write_atomic(&key, encode_fragments(&sparse)).await {
            tracing::warn!(id = %id, error = %e, "disk cache write failed, dropping fill");
            return;
        }

        let fragments = metas_for(&sparse);
        let bytes = sparse.total_bytes();
        let mut writer = self.map.write();
        if !writer.insert(
            *id,
            DiskEntry {
                key: key.clone(),
                fragments: fragments.clone(),
            },
            bytes,
        ) {
            if let Some(entry) = writer.get_mut(id) {
                entry.fragments = fragments;
            }
        }
        writer.update(id, bytes);
    }

    async fn shutdown(&self) {
        // All disk work is awaited inline by the requesting task, so there
        // is nothing of our own to flush.
        if let Some(next) = self.next.get() {
            next.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LruPolicy;
    use strata_storage::FilesystemStore;
    use tempfile::TempDir;

    fn asset(body: &[u8]) -> (Fingerprint, Uri, DenseData) {
        let id = Fingerprint::compute(body);
        let uri = Uri::new(id, "http://example.com/").unwrap();
        let data = DenseData::with_eof(0, Bytes::copy_from_slice(body));
        (id, uri, data)
    }

    async fn open_cache(dir: &TempDir, budget: u64) -> Arc<DiskCache> {
        let store = Arc::new(FilesystemStore::new(dir.path()).await.unwrap());
        DiskCache::open(Arc::new(LruPolicy::new(budget)), store, None)
            .await
            .unwrap()
    }

    #[test]
    fn test_fragment_codec_roundtrip() {
        let mut sparse = SparseData::new();
        sparse.insert(DenseData::new(2, Bytes::from_static(b"abcd")));
        sparse.insert(DenseData::with_eof(10, Bytes::from_static(b"tail")));

        let encoded = encode_fragments(&sparse);
        let decoded = decode_fragments(&encoded);
        assert_eq!(decoded.fragment_count(), 2);
        assert_eq!(decoded.data_at(2), Some(b"abcd".as_ref()));
        assert_eq!(decoded.data_at(10), Some(b"tail".as_ref()));
        assert!(decoded.contains_range(&Range::from_offset(10)));
        assert!(!decoded.contains_range(&Range::from_offset(2)));
    }

    #[test]
    fn test_decode_ignores_truncated_tail() {
        let mut sparse = SparseData::new();
        sparse.insert(DenseData::new(0, Bytes::from_static(b"intact")));
        let mut raw = BytesMut::from(&encode_fragments(&sparse)[..]);
        // A record header claiming more bytes than the file holds.
        raw.put_u64(100);
        raw.put_u64(999);
        raw.extend_from_slice(b"short");

        let decoded = decode_fragments(&raw.freeze());
        assert_eq!(decoded.fragment_count(), 1);
        assert_eq!(decoded.data_at(0), Some(b"intact".as_ref()));
    }

    #[tokio::test]
    async fn test_fill_then_serve_without_next() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir, 32000).await;
        let (id, uri, data) = asset(b"disk cached body");

        assert!(cache.get_data(&uri, Range::whole()).await.is_none());
        cache.populate_cache(&id, &data).await;

        let got = cache.get_data(&uri, Range::whole()).await.unwrap();
        assert_eq!(got.data_at(0), Some(b"disk cached body".as_ref()));

        // One flat file named after the fingerprint.
        let name = format!("{}.part", id.to_hex());
        assert!(dir.path().join(&name).exists());
    }

    #[tokio::test]
    async fn test_sub_range_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir, 32000).await;
        let (id, uri, data) = asset(b"0123456789");
        cache.populate_cache(&id, &data).await;

        let got = cache.get_data(&uri, Range::bounds(2, 6)).await.unwrap();
        assert_eq!(got.data_at(2), Some(b"23456789".as_ref()));
        assert!(got.contains_range(&Range::bounds(2, 6)));
    }

    #[tokio::test]
    async fn test_reopen_serves_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let (id, uri, data) = asset(b"survives restart");
        {
            let cache = open_cache(&dir, 32000).await;
            cache.populate_cache(&id, &data).await;
        }

        // Fresh index rebuilt from the directory; whole-file coverage must
        // survive because the end-of-file flag is persisted.
        let cache = open_cache(&dir, 32000).await;
        let got = cache.get_data(&uri, Range::whole()).await.unwrap();
        assert_eq!(got.data_at(0), Some(b"survives restart".as_ref()));
        assert_eq!(Fingerprint::compute(got.data_at(0).unwrap()), id);
    }

    #[tokio::test]
    async fn test_reopen_merges_fills() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"abcdefghijklmn";
        let id = Fingerprint::compute(body);
        let uri = Uri::new(id, "http://example.com/").unwrap();
        {
            let cache = open_cache(&dir, 32000).await;
            cache
                .populate_cache(&id, &DenseData::new(2, Bytes::copy_from_slice(&body[2..8])))
                .await;
            cache
                .populate_cache(&id, &DenseData::new(6, Bytes::copy_from_slice(&body[6..14])))
                .await;
        }

        let cache = open_cache(&dir, 32000).await;
        let got = cache.get_data(&uri, Range::bounds(2, 14)).await.unwrap();
        assert_eq!(got.data_at(2), Some(&body[2..14]));
    }

    #[tokio::test]
    async fn test_purge_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir, 32000).await;
        let (id, uri, data) = asset(b"to be purged");
        cache.populate_cache(&id, &data).await;

        cache.purge(&id).await;
        assert!(cache.get_data(&uri, Range::whole()).await.is_none());
        assert!(!dir.path().join(format!("{}.part", id.to_hex())).exists());
    }

    #[tokio::test]
    async fn test_oversized_fill_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir, 8).await;
        let (id, uri, data) = asset(b"larger than the entire disk budget");
        cache.populate_cache(&id, &data).await;

        assert!(cache.get_data(&uri, Range::whole()).await.is_none());
        assert!(!dir.path().join(format!("{}.part", id.to_hex())).exists());
    }

    #[tokio::test]
    async fn test_read_failure_treated_as_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir, 32000).await;
        let (id, uri, data) = asset(b"goes missing");
        cache.populate_cache(&id, &data).await;

        // Remove the file behind the cache's back.
        std::fs::remove_file(dir.path().join(format!("{}.part", id.to_hex()))).unwrap();

        // No next layer, so the dropped entry surfaces as a miss.
        assert!(cache.get_data(&uri, Range::whole()).await.is_none());
        assert!(cache.get_data(&uri, Range::whole()).await.is_none());
    }

    #[tokio::test]
    async fn test_startup_trims_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = open_cache(&dir, 32000).await;
            for n in 0..4u8 {
                let body = vec![n; 100];
                let id = Fingerprint::compute(&body);
                cache
                    .populate_cache(&id, &DenseData::with_eof(0, Bytes::from(body)))
                    .await;
            }
        }

        // Reopen with a budget that only fits part of what is on disk.
        let cache = open_cache(&dir, 250).await;
        drop(cache);
        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(left.len() <= 2, "expected trimmed cache dir, got {}", left.len());
    }
}
