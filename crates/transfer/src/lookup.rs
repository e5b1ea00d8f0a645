//! Name lookup: resolving a user-facing URI to a fingerprint and a
//! canonical origin locator.

use crate::fetcher::{FetchError, FetchResult, Fetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use strata_core::{Fingerprint, Range, Uri};

/// A resolved name: the asset's fingerprint plus its canonical locator.
#[derive(Clone, Debug)]
pub struct NameResponse {
    pub fingerprint: Fingerprint,
    pub uri: Uri,
}

/// Translates an opaque user-facing URI into a [`NameResponse`].
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn lookup(&self, uri: &Uri) -> FetchResult<NameResponse>;
}

/// Name lookup over the fetcher: GET the URI, strip whitespace from the
/// body, resolve the remaining string against the request's context and
/// read its filename as a hex fingerprint.
pub struct FetcherNameLookup {
    fetcher: Arc<dyn Fetcher>,
}

impl FetcherNameLookup {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl NameLookup for FetcherNameLookup {
    async fn lookup(&self, uri: &Uri) -> FetchResult<NameResponse> {
        let body = self.fetcher.fetch(uri, Range::whole()).await?;
        let text: String = String::from_utf8_lossy(body.as_slice())
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if text.is_empty() {
            return Err(FetchError::Lookup(format!("empty response for {uri}")));
        }
        let resolved = uri.context().resolve(&text)?;
        let fingerprint = Fingerprint::from_hex(resolved.filename())?;
        tracing::debug!(name = %uri, resolved = %resolved, "name resolved");
        Ok(NameResponse {
            fingerprint,
            uri: resolved.with_fingerprint(fingerprint),
        })
    }
}

/// A name lookup that keeps a local cache in front of the real lookup.
/// The cache can also be filled by hand for names known ahead of time.
pub struct CachedNameLookup {
    inner: Arc<dyn NameLookup>,
    cache: RwLock<HashMap<String, NameResponse>>,
}

impl CachedNameLookup {
    pub fn new(inner: Arc<dyn NameLookup>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Pre-seed a resolution for the given URL.
    pub fn add_to_cache(&self, url: impl Into<String>, response: NameResponse) {
        self.cache
            .write()
            .expect("name cache lock poisoned")
            .insert(url.into(), response);
    }
}

#[async_trait]
impl NameLookup for CachedNameLookup {
    async fn lookup(&self, uri: &Uri) -> FetchResult<NameResponse> {
        let key = uri.to_url();
        {
            let cache = self.cache.read().expect("name cache lock poisoned");
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }
        let response = self.inner.lookup(uri).await?;
        self.cache
            .write()
            .expect("name cache lock poisoned")
            .insert(key, response.clone());
        Ok(response)
    }
}
