//! Two-tier cache store contract and an in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use nav_core::{Body, Request, Response, ResponseType};
use tokio::sync::RwLock;
use url::Url;

use crate::config::JSON_PARTITION_SUFFIX;
use crate::error::{CacheError, CacheResult};

/// One named cache partition.
#[async_trait]
pub trait CachePartition: Send + Sync {
    /// The stored response for a request, if any. Every call yields a
    /// response with its own unconsumed body.
    async fn match_request(&self, request: &Request) -> CacheResult<Option<Response>>;

    /// Store a response for a request, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> CacheResult<()>;
}

/// A shared store of named partitions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a partition, creating it if needed.
    async fn open_partition(&self, name: &str) -> CacheResult<Arc<dyn CachePartition>>;

    /// Names of every partition.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Delete a partition. Returns whether it existed.
    async fn delete(&self, name: &str) -> CacheResult<bool>;
}

/// The partition a request reads from and writes to.
///
/// Requests negotiating for JSON use the `_json` variant so rendered and
/// JSON representations of one URL never share a slot.
pub fn partition_name(cache_name: &str, request: &Request) -> String {
    if request.accepts_json() {
        format!("{cache_name}{JSON_PARTITION_SUFFIX}")
    } else {
        cache_name.to_string()
    }
}

fn entry_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[derive(Debug, Clone)]
struct CachedEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    kind: ResponseType,
    url: Option<Url>,
}

impl CachedEntry {
    fn to_response(&self) -> Response {
        let mut response = Response::new(self.status).with_body(Body::from_bytes(self.body.clone()));
        response.headers = self.headers.clone();
        response.kind = self.kind;
        response.url = self.url.clone();
        response
    }
}

#[derive(Debug, Default)]
struct StoreStats {
    opens: Mutex<Vec<String>>,
    matches: AtomicU64,
    puts: AtomicU64,
}

#[derive(Debug)]
struct InMemoryPartition {
    entries: RwLock<HashMap<String, CachedEntry>>,
    stats: Arc<StoreStats>,
}

#[async_trait]
impl CachePartition for InMemoryPartition {
    async fn match_request(&self, request: &Request) -> CacheResult<Option<Response>> {
        self.stats.matches.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.read().await;
        Ok(entries.get(&entry_key(&request.url)).map(CachedEntry::to_response))
    }

    async fn put(&self, request: &Request, response: Response) -> CacheResult<()> {
        if !request.is_get() {
            return Err(CacheError::Store(format!(
                "only GET requests can be cached, got {}",
                request.method
            )));
        }
        let body = response.bytes().await?;
        let entry = CachedEntry {
            status: response.status,
            headers: response.headers,
            body,
            kind: response.kind,
            url: response.url,
        };
        self.entries.write().await.insert(entry_key(&request.url), entry);
        self.stats.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-process cache store.
///
/// Clones share the same partitions. Partition opens, matches and puts are
/// counted so callers can observe which tier was touched.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    partitions: Arc<RwLock<HashMap<String, Arc<InMemoryPartition>>>>,
    stats: Arc<StoreStats>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every partition name opened so far, in order.
    pub fn opened_partitions(&self) -> Vec<String> {
        self.stats.opens.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of `match_request` calls across partitions.
    pub fn match_count(&self) -> u64 {
        self.stats.matches.load(Ordering::SeqCst)
    }

    /// Number of successful `put` calls across partitions.
    pub fn put_count(&self) -> u64 {
        self.stats.puts.load(Ordering::SeqCst)
    }

    /// Whether a partition holds an entry for `url`.
    pub async fn contains(&self, partition: &str, url: &Url) -> bool {
        match self.partitions.read().await.get(partition) {
            Some(p) => p.entries.read().await.contains_key(&entry_key(url)),
            None => false,
        }
    }

    /// Number of entries in a partition.
    pub async fn entry_count(&self, partition: &str) -> usize {
        match self.partitions.read().await.get(partition) {
            Some(p) => p.entries.read().await.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn open_partition(&self, name: &str) -> CacheResult<Arc<dyn CachePartition>> {
        self.stats
            .opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());

        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryPartition {
                    entries: RwLock::new(HashMap::new()),
                    stats: self.stats.clone(),
                })
            })
            .clone();
        Ok(partition)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        Ok(self.partitions.write().await.remove(name).is_some())
    }
}
