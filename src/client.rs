use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::PageSource;
use crate::model::{Batch, CacheKey, ViewSelector};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// A newer request superseded this one; the caller drops it silently.
    #[error("request superseded")]
    Canceled,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Identifies one `fetch_batch` or `fetch_group` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
pub struct Fetched {
    pub ticket: Ticket,
    pub key: CacheKey,
    pub outcome: Result<Batch, FetchError>,
}

/// Append-only batch cache. The first writer of a key wins.
#[derive(Default)]
pub struct BatchCache {
    entries: RwLock<HashMap<CacheKey, Batch>>,
}

impl BatchCache {
    pub fn get(&self, key: &CacheKey) -> Option<Batch> {
        self.entries.read().get(key).cloned()
    }

    /// Insert `batch` only while `still_current` holds, checked under the write
    /// lock. Returns the batch now cached for the key, or `None` when the
    /// writer was superseded.
    pub fn commit_if(&self, batch: Batch, still_current: impl FnOnce() -> bool) -> Option<Batch> {
        let mut entries = self.entries.write();
        if !still_current() {
            return None;
        }
        Some(entries.entry(batch.key()).or_insert(batch).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Paginated fetcher with a session cache and single-flight supersession.
///
/// Every network-bound call takes a fresh flight token; a worker whose token
/// is no longer current when its response lands reports `Canceled` and leaves
/// the cache untouched. Cache hits are answered inline and do not take a
/// flight, so they never cancel anything.
pub struct FeedClient {
    source: Arc<dyn PageSource>,
    cache: Arc<BatchCache>,
    flight: Arc<AtomicU64>,
    next_ticket: AtomicU64,
    page_size: usize,
}

impl FeedClient {
    pub fn new(source: Arc<dyn PageSource>, page_size: usize) -> Self {
        Self {
            source,
            cache: Arc::new(BatchCache::default()),
            flight: Arc::new(AtomicU64::new(0)),
            next_ticket: AtomicU64::new(1),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn cached(&self, key: &CacheKey) -> Option<Batch> {
        self.cache.get(key)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Fetch one page; the outcome arrives on `reply` tagged with the ticket.
    pub fn fetch_batch(
        &self,
        selector: &ViewSelector,
        offset: usize,
        reply: &Sender<Fetched>,
    ) -> Ticket {
        self.fetch_group(selector, &[offset], reply)
    }

    /// Fetch several pages as one flight. Members never supersede each other.
    pub fn fetch_group(
        &self,
        selector: &ViewSelector,
        offsets: &[usize],
        reply: &Sender<Fetched>,
    ) -> Ticket {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        let mut misses = Vec::new();
        for &offset in offsets {
            let key = CacheKey::new(selector.clone(), offset);
            match self.cache.get(&key) {
                Some(batch) => {
                    debug!(selector = %key.selector, offset, "cache hit");
                    let _ = reply.send(Fetched {
                        ticket,
                        key,
                        outcome: Ok(batch),
                    });
                }
                None => misses.push(key),
            }
        }
        if misses.is_empty() {
            return ticket;
        }

        let flight = self.flight.fetch_add(1, Ordering::SeqCst) + 1;
        for key in misses {
            debug!(selector = %key.selector, offset = key.offset, flight, "fetching page");
            self.spawn_fetch(flight, ticket, key, reply.clone());
        }
        ticket
    }

    /// Synchronous convenience over `fetch_batch`.
    pub fn fetch_blocking(&self, selector: &ViewSelector, offset: usize) -> Result<Batch, FetchError> {
        let (tx, rx) = unbounded();
        self.fetch_batch(selector, offset, &tx);
        match rx.recv() {
            Ok(fetched) => fetched.outcome,
            Err(_) => Err(FetchError::Transport("fetch worker disconnected".into())),
        }
    }

    fn spawn_fetch(&self, flight: u64, ticket: Ticket, key: CacheKey, reply: Sender<Fetched>) {
        let source = self.source.clone();
        let cache = self.cache.clone();
        let current = self.flight.clone();
        let limit = self.page_size;
        thread::spawn(move || {
            let superseded = || current.load(Ordering::SeqCst) != flight;
            if superseded() {
                let _ = reply.send(Fetched {
                    ticket,
                    key,
                    outcome: Err(FetchError::Canceled),
                });
                return;
            }

            let outcome = match source.load_page(&key.selector, key.offset, limit) {
                Ok(records) => {
                    let batch = Batch {
                        selector: key.selector.clone(),
                        offset: key.offset,
                        records,
                    };
                    match cache.commit_if(batch, || !superseded()) {
                        Some(batch) => Ok(batch),
                        None => {
                            debug!(selector = %key.selector, offset = key.offset, "discarding superseded response");
                            Err(FetchError::Canceled)
                        }
                    }
                }
                Err(_) if superseded() => Err(FetchError::Canceled),
                Err(err) => {
                    warn!(selector = %key.selector, offset = key.offset, "page fetch failed: {err:#}");
                    Err(FetchError::Transport(format!("{err:#}")))
                }
            };
            let _ = reply.send(Fetched {
                ticket,
                key,
                outcome,
            });
        });
    }
}
