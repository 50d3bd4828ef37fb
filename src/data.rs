use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::api;
use crate::model::{ImageRecord, ViewSelector};

/// Anything that can answer a page request for a view selector.
pub trait PageSource: Send + Sync {
    fn load_page(
        &self,
        selector: &ViewSelector,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>>;
}

pub struct HttpPageSource {
    client: Arc<api::Client>,
}

impl HttpPageSource {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PageSource for HttpPageSource {
    fn load_page(
        &self,
        selector: &ViewSelector,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>> {
        self.client
            .page(selector, offset, limit)
            .with_context(|| format!("fetch {selector} page at offset {offset}"))
    }
}

/// In-memory catalog used for offline browsing and tests.
///
/// The default feed is a seeded shuffle of the catalog, stable for the life of
/// the source. A similarity feed is a shuffle seeded by the reference id, with
/// the reference itself first; unknown references yield an empty feed.
pub struct MemoryPageSource {
    catalog: Vec<ImageRecord>,
    default_order: Vec<usize>,
    latency: Option<Duration>,
    failing: Mutex<HashSet<usize>>,
    requests: Mutex<Vec<(ViewSelector, usize)>>,
}

impl MemoryPageSource {
    pub fn new(catalog: Vec<ImageRecord>) -> Self {
        let mut default_order: Vec<usize> = (0..catalog.len()).collect();
        default_order.shuffle(&mut StdRng::seed_from_u64(0x5eed));
        Self {
            catalog,
            default_order,
            latency: None,
            failing: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `count` synthetic records with a spread of aspect ratios.
    pub fn demo(count: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(7);
        let catalog = (0..count)
            .map(|i| {
                let (width, height) = match rng.gen_range(0..4) {
                    0 => (1600, 1067),
                    1 => (1067, 1600),
                    2 => (1200, 1200),
                    _ => (rng.gen_range(800..2400), rng.gen_range(600..1800)),
                };
                ImageRecord::new(format!("https://images.local/{i:05}.jpg"), width, height)
                    .with_thumbnail(format!("https://images.local/thumbs/{i:05}.jpg"))
            })
            .collect();
        Self::new(catalog)
    }

    /// Every request sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Requests at `offset` fail until cleared.
    pub fn fail_at(&self, offset: usize) {
        self.failing.lock().insert(offset);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<(ViewSelector, usize)> {
        self.requests.lock().clone()
    }

    pub fn feed(&self, selector: &ViewSelector) -> Vec<ImageRecord> {
        match selector {
            ViewSelector::Default => self
                .default_order
                .iter()
                .map(|&i| self.catalog[i].clone())
                .collect(),
            ViewSelector::Similar(reference) => {
                let Some(anchor) = self.catalog.iter().position(|r| &r.url == reference) else {
                    return Vec::new();
                };
                let mut rest: Vec<usize> = (0..self.catalog.len()).filter(|&i| i != anchor).collect();
                let mut hasher = DefaultHasher::new();
                reference.hash(&mut hasher);
                rest.shuffle(&mut StdRng::seed_from_u64(hasher.finish()));
                std::iter::once(anchor)
                    .chain(rest)
                    .map(|i| self.catalog[i].clone())
                    .collect()
            }
        }
    }
}

impl PageSource for MemoryPageSource {
    fn load_page(
        &self,
        selector: &ViewSelector,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>> {
        self.requests.lock().push((selector.clone(), offset));
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        if self.failing.lock().contains(&offset) {
            bail!("memory source: injected failure at offset {offset}");
        }
        Ok(self
            .feed(selector)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}
