use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::client::{FeedClient, FetchError, Fetched, Ticket};
use crate::layout::{self, LayoutParams, Row};
use crate::model::{Batch, CacheKey, ImageRecord, NavigationEntry, ViewSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Restoring,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub selector: ViewSelector,
    /// Records fetched since the last reset or restore.
    pub offset: usize,
    pub has_more: bool,
    pub phase: Phase,
    pub prefetching: bool,
}

impl FeedState {
    fn fresh(selector: ViewSelector, phase: Phase) -> Self {
        Self {
            selector,
            offset: 0,
            has_more: true,
            phase,
            prefetching: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    ShortPage,
    EmptyPage,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Rendered content was dropped; the sentinel is disarmed.
    Cleared { selector: ViewSelector },
    Appended(Vec<Row>),
    Replaced(Vec<Row>),
    /// A restore finished and its rows have been emitted.
    Restored(NavigationEntry),
    EndOfFeed(EndReason),
}

enum Pending {
    Page {
        ticket: Ticket,
    },
    Restore {
        ticket: Ticket,
        entry: NavigationEntry,
        offsets: Vec<usize>,
        received: BTreeMap<usize, Option<Batch>>,
    },
}

/// Owns the feed state and the laid-out content.
///
/// All mutation goes through `reset`, `load_next_page`, `restore` and the
/// fetch outcomes drained by `poll`/`wait`; outcomes whose ticket no longer
/// matches the pending operation are dropped.
pub struct FeedController {
    client: FeedClient,
    params: LayoutParams,
    container_width: f64,
    state: FeedState,
    records: Vec<ImageRecord>,
    rows: Vec<Row>,
    pending: Option<Pending>,
    prefetch: Option<(Ticket, CacheKey)>,
    outbox: Vec<FeedEvent>,
    tx: Sender<Fetched>,
    rx: Receiver<Fetched>,
}

impl FeedController {
    pub fn new(client: FeedClient, params: LayoutParams, container_width: f64) -> Self {
        let (tx, rx) = unbounded();
        Self {
            client,
            params,
            container_width,
            state: FeedState::fresh(ViewSelector::Default, Phase::Idle),
            records: Vec::new(),
            rows: Vec::new(),
            pending: None,
            prefetch: None,
            outbox: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// State of the view on screen or being rebuilt. While a restore is in
    /// flight the offset is the depth it is restoring to.
    pub fn snapshot(&self) -> FeedState {
        let mut state = self.state.clone();
        if let Some(Pending::Restore { entry, .. }) = &self.pending {
            state.offset = entry.offset;
        }
        state
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn client(&self) -> &FeedClient {
        &self.client
    }

    pub fn page_size(&self) -> usize {
        self.client.page_size()
    }

    pub fn container_width(&self) -> f64 {
        self.container_width
    }

    pub fn is_idle(&self) -> bool {
        self.state.phase == Phase::Idle
    }

    /// Nothing in flight, prefetches included.
    pub fn is_settled(&self) -> bool {
        self.pending.is_none() && self.prefetch.is_none()
    }

    pub fn reset(&mut self, selector: ViewSelector) {
        info!(%selector, "resetting feed");
        self.pending = None;
        self.prefetch = None;
        self.records.clear();
        self.rows.clear();
        self.state = FeedState::fresh(selector.clone(), Phase::Idle);
        self.outbox.push(FeedEvent::Cleared { selector });
        self.start_page_load();
    }

    /// Returns false when gated: not idle, or the feed has ended.
    pub fn load_next_page(&mut self) -> bool {
        if self.state.phase != Phase::Idle || !self.state.has_more {
            return false;
        }
        self.start_page_load();
        true
    }

    fn start_page_load(&mut self) {
        let key = CacheKey::new(self.state.selector.clone(), self.state.offset);
        self.state.phase = Phase::Loading;
        self.state.prefetching = false;

        if let Some((ticket, warming)) = self.prefetch.take() {
            if warming == key {
                debug!(selector = %key.selector, offset = key.offset, "promoting prefetch to page load");
                self.pending = Some(Pending::Page { ticket });
                return;
            }
        }

        debug!(selector = %key.selector, offset = key.offset, "loading page");
        let ticket = self.client.fetch_batch(&key.selector, key.offset, &self.tx);
        self.pending = Some(Pending::Page { ticket });
    }

    /// Rebuild the view captured in `entry` with one bulk layout pass.
    pub fn restore(&mut self, entry: NavigationEntry) -> bool {
        if self.state.phase != Phase::Idle {
            return false;
        }
        let page_size = self.page_size();
        let pages = entry.offset.div_ceil(page_size).max(1);
        let offsets: Vec<usize> = (0..pages).map(|page| page * page_size).collect();
        info!(selector = %entry.selector, offset = entry.offset, pages, "restoring feed");

        self.prefetch = None;
        self.state = FeedState::fresh(entry.selector.clone(), Phase::Restoring);
        let ticket = self
            .client
            .fetch_group(&entry.selector, &offsets, &self.tx);
        self.pending = Some(Pending::Restore {
            ticket,
            entry,
            offsets,
            received: BTreeMap::new(),
        });
        true
    }

    /// Warm the cache for the next page. Ignores callbacks armed for another state.
    pub fn on_sentinel_visible(&mut self, selector: &ViewSelector, offset: usize) -> bool {
        if *selector != self.state.selector || offset != self.state.offset {
            debug!(%selector, offset, "ignoring stale sentinel");
            return false;
        }
        if self.state.phase != Phase::Idle || self.state.prefetching || !self.state.has_more {
            return false;
        }
        let key = CacheKey::new(selector.clone(), offset);
        if self.client.cached(&key).is_some() {
            return false;
        }
        debug!(%selector, offset, "prefetching next page");
        let ticket = self.client.fetch_batch(selector, offset, &self.tx);
        self.prefetch = Some((ticket, key));
        self.state.prefetching = true;
        true
    }

    /// Re-lay the current content for a new container width.
    pub fn set_container_width(&mut self, width: f64) {
        if (width - self.container_width).abs() < f64::EPSILON {
            return;
        }
        self.container_width = width;
        if self.records.is_empty() {
            return;
        }
        self.rows = layout::layout(&self.records, width, self.params);
        self.outbox.push(FeedEvent::Replaced(self.rows.clone()));
    }

    /// Drain whatever has arrived without blocking.
    pub fn poll(&mut self) -> Vec<FeedEvent> {
        self.drain();
        std::mem::take(&mut self.outbox)
    }

    /// Block until nothing is in flight or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Vec<FeedEvent> {
        let deadline = Instant::now() + timeout;
        self.drain();
        while !self.is_settled() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            match self.rx.recv_timeout(remaining) {
                Ok(fetched) => {
                    self.handle(fetched);
                    self.drain();
                }
                Err(_) => break,
            }
        }
        std::mem::take(&mut self.outbox)
    }

    fn drain(&mut self) {
        while let Ok(fetched) = self.rx.try_recv() {
            self.handle(fetched);
        }
    }

    fn handle(&mut self, fetched: Fetched) {
        if matches!(&self.prefetch, Some((ticket, _)) if *ticket == fetched.ticket) {
            self.prefetch = None;
            self.state.prefetching = false;
            match &fetched.outcome {
                Ok(batch) => debug!(offset = batch.offset, records = batch.len(), "prefetch warmed cache"),
                Err(err) => debug!(offset = fetched.key.offset, "prefetch dropped: {err}"),
            }
            return;
        }

        match self.pending.take() {
            Some(Pending::Page { ticket }) if ticket == fetched.ticket => {
                self.state.phase = Phase::Idle;
                self.apply_page(fetched.outcome);
            }
            Some(Pending::Restore {
                ticket,
                entry,
                offsets,
                mut received,
            }) if ticket == fetched.ticket => {
                let batch = match fetched.outcome {
                    Ok(batch) => Some(batch),
                    Err(err) => {
                        warn!(offset = fetched.key.offset, "restore page missing: {err}");
                        None
                    }
                };
                received.insert(fetched.key.offset, batch);
                if received.len() == offsets.len() {
                    self.finish_restore(entry, &offsets, received);
                } else {
                    self.pending = Some(Pending::Restore {
                        ticket,
                        entry,
                        offsets,
                        received,
                    });
                }
            }
            other => {
                self.pending = other;
                debug!(offset = fetched.key.offset, "dropping stale response");
            }
        }
    }

    fn apply_page(&mut self, outcome: Result<Batch, FetchError>) {
        let page_size = self.page_size();
        match outcome {
            Ok(batch) if batch.is_empty() => {
                info!(selector = %batch.selector, offset = batch.offset, "feed ended on empty page");
                self.state.has_more = false;
                self.outbox.push(FeedEvent::EndOfFeed(EndReason::EmptyPage));
            }
            Ok(batch) => {
                let short = batch.is_last(page_size);
                self.state.offset += batch.len();
                let rows = layout::layout(&batch.records, self.container_width, self.params);
                debug!(offset = self.state.offset, rows = rows.len(), "appending page");
                self.records.extend(batch.records);
                self.rows.extend(rows.iter().cloned());
                self.outbox.push(FeedEvent::Appended(rows));
                if short {
                    info!(offset = self.state.offset, "feed ended on short page");
                    self.state.has_more = false;
                    self.outbox.push(FeedEvent::EndOfFeed(EndReason::ShortPage));
                }
            }
            Err(FetchError::Canceled) => {
                debug!("page load superseded");
            }
            Err(FetchError::Transport(message)) => {
                warn!("page load failed: {message}");
                self.state.has_more = false;
                self.outbox
                    .push(FeedEvent::EndOfFeed(EndReason::Failed(message)));
            }
        }
    }

    fn finish_restore(
        &mut self,
        entry: NavigationEntry,
        offsets: &[usize],
        received: BTreeMap<usize, Option<Batch>>,
    ) {
        let page_size = self.page_size();
        let last = offsets.last().copied().unwrap_or(0);
        let end = match received.get(&last).and_then(Option::as_ref).map(Batch::len) {
            None => Some(EndReason::Failed(format!(
                "restore page at offset {last} unavailable"
            ))),
            Some(0) => Some(EndReason::EmptyPage),
            Some(len) if len < page_size => Some(EndReason::ShortPage),
            Some(_) => None,
        };

        let mut records = Vec::new();
        let mut offset = 0;
        for batch in received.into_values().flatten() {
            offset = batch.offset + batch.len();
            records.extend(batch.records);
        }

        self.rows = layout::layout(&records, self.container_width, self.params);
        self.records = records;
        self.state.offset = offset;
        self.state.has_more = end.is_none();
        self.state.phase = Phase::Idle;
        info!(
            selector = %self.state.selector,
            offset,
            has_more = self.state.has_more,
            rows = self.rows.len(),
            "restore complete"
        );

        self.outbox.push(FeedEvent::Replaced(self.rows.clone()));
        if let Some(reason) = end {
            self.outbox.push(FeedEvent::EndOfFeed(reason));
        }
        self.outbox.push(FeedEvent::Restored(entry));
    }
}
