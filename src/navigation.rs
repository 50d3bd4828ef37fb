use tracing::{debug, info};

use crate::feed::{FeedController, FeedState};
use crate::model::{NavigationEntry, ViewSelector};
use crate::render::RenderSurface;

/// Session history of view snapshots, mirroring the host's push/replace/pop.
#[derive(Debug, Clone)]
pub struct NavigationStore {
    entries: Vec<NavigationEntry>,
    cursor: usize,
    /// Entry the controller is showing; lags `cursor` while a restore is deferred.
    shown: usize,
    deferred: Option<NavigationEntry>,
}

impl Default for NavigationStore {
    fn default() -> Self {
        Self::new(NavigationEntry::for_selector(ViewSelector::Default))
    }
}

impl NavigationStore {
    pub fn new(initial: NavigationEntry) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            shown: 0,
            deferred: None,
        }
    }

    pub fn current(&self) -> &NavigationEntry {
        &self.entries[self.cursor]
    }

    pub fn entries(&self) -> &[NavigationEntry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn replace(&mut self, entry: NavigationEntry) {
        self.entries[self.cursor] = entry;
    }

    /// Push after the cursor, dropping any forward history.
    pub fn push(&mut self, entry: NavigationEntry) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(entry);
        self.cursor += 1;
        self.shown = self.cursor;
    }

    /// Record the view being left for `record_id`, then push the pivot.
    ///
    /// A pending deferred restore is dropped: the view being left is the one
    /// on screen, so the cursor returns to it first.
    pub fn pivot(&mut self, record_id: &str, state: &FeedState, scroll_anchor: f64) -> ViewSelector {
        if let Some(dropped) = self.deferred.take() {
            debug!(selector = %dropped.selector, "pivot drops deferred restore");
            self.cursor = self.shown;
        }
        let leaving = NavigationEntry {
            selector: state.selector.clone(),
            offset: state.offset,
            scroll_anchor: Some(scroll_anchor),
            origin_record_id: Some(record_id.to_string()),
        };
        info!(from = %leaving.selector, offset = leaving.offset, to = record_id, "pivoting feed");
        self.replace(leaving);
        let selector = ViewSelector::similar(record_id);
        self.push(NavigationEntry::for_selector(selector.clone()));
        selector
    }

    /// Refresh the current entry's offset and anchor before it is left.
    pub fn capture(&mut self, state: &FeedState, scroll_anchor: f64) {
        let current = &mut self.entries[self.cursor];
        if current.selector == state.selector {
            current.offset = state.offset;
            current.scroll_anchor = Some(scroll_anchor);
        }
    }

    pub fn back(&mut self) -> Option<NavigationEntry> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current().clone())
    }

    pub fn forward(&mut self) -> Option<NavigationEntry> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current().clone())
    }

    /// Restore now if the controller is idle, otherwise once it is.
    /// A newer request replaces an older deferred one.
    pub fn request_restore(&mut self, entry: NavigationEntry, controller: &mut FeedController) {
        if controller.restore(entry.clone()) {
            self.shown = self.cursor;
            self.deferred = None;
        } else {
            debug!(selector = %entry.selector, "controller busy, deferring restore");
            self.deferred = Some(entry);
        }
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn resume(&mut self, controller: &mut FeedController) {
        if let Some(entry) = self.deferred.take() {
            self.request_restore(entry, controller);
        }
    }
}

/// Where to scroll once restored content has been committed: the record the
/// view was left through, else the saved anchor, else the top.
pub fn scroll_target(entry: &NavigationEntry, surface: &dyn RenderSurface) -> f64 {
    entry
        .origin_record_id
        .as_deref()
        .and_then(|id| surface.position_of(id))
        .or(entry.scroll_anchor)
        .unwrap_or(0.0)
}
