use std::collections::HashMap;

use crate::layout::Row;
use crate::model::ImageRecord;

/// What the feed needs from whatever draws the grid.
pub trait RenderSurface {
    fn clear(&mut self);
    fn append(&mut self, rows: &[Row]);

    fn replace(&mut self, rows: &[Row]) {
        self.clear();
        self.append(rows);
    }

    fn scroll_top(&self) -> f64;
    fn scroll_to(&mut self, y: f64);
    fn viewport_height(&self) -> f64;
    fn content_height(&self) -> f64;

    /// Top edge of the row holding `record_id`, once it has been committed.
    fn position_of(&self, record_id: &str) -> Option<f64>;

    /// Whether images start from their thumbnail and upgrade once the full
    /// resolution has loaded.
    fn supports_deferred_upgrade(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Placeholder,
    Full,
}

#[derive(Debug, Clone)]
struct PlacedRow {
    top: f64,
    row: Row,
}

/// Headless surface: tracks geometry, scroll and per-image resolution.
#[derive(Debug, Clone)]
pub struct GridSurface {
    width: f64,
    spacing: f64,
    viewport_height: f64,
    scroll_top: f64,
    rows: Vec<PlacedRow>,
    resolution: HashMap<String, Resolution>,
    deferred_upgrade: bool,
}

impl GridSurface {
    pub fn new(width: f64, spacing: f64, viewport_height: f64) -> Self {
        Self {
            width,
            spacing,
            viewport_height,
            scroll_top: 0.0,
            rows: Vec::new(),
            resolution: HashMap::new(),
            deferred_upgrade: true,
        }
    }

    /// Surfaces without the capability load full resolution straight away.
    pub fn without_deferred_upgrade(mut self) -> Self {
        self.deferred_upgrade = false;
        self
    }

    /// Rows laid out for the old width stay hittable only inside the new one.
    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().map(|placed| &placed.row)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.rows().flat_map(Row::records)
    }

    pub fn scroll_to_end(&mut self) {
        self.scroll_to(f64::MAX);
    }

    /// Record under a point in content coordinates.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<&ImageRecord> {
        if !(0.0..self.width).contains(&x) {
            return None;
        }
        let placed = self
            .rows
            .iter()
            .find(|placed| y >= placed.top && y < placed.top + f64::from(placed.row.height))?;
        let mut left = 0.0;
        for (item, width) in placed.row.items.iter().zip(placed.row.render_widths()) {
            if x >= left && x < left + width {
                return Some(&item.record);
            }
            left += width + self.spacing;
        }
        None
    }

    pub fn resolution(&self, record_id: &str) -> Option<Resolution> {
        self.resolution.get(record_id).copied()
    }

    /// URL the image element should currently show.
    pub fn image_source(&self, record_id: &str) -> Option<&str> {
        let record = self.records().find(|record| record.url == record_id)?;
        match (self.resolution(record_id), record.thumbnail.as_deref()) {
            (Some(Resolution::Placeholder), Some(thumbnail)) => Some(thumbnail),
            _ => Some(record.url.as_str()),
        }
    }

    /// The full-resolution image finished loading; swap out the placeholder.
    pub fn mark_loaded(&mut self, record_id: &str) -> bool {
        match self.resolution.get_mut(record_id) {
            Some(state) if *state == Resolution::Placeholder => {
                *state = Resolution::Full;
                true
            }
            _ => false,
        }
    }

    fn max_scroll(&self) -> f64 {
        (self.content_height() - self.viewport_height).max(0.0)
    }
}

impl RenderSurface for GridSurface {
    fn clear(&mut self) {
        self.rows.clear();
        self.resolution.clear();
        self.scroll_top = 0.0;
    }

    fn append(&mut self, rows: &[Row]) {
        for row in rows {
            let top = match self.rows.last() {
                Some(last) => last.top + f64::from(last.row.height) + self.spacing,
                None => 0.0,
            };
            for record in row.records() {
                let initial = if self.deferred_upgrade && record.thumbnail.is_some() {
                    Resolution::Placeholder
                } else {
                    Resolution::Full
                };
                self.resolution.entry(record.url.clone()).or_insert(initial);
            }
            self.rows.push(PlacedRow {
                top,
                row: row.clone(),
            });
        }
    }

    fn replace(&mut self, rows: &[Row]) {
        let scroll_top = self.scroll_top;
        self.clear();
        self.append(rows);
        self.scroll_to(scroll_top);
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn scroll_to(&mut self, y: f64) {
        self.scroll_top = y.clamp(0.0, self.max_scroll());
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn content_height(&self) -> f64 {
        self.rows
            .last()
            .map(|last| last.top + f64::from(last.row.height))
            .unwrap_or(0.0)
    }

    fn position_of(&self, record_id: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|placed| placed.row.records().any(|record| record.url == record_id))
            .map(|placed| placed.top)
    }

    fn supports_deferred_upgrade(&self) -> bool {
        self.deferred_upgrade
    }
}
