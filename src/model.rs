use std::fmt;

use serde::{Deserialize, Serialize};

/// One image as returned by the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl ImageRecord {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            thumbnail: None,
            width,
            height,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Width over height. Degenerate dimensions lay out as a square.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Which upstream query feeds the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSelector {
    #[default]
    Default,
    Similar(String),
}

impl ViewSelector {
    pub fn similar(reference: impl Into<String>) -> Self {
        ViewSelector::Similar(reference.into())
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            ViewSelector::Default => None,
            ViewSelector::Similar(id) => Some(id.as_str()),
        }
    }
}

impl fmt::Display for ViewSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewSelector::Default => f.write_str("default"),
            ViewSelector::Similar(id) => write!(f, "similar:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub selector: ViewSelector,
    pub offset: usize,
}

impl CacheKey {
    pub fn new(selector: ViewSelector, offset: usize) -> Self {
        Self { selector, offset }
    }
}

/// One fetched page of records at a given offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub selector: ViewSelector,
    pub offset: usize,
    pub records: Vec<ImageRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A page shorter than `page_size` (including an empty one) ends the feed.
    pub fn is_last(&self, page_size: usize) -> bool {
        self.records.len() < page_size
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.selector.clone(), self.offset)
    }
}

/// Snapshot of a view, carried as the opaque payload of a history entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationEntry {
    pub selector: ViewSelector,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_anchor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_record_id: Option<String>,
}

impl NavigationEntry {
    pub fn for_selector(selector: ViewSelector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_decodes_upstream_shape() {
        let record: ImageRecord =
            serde_json::from_str(r#"{"url":"https://img/1.jpg","width":800,"height":600}"#)
                .unwrap();
        assert_eq!(record.thumbnail, None);
        assert!((record.aspect_ratio() - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_height_is_square() {
        assert_eq!(ImageRecord::new("x", 300, 0).aspect_ratio(), 1.0);
    }

    #[test]
    fn navigation_entry_payload() {
        let entry = NavigationEntry {
            selector: ViewSelector::Default,
            offset: 40,
            scroll_anchor: Some(1520.0),
            origin_record_id: Some("https://img/x.jpg".into()),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: NavigationEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);

        let pivot: NavigationEntry =
            serde_json::from_str(r#"{"selector":{"similar":"https://img/x.jpg"}}"#).unwrap();
        assert_eq!(pivot.selector.reference(), Some("https://img/x.jpg"));
        assert_eq!(pivot.offset, 0);
    }
}
