use tracing::trace;

use crate::model::ViewSelector;
use crate::render::RenderSurface;

#[derive(Debug, Clone, PartialEq)]
pub enum ScrollSignal {
    /// The sentinel came into view; carries the state it was armed for.
    SentinelVisible { selector: ViewSelector, offset: usize },
    /// The viewport is close enough to the tail to load the next page.
    NearEnd,
}

#[derive(Debug, Clone, PartialEq)]
struct Sentinel {
    selector: ViewSelector,
    offset: usize,
}

/// Watches the rendered tail. The sentinel fires once per arming.
#[derive(Debug, Clone)]
pub struct PrefetchScheduler {
    sentinel_distance: f64,
    load_threshold: f64,
    sentinel: Option<Sentinel>,
}

impl PrefetchScheduler {
    pub fn new(sentinel_distance: f64, load_threshold: f64) -> Self {
        Self {
            sentinel_distance,
            load_threshold,
            sentinel: None,
        }
    }

    pub fn arm(&mut self, selector: ViewSelector, offset: usize) {
        self.sentinel = Some(Sentinel { selector, offset });
    }

    pub fn disarm(&mut self) {
        self.sentinel = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sentinel.is_some()
    }

    pub fn observe(&mut self, surface: &dyn RenderSurface) -> Vec<ScrollSignal> {
        let content = surface.content_height();
        if content <= 0.0 {
            return Vec::new();
        }
        let bottom = surface.scroll_top() + surface.viewport_height();
        let mut signals = Vec::new();

        let sentinel_top = (content - self.sentinel_distance).max(0.0);
        if bottom >= sentinel_top {
            if let Some(Sentinel { selector, offset }) = self.sentinel.take() {
                trace!(%selector, offset, "sentinel visible");
                signals.push(ScrollSignal::SentinelVisible { selector, offset });
            }
        }
        if content - bottom <= self.load_threshold {
            signals.push(ScrollSignal::NearEnd);
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{layout, LayoutParams};
    use crate::model::ImageRecord;
    use crate::render::GridSurface;

    fn surface(rows: usize) -> GridSurface {
        let params = LayoutParams {
            row_height: 100.0,
            spacing: 0.0,
        };
        let records: Vec<_> = (0..rows * 2)
            .map(|i| ImageRecord::new(format!("img{i}"), 100, 100))
            .collect();
        let mut surface = GridSurface::new(200.0, 0.0, 300.0);
        surface.append(&layout(&records, 200.0, params));
        surface
    }

    #[test]
    fn nothing_fires_far_from_the_tail() {
        let mut scheduler = PrefetchScheduler::new(200.0, 50.0);
        scheduler.arm(ViewSelector::Default, 20);
        assert!(scheduler.observe(&surface(10)).is_empty());
        assert!(scheduler.is_armed());
    }

    #[test]
    fn sentinel_fires_once_per_arming() {
        let mut scheduler = PrefetchScheduler::new(200.0, 50.0);
        let mut surface = surface(10);
        surface.scroll_to(500.0);
        scheduler.arm(ViewSelector::Default, 20);
        assert_eq!(
            scheduler.observe(&surface),
            vec![ScrollSignal::SentinelVisible {
                selector: ViewSelector::Default,
                offset: 20
            }]
        );
        assert!(scheduler.observe(&surface).is_empty());
    }

    #[test]
    fn near_end_fires_at_the_bottom() {
        let mut scheduler = PrefetchScheduler::new(200.0, 50.0);
        let mut surface = surface(10);
        surface.scroll_to_end();
        assert_eq!(scheduler.observe(&surface), vec![ScrollSignal::NearEnd]);
    }

    #[test]
    fn disarmed_sentinel_is_silent() {
        let mut scheduler = PrefetchScheduler::new(5000.0, 0.0);
        scheduler.arm(ViewSelector::Default, 20);
        scheduler.disarm();
        assert!(scheduler.observe(&surface(10)).is_empty());
    }
}
