//! Pivot and back/forward navigation over an in-memory catalog.

use std::sync::Arc;
use std::time::Duration;

use nearfeed::client::FeedClient;
use nearfeed::config::Config;
use nearfeed::data::MemoryPageSource;
use nearfeed::feed::{FeedController, Phase};
use nearfeed::layout::LayoutParams;
use nearfeed::model::{NavigationEntry, ViewSelector};
use nearfeed::navigation::NavigationStore;
use nearfeed::render::RenderSurface;
use nearfeed::Viewer;

const WAIT: Duration = Duration::from_secs(10);

fn controller(source: Arc<MemoryPageSource>) -> FeedController {
    FeedController::new(FeedClient::new(source, 20), LayoutParams::default(), 1280.0)
}

fn scroll_to_offset(feed: &mut FeedController, offset: usize) {
    feed.reset(ViewSelector::Default);
    feed.wait(WAIT);
    while feed.state().offset < offset {
        assert!(feed.load_next_page());
        feed.wait(WAIT);
    }
    assert_eq!(feed.state().offset, offset);
}

#[test]
fn pivot_then_back_restores_two_pages() {
    let source = Arc::new(MemoryPageSource::demo(200));
    let mut feed = controller(source.clone());
    let mut history = NavigationStore::default();

    scroll_to_offset(&mut feed, 40);
    let before = feed.records().to_vec();
    let x = before[33].url.clone();

    let destination = history.pivot(&x, feed.state(), 2400.0);
    assert_eq!(
        history.entries()[0],
        NavigationEntry {
            selector: ViewSelector::Default,
            offset: 40,
            scroll_anchor: Some(2400.0),
            origin_record_id: Some(x.clone()),
        }
    );
    assert_eq!(history.current().selector, ViewSelector::similar(x.clone()));

    feed.reset(destination);
    feed.wait(WAIT);
    assert_eq!(feed.records()[0].url, x);

    // A later session (cold cache) pops back to the captured entry.
    let entry = history.back().expect("history entry");
    let fresh_source = Arc::new(MemoryPageSource::demo(200));
    let mut restored = controller(fresh_source.clone());
    history.request_restore(entry, &mut restored);
    assert_eq!(restored.state().phase, Phase::Restoring);
    restored.wait(WAIT);

    let mut requests = fresh_source.requests();
    requests.sort_by_key(|(_, offset)| *offset);
    assert_eq!(
        requests,
        vec![(ViewSelector::Default, 0), (ViewSelector::Default, 20)]
    );
    assert_eq!(restored.records(), before.as_slice());
    assert_eq!(restored.state().offset, 40);
    assert!(restored.state().has_more);
}

#[test]
fn restore_matches_incremental_record_set() {
    let source = Arc::new(MemoryPageSource::demo(90));
    let mut incremental = controller(source.clone());
    scroll_to_offset(&mut incremental, 80);

    let mut bulk = controller(source);
    bulk.restore(NavigationEntry {
        selector: ViewSelector::Default,
        offset: 80,
        ..NavigationEntry::default()
    });
    bulk.wait(WAIT);

    assert_eq!(bulk.records(), incremental.records());
    assert_eq!(bulk.state().offset, incremental.state().offset);
    let rows: usize = bulk.rows().iter().map(|row| row.len()).sum();
    assert_eq!(rows, 80);
}

fn viewer(source: Arc<MemoryPageSource>) -> Viewer {
    let mut cfg = Config::default();
    cfg.layout.row_height = 200.0;
    cfg.layout.container_width = 800.0;
    cfg.prefetch.viewport_height = 400.0;
    cfg.prefetch.sentinel_distance = 600.0;
    cfg.prefetch.load_threshold = 150.0;
    Viewer::from_config(&cfg, source)
}

#[test]
fn back_scrolls_to_the_clicked_record() {
    let source = Arc::new(MemoryPageSource::demo(300));
    let mut viewer = viewer(source.clone());
    viewer.start();
    viewer.settle(WAIT);
    assert_eq!(viewer.controller().state().offset, 20);
    viewer.scroll_to_end();
    viewer.settle(WAIT);
    let offset = viewer.controller().state().offset;
    assert_eq!(offset, 40);
    let before = viewer.controller().records().to_vec();

    let clicked = before[3].url.clone();
    viewer.select(&clicked);
    viewer.settle(WAIT);
    assert_eq!(
        viewer.controller().state().selector,
        ViewSelector::similar(clicked.clone())
    );

    let requests = source.request_count();
    assert!(viewer.back());
    viewer.settle(WAIT);

    // Every page of the restored view was already cached this session.
    assert_eq!(source.request_count(), requests);
    let state = viewer.controller().state();
    assert_eq!(state.selector, ViewSelector::Default);
    assert_eq!(state.offset, offset);
    assert_eq!(viewer.controller().records(), before.as_slice());

    let surface = viewer.surface();
    let expected = surface
        .position_of(&clicked)
        .expect("clicked record rendered")
        .min(surface.content_height() - surface.viewport_height());
    assert_eq!(surface.scroll_top(), expected);
}

#[test]
fn forward_returns_to_the_pivot() {
    let source = Arc::new(MemoryPageSource::demo(300));
    let mut viewer = viewer(source.clone());
    viewer.start();
    viewer.settle(WAIT);
    let clicked = viewer.controller().records()[3].url.clone();
    viewer.select(&clicked);
    viewer.settle(WAIT);
    assert!(viewer.back());
    viewer.settle(WAIT);
    assert!(viewer.forward());
    viewer.settle(WAIT);
    assert_eq!(
        viewer.controller().state().selector,
        ViewSelector::similar(clicked.clone())
    );
    assert_eq!(viewer.controller().records()[0].url, clicked);
    assert!(!viewer.forward());
}

#[test]
fn click_after_deferred_back_wins() {
    let source = Arc::new(MemoryPageSource::demo(300).with_latency(Duration::from_millis(100)));
    let mut viewer = viewer(source);
    viewer.start();
    viewer.settle(WAIT);
    let a = viewer.controller().records()[3].url.clone();
    viewer.select(&a);
    viewer.settle(WAIT);

    viewer.scroll_to_end();
    assert_eq!(viewer.controller().state().phase, Phase::Loading);
    assert!(viewer.back());
    assert!(viewer.navigation().has_deferred());

    let b = viewer.controller().records()[5].url.clone();
    viewer.select(&b);
    assert!(!viewer.navigation().has_deferred());
    viewer.settle(WAIT);

    let history = viewer.navigation();
    assert_eq!(viewer.controller().state().selector, ViewSelector::similar(b.clone()));
    assert_eq!(history.current().selector, ViewSelector::similar(b));
    let selectors: Vec<_> = history.entries().iter().map(|e| e.selector.clone()).collect();
    assert_eq!(selectors[..2], [ViewSelector::Default, ViewSelector::similar(a)]);
    assert_eq!(history.cursor(), 2);
}

#[test]
fn pivot_during_restore_keeps_restore_depth() {
    let source = Arc::new(MemoryPageSource::demo(200).with_latency(Duration::from_millis(50)));
    let mut feed = controller(source);
    let mut history = NavigationStore::default();

    let entry = NavigationEntry {
        selector: ViewSelector::Default,
        offset: 40,
        ..NavigationEntry::default()
    };
    history.request_restore(entry, &mut feed);
    assert_eq!(feed.state().phase, Phase::Restoring);

    let destination = history.pivot("https://images.local/00007.jpg", &feed.snapshot(), 0.0);
    feed.reset(destination);
    feed.wait(WAIT);

    assert_eq!(history.entries()[0].selector, ViewSelector::Default);
    assert_eq!(history.entries()[0].offset, 40);
    assert_eq!(feed.records()[0].url, "https://images.local/00007.jpg");
}
