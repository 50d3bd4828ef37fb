use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::api;
use crate::client::FeedClient;
use crate::config::{self, Config};
use crate::data::{HttpPageSource, MemoryPageSource, PageSource};
use crate::feed::{EndReason, FeedController, FeedEvent};
use crate::layout::LayoutParams;
use crate::logging;
use crate::model::ViewSelector;
use crate::navigation::{self, NavigationStore};
use crate::prefetch::{PrefetchScheduler, ScrollSignal};
use crate::render::{GridSurface, RenderSurface};

const OFFLINE_CATALOG: usize = 240;

/// Scroll a nearest-neighbor image feed as a justified photo grid.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nearfeed", version, about)]
pub struct Options {
    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the similarity service (overrides api.base_url)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Browse a built-in synthetic catalog instead of the service
    #[arg(long)]
    pub offline: bool,

    /// Number of pages to scroll through
    #[arg(long, default_value_t = 2)]
    pub pages: usize,

    /// Container width in pixels (overrides layout.container_width)
    #[arg(long)]
    pub width: Option<f64>,

    /// Pivot on this record, then navigate back
    #[arg(long)]
    pub pivot: Option<String>,

    /// Seconds to wait for the feed to settle after each step
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

/// The grid as a whole: controller, surface, tail watcher and history.
pub struct Viewer {
    controller: FeedController,
    surface: GridSurface,
    scheduler: PrefetchScheduler,
    navigation: NavigationStore,
}

impl Viewer {
    pub fn new(controller: FeedController, surface: GridSurface, scheduler: PrefetchScheduler) -> Self {
        Self {
            controller,
            surface,
            scheduler,
            navigation: NavigationStore::default(),
        }
    }

    pub fn from_config(cfg: &Config, source: Arc<dyn PageSource>) -> Self {
        let params = LayoutParams {
            row_height: cfg.layout.row_height,
            spacing: cfg.layout.spacing,
        };
        let width = cfg.layout.container_width;
        let client = FeedClient::new(source, cfg.api.page_size);
        Self::new(
            FeedController::new(client, params, width),
            GridSurface::new(width, params.spacing, cfg.prefetch.viewport_height),
            PrefetchScheduler::new(cfg.prefetch.sentinel_distance, cfg.prefetch.load_threshold),
        )
    }

    pub fn controller(&self) -> &FeedController {
        &self.controller
    }

    pub fn surface(&self) -> &GridSurface {
        &self.surface
    }

    pub fn navigation(&self) -> &NavigationStore {
        &self.navigation
    }

    pub fn scheduler(&self) -> &PrefetchScheduler {
        &self.scheduler
    }

    pub fn start(&mut self) {
        let selector = self.navigation.current().selector.clone();
        self.controller.reset(selector);
        self.pump();
    }

    /// Commit whatever the controller has ready, then react to the new tail.
    pub fn pump(&mut self) -> Vec<FeedEvent> {
        let events = self.controller.poll();
        self.commit(events)
    }

    /// Pump until the feed has nothing in flight or `timeout` elapses.
    pub fn settle(&mut self, timeout: Duration) -> Vec<FeedEvent> {
        let deadline = Instant::now() + timeout;
        let mut all = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let events = self.controller.wait(remaining);
            all.extend(self.commit(events));
            if self.controller.is_settled() && !self.navigation.has_deferred() {
                break;
            }
            if Instant::now() >= deadline {
                warn!("feed did not settle within {:?}", timeout);
                break;
            }
        }
        all
    }

    pub fn scroll_to(&mut self, y: f64) -> Vec<FeedEvent> {
        self.surface.scroll_to(y);
        self.commit(Vec::new())
    }

    pub fn scroll_to_end(&mut self) -> Vec<FeedEvent> {
        self.surface.scroll_to_end();
        self.commit(Vec::new())
    }

    pub fn resize(&mut self, width: f64) -> Vec<FeedEvent> {
        self.surface.set_width(width);
        self.controller.set_container_width(width);
        self.pump()
    }

    /// Click at content coordinates; pivots the feed on the record hit.
    pub fn click(&mut self, x: f64, y: f64) -> bool {
        let Some(record_id) = self.surface.hit_test(x, y).map(|record| record.url.clone()) else {
            return false;
        };
        self.select(&record_id);
        true
    }

    pub fn select(&mut self, record_id: &str) {
        let anchor = self.surface.scroll_top();
        let selector = self
            .navigation
            .pivot(record_id, &self.controller.snapshot(), anchor);
        self.controller.reset(selector);
        self.pump();
    }

    pub fn back(&mut self) -> bool {
        self.navigation
            .capture(&self.controller.snapshot(), self.surface.scroll_top());
        match self.navigation.back() {
            Some(entry) => {
                self.navigation.request_restore(entry, &mut self.controller);
                self.pump();
                true
            }
            None => false,
        }
    }

    pub fn forward(&mut self) -> bool {
        self.navigation
            .capture(&self.controller.snapshot(), self.surface.scroll_top());
        match self.navigation.forward() {
            Some(entry) => {
                self.navigation.request_restore(entry, &mut self.controller);
                self.pump();
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, events: Vec<FeedEvent>) -> Vec<FeedEvent> {
        for event in &events {
            match event {
                FeedEvent::Cleared { .. } => {
                    self.surface.clear();
                    self.scheduler.disarm();
                }
                FeedEvent::Appended(rows) => {
                    self.surface.append(rows);
                    self.arm_sentinel();
                }
                FeedEvent::Replaced(rows) => {
                    self.surface.replace(rows);
                    self.arm_sentinel();
                }
                FeedEvent::Restored(entry) => {
                    let target = navigation::scroll_target(entry, &self.surface);
                    self.surface.scroll_to(target);
                }
                FeedEvent::EndOfFeed(EndReason::Failed(message)) => {
                    warn!("feed stopped: {message}");
                }
                FeedEvent::EndOfFeed(reason) => {
                    info!(?reason, "end of feed");
                }
            }
        }

        for signal in self.scheduler.observe(&self.surface) {
            match signal {
                ScrollSignal::SentinelVisible { selector, offset } => {
                    self.controller.on_sentinel_visible(&selector, offset);
                }
                ScrollSignal::NearEnd => {
                    self.controller.load_next_page();
                }
            }
        }
        self.navigation.resume(&mut self.controller);
        events
    }

    fn arm_sentinel(&mut self) {
        let state = self.controller.state();
        if state.has_more {
            self.scheduler.arm(state.selector.clone(), state.offset);
        } else {
            self.scheduler.disarm();
        }
    }
}

pub fn run(options: Options) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions {
        config_file: options.config.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    if let Some(base_url) = &options.base_url {
        cfg.api.base_url = base_url.clone();
    }
    if let Some(width) = options.width {
        if width <= 0.0 {
            bail!("--width must be positive");
        }
        cfg.layout.container_width = width;
    }

    if let Err(err) = logging::init(&cfg.log) {
        eprintln!("logging disabled: {err}");
    }

    let source: Arc<dyn PageSource> = if options.offline {
        Arc::new(MemoryPageSource::demo(OFFLINE_CATALOG))
    } else {
        let client = api::Client::new(api::ClientConfig {
            base_url: cfg.api.base_url.clone(),
            user_agent: cfg.api.user_agent.clone(),
            session_cookie: Some(cfg.api.session_cookie.clone()),
            timeout: cfg.api.timeout,
            http_client: None,
        })
        .context("create api client")?;
        Arc::new(HttpPageSource::new(Arc::new(client)))
    };

    let timeout = Duration::from_secs(options.timeout_secs.max(1));
    let mut viewer = Viewer::from_config(&cfg, source);
    viewer.start();
    viewer.settle(timeout);
    for _ in 1..options.pages.max(1) {
        if !viewer.controller().state().has_more {
            break;
        }
        viewer.scroll_to_end();
        viewer.settle(timeout);
    }
    print_grid(&viewer);

    if let Some(record_id) = options.pivot.as_deref() {
        viewer.select(record_id);
        viewer.settle(timeout);
        print_grid(&viewer);

        viewer.back();
        viewer.settle(timeout);
        print_grid(&viewer);
    }

    Ok(())
}

fn print_grid(viewer: &Viewer) {
    let state = viewer.controller().state();
    let surface = viewer.surface();
    println!(
        "== {} | offset {} | {} | {} rows | scroll {:.0}/{:.0}",
        state.selector,
        state.offset,
        if state.has_more { "more" } else { "end" },
        surface.row_count(),
        surface.scroll_top(),
        surface.content_height(),
    );
    for (index, row) in surface.rows().enumerate() {
        let cells: Vec<String> = row
            .records()
            .zip(row.render_widths())
            .map(|(record, width)| format!("{}@{:.0}", short_name(&record.url), width))
            .collect();
        println!("{:>4} h={:<4} {}", index, row.height, cells.join("  "));
    }
}

fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
