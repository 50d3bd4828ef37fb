#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod client;
pub mod config;
pub mod data;
pub mod feed;
pub mod layout;
pub mod logging;
pub mod model;
pub mod navigation;
pub mod prefetch;
pub mod render;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, Options, Viewer};
