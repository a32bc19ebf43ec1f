#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod capture;
pub mod catalog;
pub mod clip;
pub mod config;
pub mod feed;
pub mod logging;
pub mod reply;
pub mod tier;
pub mod ui;
pub mod video;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
