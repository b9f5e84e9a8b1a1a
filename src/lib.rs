//! unfurl library crate.
//!
//! Resolves short and long share links from a social-video platform into
//! direct, playable media URLs plus metadata, and proxies the resolved
//! bytes through a hotlink-defeating streamer. The web layer in [`app`] is
//! a thin adapter; the resolution pipeline lives under [`parser`].

pub mod app;
pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod proxy;
pub mod state;
mod telemetry;
pub mod util;

/// Initializes crate-level resources (currently the tracing stack).
pub fn init() -> anyhow::Result<()> {
    telemetry::init()
}
