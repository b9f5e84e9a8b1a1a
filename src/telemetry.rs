//! Telemetry primitives for the service.
//!
//! Wires the structured tracing subscriber used across the application.
//! Resolution failures caused by upstream markup changes surface here first,
//! so the JSON output keeps enough structure for log pipelines to alert on.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Initializes the tracing stack used by the application.
pub(crate) fn init() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to construct tracing filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize tracing subscriber: {err}"))?;

    Ok(())
}
