use std::sync::Arc;

use crate::config::Config;
use crate::fetch::FetchOptions;

/// Top-level application state shared across the Axum router.
///
/// Holds only the immutable configuration. There is deliberately no shared
/// HTTP client or cache here: every resolution and proxy call builds its own
/// client, so nothing outlives or leaks across a single call.
#[derive(Clone, Debug)]
pub struct AppState {
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Per-call client options derived from the configuration.
    pub fn fetch_options(&self) -> FetchOptions {
        self.config.http.fetch_options()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
