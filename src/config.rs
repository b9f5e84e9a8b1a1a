use std::path::{Path, PathBuf};
use std::time::Duration;

use config as config_rs;
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::{FetchOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenerConfig,
    pub auth: Option<BasicAuthConfig>,
    pub http: HttpClientConfig,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

/// Credentials for the optional HTTP basic-auth gate on the parse routes.
/// When absent, the routes are open.
#[derive(Debug, Clone)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Accept invalid upstream certificates. Defaults to `true`: the target
    /// platforms regularly present certificate conditions that would abort
    /// legitimate requests. This is a deliberate, bounded risk acceptance;
    /// tighten it per deployment when the upstreams behave.
    pub danger_accept_invalid_certs: bool,
    /// Honor ambient proxy environment variables. Defaults to `false` so
    /// host-level proxy settings cannot detour platform requests.
    pub trust_env_proxy: bool,
}

impl HttpClientConfig {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            trust_env_proxy: self.trust_env_proxy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenerConfig {
                host: default_host(),
                port: default_port(),
            },
            auth: None,
            http: HttpClientConfig {
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                danger_accept_invalid_certs: true,
                trust_env_proxy: false,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to load configuration: {source}")]
    Load {
        #[source]
        source: config_rs::ConfigError,
    },

    #[error("configuration validation error at {context}: {message}")]
    Validation { context: String, message: String },
}

impl Config {
    /// Loads configuration from an optional file plus `UNFURL`-prefixed
    /// environment variables (nested keys separated by `__`, e.g.
    /// `UNFURL_AUTH__USERNAME`). With neither present, defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config_rs::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(config_rs::File::from(path));
        }
        builder = builder.add_source(
            config_rs::Environment::with_prefix("UNFURL")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|source| ConfigError::Load { source })?;
        let raw: RawConfig = settings
            .try_deserialize()
            .map_err(|source| ConfigError::Load { source })?;

        raw.try_into()
    }

    /// Loads configuration from a file that must exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    listen: RawListener,
    #[serde(default)]
    auth: Option<RawAuth>,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Debug, Deserialize)]
struct RawListener {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for RawListener {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAuth {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_true")]
    danger_accept_invalid_certs: bool,
    #[serde(default)]
    trust_env_proxy: bool,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            danger_accept_invalid_certs: true,
            trust_env_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.listen.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                context: "listen.host".into(),
                message: "listener host must not be empty".into(),
            });
        }

        let auth = match raw.auth {
            Some(auth) => {
                if auth.username.is_empty() || auth.password.is_empty() {
                    return Err(ConfigError::Validation {
                        context: "auth".into(),
                        message: "username and password must both be non-empty".into(),
                    });
                }
                Some(BasicAuthConfig {
                    username: auth.username,
                    password: auth.password,
                })
            }
            None => None,
        };

        if raw.http.connect_timeout_secs == 0 || raw.http.request_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                context: "http".into(),
                message: "timeouts must be greater than zero".into(),
            });
        }

        if raw.http.connect_timeout_secs > raw.http.request_timeout_secs {
            return Err(ConfigError::Validation {
                context: "http".into(),
                message: "connect timeout must not exceed the request timeout".into(),
            });
        }

        Ok(Config {
            listen: ListenerConfig {
                host: raw.listen.host,
                port: raw.listen.port,
            },
            auth,
            http: HttpClientConfig {
                connect_timeout: Duration::from_secs(raw.http.connect_timeout_secs),
                request_timeout: Duration::from_secs(raw.http.request_timeout_secs),
                danger_accept_invalid_certs: raw.http.danger_accept_invalid_certs,
                trust_env_proxy: raw.http.trust_env_proxy,
            },
        })
    }
}
