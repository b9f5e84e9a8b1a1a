use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of payload bytes carried inside a [`ResolveError::ShapeMismatch`].
///
/// Vendor payloads can be hundreds of kilobytes; the error only needs enough
/// of a prefix to diagnose which page revision produced it.
const SHAPE_CONTEXT_MAX: usize = 512;

/// Errors that can occur while resolving a share link into media metadata.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no share url found in input text")]
    MissingShareUrl,

    #[error("invalid share url `{url}`: {source}")]
    InvalidShareUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported share host `{host}`")]
    UnsupportedHost { host: String },

    #[error("share link redirects to an unsupported platform: `{location}`")]
    UnsupportedRedirect { location: String },

    #[error("could not determine a content id from `{url}`")]
    MissingContentId { url: String },

    #[error("failed to build upstream client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream request failed: {source}")]
    Fetch {
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream responded with status {status}")]
    UpstreamStatus { status: StatusCode },

    #[error("no embedded payload found in page body")]
    PayloadNotFound,

    #[error("unrecognized payload shape: {context}")]
    ShapeMismatch { context: String },
}

impl ResolveError {
    /// Builds a [`ResolveError::ShapeMismatch`] carrying a truncated prefix of
    /// the offending payload so the platform-version mismatch can be diagnosed
    /// from logs without shipping the whole document around.
    pub fn shape_mismatch(payload: &str) -> Self {
        let context = truncate_context(payload, SHAPE_CONTEXT_MAX);
        ResolveError::ShapeMismatch { context }
    }
}

fn truncate_context(payload: &str, max: usize) -> String {
    if payload.len() <= max {
        return payload.to_string();
    }

    let mut end = max;
    while end > 0 && !payload.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}… ({} bytes total)", &payload[..end], payload.len())
}
