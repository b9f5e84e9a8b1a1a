use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::Value;

use crate::error::ResolveError;

/// Known conventions for embedding the page payload, in priority order.
///
/// The platform has shipped several generations of markup: three global
/// variable assignments terminated by a script-tag close, and a JSON blob
/// inside a dedicated script element. New conventions get appended here as
/// page revisions surface them.
fn payload_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)window\._ROUTER_DATA\s*=\s*(.*?)</script>",
            r"(?s)window\._SSR_HYDRATED_DATA\s*=\s*(.*?)</script>",
            r"(?s)window\.RENDER_DATA\s*=\s*(.*?)</script>",
            r#"(?s)<script id="RENDER_DATA" type="application/json">(.*?)</script>"#,
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("payload pattern"))
        .collect()
    })
}

/// Locates and decodes the JSON payload embedded in an HTML document.
///
/// The first pattern that yields syntactically valid JSON wins; later
/// patterns are not tried. A pattern that matches but fails to decode (even
/// after percent-decoding) is skipped. When no pattern yields valid JSON the
/// page shape is simply not one this system understands, which is a hard
/// stop rather than a retry condition.
pub fn extract_payload(body: &str) -> Result<Value, ResolveError> {
    for pattern in payload_patterns() {
        let Some(captures) = pattern.captures(body) else {
            continue;
        };
        let Some(raw) = captures.get(1) else {
            continue;
        };

        if let Some(payload) = decode_json(raw.as_str().trim()) {
            return Ok(payload);
        }
    }

    Err(ResolveError::PayloadNotFound)
}

/// Attempts a direct JSON decode, then a percent-decoded one. The dedicated
/// script-element convention embeds JSON that is additionally URL-encoded.
fn decode_json(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    serde_json::from_str(&decoded).ok()
}
