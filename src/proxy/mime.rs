use percent_encoding::percent_decode_str;
use url::Url;

/// Guess a content type from the URL path.
///
/// Resolved media URLs point at CDN paths with conventional extensions for
/// video, live-photo clips and slideshow stills. Unknown extensions return
/// `None` so callers can keep the upstream value or apply their own default.
pub fn guess_content_type(url: &Url) -> Option<&'static str> {
    let filename = url
        .path_segments()
        .and_then(|segments| segments.rev().find(|segment| !segment.is_empty()))?;

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("")
        .trim();

    if extension.is_empty() {
        return None;
    }

    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Derives a download filename from the URL's last path segment.
///
/// The segment comes from untrusted input, so everything outside a small
/// safe set collapses to underscores and the result is capped well below
/// filesystem limits. Returns `None` when no usable stem survives, letting
/// the caller fall back to a fixed name.
pub fn download_filename(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.rev().find(|segment| !segment.is_empty()))?;
    let segment = percent_decode_str(segment).decode_utf8_lossy();

    let mut sanitized = String::with_capacity(segment.len());
    let mut last_was_underscore = false;
    for ch in segment.chars() {
        let replacement = match ch {
            c if c.is_ascii_alphanumeric() => c,
            '.' | '-' | '_' => ch,
            _ => '_',
        };

        if replacement == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        sanitized.push(replacement);
    }

    let sanitized = sanitized.trim_matches(|c| c == '_' || c == '.');
    if !sanitized.bytes().any(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    let mut sanitized = sanitized.to_string();
    if sanitized.len() > 128 {
        sanitized.truncate(128);
    }

    Some(sanitized)
}
