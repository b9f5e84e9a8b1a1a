use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::error;
use url::Url;

use crate::error::ResolveError;
use crate::parser::{ImgInfo, VideoAuthor, VideoInfo};

/// Payload nesting shapes observed across page revisions, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Top-level `aweme_details` list, as returned by reflow APIs.
    DetailList,
    /// `loaderData` map keyed by a page-route identifier.
    LoaderData,
    /// `app.videoDetail` nesting used by newer render payloads.
    AppVideoDetail,
    /// Top-level singular `aweme_detail` field found in some SSR payloads.
    SingularDetail,
}

/// The media record located inside a decoded payload, tagged with the shape
/// that produced it.
#[derive(Debug, Clone)]
pub struct LocatedRecord {
    pub record: Value,
    pub shape: RecordShape,
}

/// Page-route identifiers under `loaderData` known to carry the record.
const LOADER_DATA_PAGE_KEYS: [&str; 2] = ["video_(id)/page", "note_(id)/page"];

enum ProbeResult {
    /// The payload does not have this shape; try the next probe.
    NoMatch,
    /// The payload has this shape. `None` means the shape matched
    /// structurally but held no record, which ends the search: probing is
    /// stop-at-first-structural-match, not first-non-empty-result.
    Matched(Option<Value>),
}

/// Locates the canonical media record inside a decoded payload.
///
/// Shapes are checked in fixed priority order. When none matches the payload
/// the platform has changed its markup; that case fails loudly with truncated
/// raw context instead of guessing.
pub fn locate_record(payload: &Value) -> Result<LocatedRecord, ResolveError> {
    let probes: [(RecordShape, fn(&Value) -> ProbeResult); 4] = [
        (RecordShape::DetailList, probe_detail_list),
        (RecordShape::LoaderData, probe_loader_data),
        (RecordShape::AppVideoDetail, probe_app_video_detail),
        (RecordShape::SingularDetail, probe_singular_detail),
    ];

    for (shape, probe) in probes {
        match probe(payload) {
            ProbeResult::Matched(Some(record)) => return Ok(LocatedRecord { record, shape }),
            ProbeResult::Matched(None) => break,
            ProbeResult::NoMatch => continue,
        }
    }

    let raw = payload.to_string();
    let mismatch = ResolveError::shape_mismatch(&raw);
    error!(context = %mismatch, "no known payload shape matched");
    Err(mismatch)
}

fn probe_detail_list(payload: &Value) -> ProbeResult {
    match payload.get("aweme_details").and_then(Value::as_array) {
        Some(details) => ProbeResult::Matched(details.first().cloned()),
        None => ProbeResult::NoMatch,
    }
}

fn probe_loader_data(payload: &Value) -> ProbeResult {
    let Some(loader_data) = payload.get("loaderData").and_then(Value::as_object) else {
        return ProbeResult::NoMatch;
    };

    for key in LOADER_DATA_PAGE_KEYS {
        let Some(info) = loader_data.get(key).and_then(|page| page.get("videoInfoRes")) else {
            continue;
        };
        let record = info
            .get("item_list")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned();
        return ProbeResult::Matched(record);
    }

    ProbeResult::Matched(None)
}

fn probe_app_video_detail(payload: &Value) -> ProbeResult {
    match payload.get("app").and_then(|app| app.get("videoDetail")) {
        Some(Value::Null) => ProbeResult::Matched(None),
        Some(detail) => ProbeResult::Matched(Some(detail.clone())),
        None => ProbeResult::NoMatch,
    }
}

fn probe_singular_detail(payload: &Value) -> ProbeResult {
    match payload.get("aweme_detail") {
        Some(Value::Null) => ProbeResult::Matched(None),
        Some(detail) => ProbeResult::Matched(Some(detail.clone())),
        None => ProbeResult::NoMatch,
    }
}

/// Path segment identifying slideshow ("note") content in platform URLs.
const NOTE_PATH_SEGMENT: &str = "/note/";

/// Decides whether a fetched page describes an image slideshow.
///
/// Checked in order: the canonical-URL meta tag, the share URL's own path,
/// and finally a crude token scan over the raw body. The token scan is a
/// best-effort heuristic of last resort with known false-positive risk and
/// is not treated as authoritative anywhere else.
pub fn is_slideshow(body: &str, share_url: &str) -> bool {
    static CANONICAL: OnceLock<Regex> = OnceLock::new();
    let canonical = CANONICAL.get_or_init(|| {
        Regex::new(r#"(?i)<link[^>]*rel=["']canonical["'][^>]*href=["']([^"']+)["']"#)
            .expect("canonical link pattern")
    });

    if let Some(captures) = canonical.captures(body) {
        if captures[1].contains(NOTE_PATH_SEGMENT) {
            return true;
        }
    }

    if let Ok(parsed) = Url::parse(share_url) {
        if parsed.path().contains(NOTE_PATH_SEGMENT) {
            return true;
        }
    }

    body.contains("note_") || body.contains("图文")
}

/// Watermarked play-address path segment and its clean counterpart.
const WATERMARKED_SEGMENT: &str = "playwm";
const CLEAN_SEGMENT: &str = "play";

/// Picks an image URL from a vendor `url_list`, preferring the first entry
/// that is not a lossy-encoded `.webp` and falling back to the first entry.
pub fn select_image_url(url_list: &[Value]) -> String {
    for entry in url_list {
        if let Some(url) = entry.as_str() {
            if !url.is_empty() && !url.ends_with(".webp") {
                return url.to_string();
            }
        }
    }

    url_list
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Builds the normalized output from the winning media record.
///
/// The play address gets its watermarked segment rewritten and is returned
/// without chasing the CDN redirect; the caller's client should receive
/// the redirect using its own network locality. When the record carries
/// images, the video URL is forced empty: the platform returns an
/// unreachable stub play address for slideshow content.
pub fn video_info_from_record(record: &Value) -> VideoInfo {
    let images = collect_images(record);

    let mut video_url = record
        .get("video")
        .and_then(|video| video.get("play_addr"))
        .and_then(|addr| addr.get("url_list"))
        .and_then(Value::as_array)
        .and_then(|urls| urls.first())
        .and_then(Value::as_str)
        .map(|url| url.replace(WATERMARKED_SEGMENT, CLEAN_SEGMENT))
        .unwrap_or_default();

    if !images.is_empty() {
        video_url = String::new();
    }

    let cover_url = record
        .get("video")
        .and_then(|video| video.get("cover"))
        .and_then(|cover| cover.get("url_list"))
        .and_then(Value::as_array)
        .map(|urls| select_image_url(urls))
        .unwrap_or_default();

    let title = record
        .get("desc")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    VideoInfo {
        video_url,
        cover_url,
        title,
        images,
        author: author_from_record(record),
    }
}

fn collect_images(record: &Value) -> Vec<ImgInfo> {
    let Some(entries) = record.get("images").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut images = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(url_list) = entry.get("url_list").and_then(Value::as_array) else {
            continue;
        };
        let url = select_image_url(url_list);
        if url.is_empty() {
            continue;
        }

        let live_photo_url = entry
            .get("video")
            .and_then(|video| video.get("play_addr"))
            .and_then(|addr| addr.get("url_list"))
            .and_then(Value::as_array)
            .and_then(|urls| urls.first())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        images.push(ImgInfo {
            url,
            live_photo_url,
        });
    }

    images
}

fn author_from_record(record: &Value) -> VideoAuthor {
    let author = record.get("author");

    let field = |name: &str| {
        author
            .and_then(|author| author.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let avatar = author
        .and_then(|author| author.get("avatar_thumb"))
        .and_then(|thumb| thumb.get("url_list"))
        .and_then(Value::as_array)
        .and_then(|urls| urls.first())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    VideoAuthor {
        uid: field("sec_uid"),
        name: field("nickname"),
        avatar,
    }
}
