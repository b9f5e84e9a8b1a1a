use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ResolveError;
use crate::fetch::FetchOptions;
use crate::util;

pub mod douyin;
mod extract;
mod record;

pub use douyin::DouYin;

/// Platform a share link belongs to.
///
/// Used only to dispatch to the matching [`ShareResolver`] implementation;
/// exactly one concrete pipeline is active per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    Douyin,
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::Douyin => write!(f, "douyin"),
        }
    }
}

/// Author of a piece of platform content. All fields may be empty when the
/// vendor record omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAuthor {
    pub uid: String,
    pub name: String,
    pub avatar: String,
}

/// One still image of a slideshow. `live_photo_url` is empty when the image
/// carries no associated motion clip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgInfo {
    pub url: String,
    pub live_photo_url: String,
}

/// Normalized resolution result.
///
/// `video_url` and a non-empty `images` list are mutually exclusive: an
/// image-set result always zeroes `video_url` because the platform returns an
/// unreachable stub video address for slideshow content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_url: String,
    pub cover_url: String,
    pub title: String,
    pub images: Vec<ImgInfo>,
    pub author: VideoAuthor,
}

/// Per-platform resolution contract.
///
/// Every platform implements the same two operations; the dispatcher picks
/// the implementation from the share URL's host or an explicit source tag.
#[async_trait]
pub trait ShareResolver: Send + Sync {
    /// Resolves a full share URL into a [`VideoInfo`].
    async fn resolve_share_url(&self, share_url: &str) -> Result<VideoInfo, ResolveError>;

    /// Resolves a canonical content id into a [`VideoInfo`].
    async fn resolve_by_id(&self, content_id: &str) -> Result<VideoInfo, ResolveError>;
}

fn resolver_for(source: VideoSource, options: FetchOptions) -> Box<dyn ShareResolver> {
    match source {
        VideoSource::Douyin => Box::new(DouYin::new(options)),
    }
}

fn source_for_host(host: &str) -> Option<VideoSource> {
    if douyin::is_platform_host(host) {
        return Some(VideoSource::Douyin);
    }

    None
}

/// Resolves a share link found inside a freeform text blob.
///
/// The first http(s) URL in the input is extracted, classified by host and
/// handed to the matching platform pipeline. Unrecognized hosts fail with a
/// descriptive error rather than silently returning an empty result.
pub async fn resolve_share_url(
    options: &FetchOptions,
    raw_input: &str,
) -> Result<VideoInfo, ResolveError> {
    let share_url = util::extract_share_url(raw_input).ok_or(ResolveError::MissingShareUrl)?;
    let parsed = Url::parse(&share_url).map_err(|source| ResolveError::InvalidShareUrl {
        url: share_url.clone(),
        source,
    })?;
    let host = parsed.host_str().unwrap_or_default();
    let source = source_for_host(host).ok_or_else(|| ResolveError::UnsupportedHost {
        host: host.to_string(),
    })?;

    resolver_for(source, options.clone())
        .resolve_share_url(&share_url)
        .await
}

/// Resolves an explicit (source, content id) pair.
pub async fn resolve_by_id(
    options: &FetchOptions,
    source: VideoSource,
    content_id: &str,
) -> Result<VideoInfo, ResolveError> {
    resolver_for(source, options.clone())
        .resolve_by_id(content_id)
        .await
}
