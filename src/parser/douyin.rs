use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::ResolveError;
use crate::fetch::{self, FetchOptions};
use crate::parser::{extract, record, ShareResolver, VideoInfo};
use crate::util;

/// Hosts serving the canonical web pages; the content id is embedded in the
/// path or a `modal_id` query parameter.
const CANONICAL_WEB_HOSTS: [&str; 2] = ["www.douyin.com", "www.iesdouyin.com"];

/// Host used by app share sheets; requires a redirect round trip to learn
/// the canonical location.
const SHORT_LINK_HOST: &str = "v.douyin.com";

/// Host fragment of the sibling long-video platform some short links
/// redirect to. Its markup is foreign to this pipeline, so such redirects
/// are rejected outright instead of being fed into extraction.
const CROSS_PLATFORM_HOST_FRAGMENT: &str = "ixigua.com";

const SHARE_PAGE_BASE: &str = "https://www.iesdouyin.com/share/video";
const SLIDES_API_BASE: &str = "https://www.iesdouyin.com/web/api/v2/aweme/slidesinfo/";

/// Host classes recognized for this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostClass {
    /// Canonical web page; the content id is in the URL itself.
    CanonicalWeb,
    /// App share short link; needs a redirect round trip.
    ShortLink,
}

fn classify_host(host: &str) -> Option<HostClass> {
    if CANONICAL_WEB_HOSTS.contains(&host) {
        return Some(HostClass::CanonicalWeb);
    }

    if host == SHORT_LINK_HOST {
        return Some(HostClass::ShortLink);
    }

    None
}

/// Whether the host belongs to this platform at all. Used by the dispatcher.
pub(crate) fn is_platform_host(host: &str) -> bool {
    classify_host(host).is_some()
}

/// Extracts the canonical content id from a path-bearing URL.
///
/// A `modal_id` query parameter takes priority over the last non-empty path
/// segment. Malformed URLs yield `None`, which callers treat as a hard
/// failure rather than a retry condition.
fn content_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "modal_id") {
        if !id.is_empty() {
            return Some(id.into_owned());
        }
    }

    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Share-link resolver for the short-video platform.
pub struct DouYin {
    options: FetchOptions,
    share_page_base: String,
    slides_api_base: String,
}

impl DouYin {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            options,
            share_page_base: SHARE_PAGE_BASE.to_string(),
            slides_api_base: SLIDES_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_bases(options: FetchOptions, share_page_base: &str, slides_api_base: &str) -> Self {
        Self {
            options,
            share_page_base: share_page_base.to_string(),
            slides_api_base: slides_api_base.to_string(),
        }
    }

    fn request_url(&self, content_id: &str) -> String {
        format!(
            "{}/{content_id}/",
            self.share_page_base.trim_end_matches('/')
        )
    }

    /// Follows an app-share short link one hop to learn the content id.
    ///
    /// The GET is issued with redirect-following disabled so the `location`
    /// header can be inspected before anything is fetched from it.
    async fn short_link_content_id(&self, share_url: &str) -> Result<String, ResolveError> {
        let client = fetch::build_client(&self.options, false)
            .map_err(|source| ResolveError::ClientBuild { source })?;
        let response = client
            .get(share_url)
            .headers(fetch::default_headers())
            .send()
            .await
            .map_err(|source| ResolveError::Fetch { source })?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::MissingContentId {
                url: share_url.to_string(),
            })?;

        if location.contains(CROSS_PLATFORM_HOST_FRAGMENT) {
            return Err(ResolveError::UnsupportedRedirect { location });
        }

        content_id_from_url(&location).ok_or(ResolveError::MissingContentId { url: location })
    }

    /// Runs the shared resolution pipeline against a canonical request URL.
    async fn resolve_request_url(
        &self,
        request_url: &str,
        content_id: &str,
    ) -> Result<VideoInfo, ResolveError> {
        let client = fetch::build_client(&self.options, true)
            .map_err(|source| ResolveError::ClientBuild { source })?;
        let response = fetch::get_checked(&client, request_url, fetch::default_headers()).await?;
        let body = response
            .text()
            .await
            .map_err(|source| ResolveError::Fetch { source })?;

        // Slideshow pages hide the per-image detail (live photos in
        // particular) behind a dedicated API; its failure is survivable
        // because the embedded payload still describes the content.
        let mut payload = None;
        if record::is_slideshow(&body, request_url) {
            payload = self.slides_info(&client, content_id).await;
        }

        let payload = match payload {
            Some(payload) => payload,
            None => extract::extract_payload(&body)?,
        };

        let located = record::locate_record(&payload)?;
        debug!(%content_id, shape = ?located.shape, "located media record");

        Ok(record::video_info_from_record(&located.record))
    }

    /// Fetches slideshow detail from the dedicated API.
    ///
    /// The endpoint demands a device id and an `a_bogus` token but validates
    /// neither beyond well-formedness, so both are opaque random values. Any
    /// failure here is downgraded to a warning and `None` so the caller can
    /// fall back to the embedded payload.
    async fn slides_info(&self, client: &Client, content_id: &str) -> Option<Value> {
        let web_id = format!("75{}", util::fixed_length_numeric_id(15));
        let a_bogus = util::rand_seq(64);
        let api_url = format!(
            "{}?reflow_source=reflow_page&web_id={web_id}&device_id={web_id}\
             &aweme_ids=%5B{content_id}%5D&request_source=200&a_bogus={a_bogus}",
            self.slides_api_base
        );

        let response = match fetch::get_checked(client, &api_url, fetch::default_headers()).await {
            Ok(response) => response,
            Err(error) => {
                warn!(%content_id, error = %error, "slideshow detail call failed; using page payload");
                return None;
            }
        };

        match response.json::<Value>().await {
            Ok(payload)
                if payload
                    .get("aweme_details")
                    .and_then(Value::as_array)
                    .is_some_and(|details| !details.is_empty()) =>
            {
                Some(payload)
            }
            Ok(_) => {
                warn!(%content_id, "slideshow detail response held no records; using page payload");
                None
            }
            Err(error) => {
                warn!(%content_id, error = %error, "slideshow detail response was not JSON; using page payload");
                None
            }
        }
    }
}

#[async_trait]
impl ShareResolver for DouYin {
    #[tracing::instrument(name = "resolve.share_url", skip(self))]
    async fn resolve_share_url(&self, share_url: &str) -> Result<VideoInfo, ResolveError> {
        let parsed = Url::parse(share_url).map_err(|source| ResolveError::InvalidShareUrl {
            url: share_url.to_string(),
            source,
        })?;
        let host = parsed.host_str().unwrap_or_default();

        let content_id = match classify_host(host) {
            Some(HostClass::CanonicalWeb) => {
                content_id_from_url(share_url).ok_or_else(|| ResolveError::MissingContentId {
                    url: share_url.to_string(),
                })?
            }
            Some(HostClass::ShortLink) => self.short_link_content_id(share_url).await?,
            None => {
                return Err(ResolveError::UnsupportedHost {
                    host: host.to_string(),
                })
            }
        };

        self.resolve_by_id(&content_id).await
    }

    #[tracing::instrument(name = "resolve.by_id", skip(self))]
    async fn resolve_by_id(&self, content_id: &str) -> Result<VideoInfo, ResolveError> {
        if content_id.is_empty() {
            return Err(ResolveError::MissingContentId { url: String::new() });
        }

        let request_url = self.request_url(content_id);
        self.resolve_request_url(&request_url, content_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::{Html, IntoResponse, Redirect};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_router(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn router_data_page(record: Value) -> String {
        let payload = json!({
            "loaderData": {
                "video_(id)/page": { "videoInfoRes": { "item_list": [record] } }
            }
        });
        format!("<html><body><script>window._ROUTER_DATA = {payload}</script></body></html>")
    }

    fn video_record(id: &str) -> Value {
        json!({
            "aweme_id": id,
            "desc": "demo clip",
            "video": {
                "play_addr": { "url_list": [format!("https://aweme.example.com/aweme/v1/playwm/?video_id={id}")] },
                "cover": { "url_list": ["https://p3.example.com/cover.webp", "https://p3.example.com/cover.jpeg"] }
            },
            "author": { "sec_uid": "uid-1", "nickname": "author", "avatar_thumb": { "url_list": ["https://p3.example.com/a.jpeg"] } }
        })
    }

    #[test]
    fn host_classes_are_recognized() {
        assert_eq!(classify_host("www.douyin.com"), Some(HostClass::CanonicalWeb));
        assert_eq!(
            classify_host("www.iesdouyin.com"),
            Some(HostClass::CanonicalWeb)
        );
        assert_eq!(classify_host("v.douyin.com"), Some(HostClass::ShortLink));
        assert_eq!(classify_host("www.ixigua.com"), None);
        assert_eq!(classify_host("example.com"), None);
    }

    #[test]
    fn modal_id_takes_priority_over_path_segment() {
        let url = "https://www.iesdouyin.com/share/video/7424432820954598707/?region=CN&modal_id=7555093909760789812";
        assert_eq!(
            content_id_from_url(url).as_deref(),
            Some("7555093909760789812")
        );
    }

    #[test]
    fn last_non_empty_path_segment_is_the_id() {
        assert_eq!(
            content_id_from_url(
                "https://www.iesdouyin.com/share/video/7424432820954598707/?region=CN&mid=742"
            )
            .as_deref(),
            Some("7424432820954598707")
        );
        assert_eq!(
            content_id_from_url("https://www.douyin.com/video/123456").as_deref(),
            Some("123456")
        );
    }

    #[test]
    fn malformed_url_yields_no_id() {
        assert!(content_id_from_url("not a url").is_none());
        assert!(content_id_from_url("https://www.douyin.com/").is_none());
    }

    #[test]
    fn request_url_is_built_from_content_id() {
        let resolver = DouYin::new(FetchOptions::default());
        assert_eq!(
            resolver.request_url("7424432820954598707"),
            "https://www.iesdouyin.com/share/video/7424432820954598707/"
        );
    }

    #[tokio::test]
    async fn cross_platform_redirect_is_rejected() {
        let router = Router::new().route(
            "/s/:code",
            get(|| async { Redirect::temporary("https://www.ixigua.com/7000000000000000000") }),
        );
        let addr = spawn_router(router).await;

        let resolver = DouYin::new(FetchOptions::default());
        let error = resolver
            .short_link_content_id(&format!("http://{addr}/s/abc"))
            .await
            .expect_err("cross-platform redirect should be rejected");

        match error {
            ResolveError::UnsupportedRedirect { location } => {
                assert!(location.contains("ixigua.com"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_link_redirect_yields_content_id() {
        let router = Router::new().route(
            "/s/:code",
            get(|| async {
                Redirect::temporary(
                    "https://www.iesdouyin.com/share/video/7424432820954598707/?region=CN",
                )
            }),
        );
        let addr = spawn_router(router).await;

        let resolver = DouYin::new(FetchOptions::default());
        let id = resolver
            .short_link_content_id(&format!("http://{addr}/s/abc"))
            .await
            .expect("redirect should yield an id");

        assert_eq!(id, "7424432820954598707");
    }

    #[tokio::test]
    async fn short_link_without_location_fails() {
        let router = Router::new().route("/s/:code", get(|| async { StatusCode::OK }));
        let addr = spawn_router(router).await;

        let resolver = DouYin::new(FetchOptions::default());
        let error = resolver
            .short_link_content_id(&format!("http://{addr}/s/abc"))
            .await
            .expect_err("missing location should fail");

        assert!(matches!(error, ResolveError::MissingContentId { .. }));
    }

    #[tokio::test]
    async fn video_page_resolves_to_video_info() {
        let router = Router::new().route(
            "/share/video/:id/",
            get(|Path(id): Path<String>| async move { Html(router_data_page(video_record(&id))) }),
        );
        let addr = spawn_router(router).await;

        let resolver = DouYin::with_bases(
            FetchOptions::default(),
            &format!("http://{addr}/share/video"),
            &format!("http://{addr}/unused-slides"),
        );

        let info = resolver
            .resolve_by_id("7424432820954598707")
            .await
            .expect("resolution should succeed");

        assert_eq!(
            info.video_url,
            "https://aweme.example.com/aweme/v1/play/?video_id=7424432820954598707"
        );
        assert_eq!(info.cover_url, "https://p3.example.com/cover.jpeg");
        assert_eq!(info.title, "demo clip");
        assert!(info.images.is_empty());
        assert_eq!(info.author.name, "author");

        // Same markup, same id: structurally identical result.
        let again = resolver.resolve_by_id("7424432820954598707").await.unwrap();
        assert_eq!(info, again);
    }

    #[tokio::test]
    async fn slideshow_page_uses_detail_api_for_live_photos() {
        let slides = json!({
            "aweme_details": [{
                "desc": "photo dump",
                "images": [{
                    "url_list": ["https://p3.example.com/1.webp", "https://p3.example.com/1.jpeg"],
                    "video": { "play_addr": { "url_list": ["https://aweme.example.com/live/1.mp4"] } }
                }],
                "video": { "play_addr": { "url_list": ["https://aweme.example.com/aweme/v1/playwm/?video_id=stub"] } },
                "author": { "sec_uid": "uid-2", "nickname": "poster" }
            }]
        });

        let page = r#"<html><head><link rel="canonical" href="https://www.iesdouyin.com/share/note/700/"/></head><body></body></html>"#;

        let router = Router::new()
            .route(
                "/share/video/:id/",
                get(move |_: Path<String>| async move { Html(page.to_string()) }),
            )
            .route(
                "/slides",
                get(move || {
                    let slides = slides.clone();
                    async move { Json(slides) }
                }),
            );
        let addr = spawn_router(router).await;

        let resolver = DouYin::with_bases(
            FetchOptions::default(),
            &format!("http://{addr}/share/video"),
            &format!("http://{addr}/slides"),
        );

        let info = resolver.resolve_by_id("700").await.unwrap();
        assert!(info.video_url.is_empty());
        assert_eq!(info.images.len(), 1);
        assert_eq!(info.images[0].url, "https://p3.example.com/1.jpeg");
        assert_eq!(
            info.images[0].live_photo_url,
            "https://aweme.example.com/live/1.mp4"
        );
    }

    #[tokio::test]
    async fn failed_detail_api_falls_back_to_page_payload() {
        let record = json!({
            "desc": "photo dump",
            "images": [{ "url_list": ["https://p3.example.com/2.jpeg"] }],
        });
        let page = format!(
            "<html><head><link rel=\"canonical\" href=\"https://www.iesdouyin.com/share/note/701/\"/></head>\
             <body><script>window._ROUTER_DATA = {}</script></body></html>",
            json!({ "loaderData": { "note_(id)/page": { "videoInfoRes": { "item_list": [record] } } } })
        );

        let router = Router::new()
            .route(
                "/share/video/:id/",
                get(move |_: Path<String>| {
                    let page = page.clone();
                    async move { Html(page) }
                }),
            )
            .route(
                "/slides",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
            );
        let addr = spawn_router(router).await;

        let resolver = DouYin::with_bases(
            FetchOptions::default(),
            &format!("http://{addr}/share/video"),
            &format!("http://{addr}/slides"),
        );

        let info = resolver.resolve_by_id("701").await.unwrap();
        assert!(info.video_url.is_empty());
        assert_eq!(info.images.len(), 1);
        assert_eq!(info.images[0].url, "https://p3.example.com/2.jpeg");
    }

    #[tokio::test]
    async fn unrecognized_page_shape_fails_loudly() {
        let router = Router::new().route(
            "/share/video/:id/",
            get(|| async {
                Html(r#"<script>window._ROUTER_DATA = {"unexpected":true}</script>"#.to_string())
            }),
        );
        let addr = spawn_router(router).await;

        let resolver = DouYin::with_bases(
            FetchOptions::default(),
            &format!("http://{addr}/share/video"),
            &format!("http://{addr}/unused-slides"),
        );

        let error = resolver
            .resolve_by_id("702")
            .await
            .expect_err("unknown shape should fail");
        assert!(matches!(error, ResolveError::ShapeMismatch { .. }));
    }

    #[tokio::test]
    async fn rejected_page_fetch_preserves_status() {
        let router = Router::new().route(
            "/share/video/:id/",
            get(|| async { StatusCode::FORBIDDEN }),
        );
        let addr = spawn_router(router).await;

        let resolver = DouYin::with_bases(
            FetchOptions::default(),
            &format!("http://{addr}/share/video"),
            &format!("http://{addr}/unused-slides"),
        );

        let error = resolver
            .resolve_by_id("703")
            .await
            .expect_err("403 should fail resolution");
        match error {
            ResolveError::UpstreamStatus { status } => {
                assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_content_id_is_a_hard_failure() {
        let resolver = DouYin::new(FetchOptions::default());
        let error = resolver.resolve_by_id("").await.unwrap_err();
        assert!(matches!(error, ResolveError::MissingContentId { .. }));
    }
}
