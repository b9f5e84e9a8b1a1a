use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{
    header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE},
    HeaderValue, Response, StatusCode,
};
use futures::TryStreamExt;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::fetch::{self, FetchOptions};
use crate::state::AppState;

pub mod mime;

/// Total deadline for one proxied transfer. Media files are large, so this
/// is far looser than the resolver's request timeout while still bounding
/// every outbound call.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Referer replayed to the CDN. Some edges refuse to release media bytes to
/// requests that do not look like they originate from the platform's pages.
const ANTI_HOTLINK_REFERER: &str = "https://www.douyin.com/";

const FALLBACK_CONTENT_TYPE: &str = "video/mp4";
const FALLBACK_FILENAME: &str = "video.mp4";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

/// Errors that can occur while streaming media bytes through the proxy.
#[derive(Debug, Error)]
pub enum ProxyStreamError {
    #[error("missing media url")]
    MissingUrl,

    #[error("invalid media url: {source}")]
    InvalidUrl {
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build upstream client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("proxy request failed: {source}")]
    UpstreamRequest {
        #[from]
        source: reqwest::Error,
    },

    #[error("upstream responded with status {status}")]
    UpstreamStatus { status: StatusCode },

    #[error("failed to build response: {source}")]
    ResponseBuild {
        #[from]
        source: axum::http::Error,
    },
}

impl ProxyStreamError {
    fn into_response(self) -> (StatusCode, String) {
        match self {
            Self::MissingUrl => (
                StatusCode::BAD_REQUEST,
                "query parameter `url` is required".to_string(),
            ),
            Self::InvalidUrl { source } => (
                StatusCode::BAD_REQUEST,
                format!("invalid media url: {source}"),
            ),
            Self::ClientBuild { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to build upstream client: {source}"),
            ),
            Self::UpstreamRequest { source } => {
                if source.is_timeout() {
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        "proxy request timed out".to_string(),
                    )
                } else {
                    (
                        StatusCode::BAD_GATEWAY,
                        format!("proxy request failed: {source}"),
                    )
                }
            }
            Self::UpstreamStatus { status } => {
                (status, format!("upstream responded with status {status}"))
            }
            Self::ResponseBuild { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to construct response: {source}"),
            ),
        }
    }
}

/// Streams a resolved media URL back to the caller, defeating hotlink checks.
#[tracing::instrument(name = "proxy.stream", skip(state, query))]
pub async fn handle_proxy_stream(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response<Body>, (StatusCode, String)> {
    if query.url.trim().is_empty() {
        return Err(ProxyStreamError::MissingUrl.into_response());
    }

    let media_url = Url::parse(&query.url)
        .map_err(|source| ProxyStreamError::InvalidUrl { source }.into_response())?;

    let options = FetchOptions {
        request_timeout: STREAM_REQUEST_TIMEOUT,
        ..state.fetch_options()
    };
    let client = fetch::build_client(&options, true)
        .map_err(|source| ProxyStreamError::ClientBuild { source }.into_response())?;

    let service = MediaStreamService::new(client);

    service
        .stream(media_url)
        .await
        .map_err(|error| error.into_response())
}

struct MediaStreamService {
    client: Client,
}

impl MediaStreamService {
    fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issues the upstream GET and forwards the body as a lazy chunked
    /// stream. The stream is restartable per call but not resumable
    /// mid-transfer; a transport error mid-stream aborts the response.
    async fn stream(&self, url: Url) -> Result<Response<Body>, ProxyStreamError> {
        let response = self
            .client
            .get(url.clone())
            .headers(fetch::media_headers(ANTI_HOTLINK_REFERER))
            .send()
            .await?;

        let upstream_status = response.status();
        if upstream_status.is_client_error() || upstream_status.is_server_error() {
            // Drain the rejection body so the connection is released before
            // the error propagates.
            let status = StatusCode::from_u16(upstream_status.as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let _ = response.bytes().await;
            return Err(ProxyStreamError::UpstreamStatus { status });
        }

        let status =
            StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| mime::guess_content_type(&url).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        let filename = mime::download_filename(&url)
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

        // Forward the headers range-aware players need to keep working
        // behind the proxy.
        let mut forwarded = Vec::new();
        for name in [CONTENT_LENGTH, CONTENT_RANGE, ACCEPT_RANGES] {
            if let Some(value) = response.headers().get(name.as_str()) {
                if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                    forwarded.push((name, value));
                }
            }
        }

        info!(status = %status, url = %url, "streaming media through proxy");

        let stream = response
            .bytes_stream()
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error));
        let body = Body::from_stream(stream);

        let mut builder = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type)
            .header(
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            );

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in forwarded {
                headers.insert(name, value);
            }
        }

        Ok(builder.body(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
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

    fn service() -> MediaStreamService {
        let client = fetch::build_client(&FetchOptions::default(), true).unwrap();
        MediaStreamService::new(client)
    }

    #[tokio::test]
    async fn upstream_rejection_preserves_status_and_delivers_no_body() {
        let router = Router::new().route(
            "/media.mp4",
            get(|| async { (StatusCode::FORBIDDEN, "denied").into_response() }),
        );
        let addr = spawn_router(router).await;

        let error = service()
            .stream(Url::parse(&format!("http://{addr}/media.mp4")).unwrap())
            .await
            .expect_err("403 should abort the stream");

        match error {
            ProxyStreamError::UpstreamStatus { status } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_stream_forwards_bytes_and_headers() {
        let router = Router::new().route(
            "/clip.mp4",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "video/mp4")],
                    "0123456789".as_bytes().to_vec(),
                )
            }),
        );
        let addr = spawn_router(router).await;

        let response = service()
            .stream(Url::parse(&format!("http://{addr}/clip.mp4")).unwrap())
            .await
            .expect("stream should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("video/mp4")
        );
        assert_eq!(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .unwrap()
                .to_str()
                .unwrap(),
            "attachment; filename=\"clip.mp4\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn content_type_falls_back_to_url_guess() {
        let router = Router::new().route(
            "/photo.jpeg",
            get(|| async {
                // No content-type from the upstream.
                let mut response = "image-bytes".into_response();
                response.headers_mut().remove(header::CONTENT_TYPE);
                response
            }),
        );
        let addr = spawn_router(router).await;

        let response = service()
            .stream(Url::parse(&format!("http://{addr}/photo.jpeg")).unwrap())
            .await
            .expect("stream should succeed");

        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("image/jpeg")
        );
    }

    #[tokio::test]
    async fn transport_failure_is_distinct_from_rejection() {
        let options = FetchOptions {
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(400),
            ..FetchOptions::default()
        };
        let client = fetch::build_client(&options, true).unwrap();
        let service = MediaStreamService::new(client);

        let error = service
            .stream(Url::parse("http://192.0.2.1:9/media.mp4").unwrap())
            .await
            .expect_err("unroutable host should fail");

        assert!(matches!(error, ProxyStreamError::UpstreamRequest { .. }));
    }
}
