//! Axum application builder utilities.
//!
//! Wires the top-level router. Handlers here are thin adapters: they decode
//! query parameters, call into the resolver or proxy modules and wrap the
//! outcome into the service's JSON envelope. All actual logic lives in the
//! dedicated modules.

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::config::BasicAuthConfig;
use crate::error::ResolveError;
use crate::parser::{self, VideoInfo, VideoSource};
use crate::proxy;
use crate::state::AppState;

/// Constructs the Axum router used by the service.
///
/// The landing page and the two parse endpoints sit behind the optional
/// basic-auth gate; the proxy and health endpoints stay open so media
/// playback and probes keep working with credential-less clients.
pub fn build_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(landing_page))
        .route("/video/share/url/parse", get(share_url_parse))
        .route("/video/id/parse", get(video_id_parse))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .merge(gated)
        .route("/video/proxy", get(proxy::handle_proxy_stream))
        .route("/health", get(health_check))
        .with_state(state)
}

/// JSON envelope shared by the parse endpoints.
#[derive(Debug, Serialize)]
struct ApiResponse {
    code: u16,
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<VideoInfo>,
}

impl ApiResponse {
    fn ok(data: VideoInfo) -> Self {
        Self {
            code: 200,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    fn failure(error: &ResolveError) -> Self {
        Self {
            code: 500,
            msg: error.to_string(),
            data: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShareUrlQuery {
    url: String,
}

#[derive(Debug, Deserialize)]
struct IdParseQuery {
    source: VideoSource,
    video_id: String,
}

async fn share_url_parse(
    State(state): State<AppState>,
    Query(query): Query<ShareUrlQuery>,
) -> Json<ApiResponse> {
    match parser::resolve_share_url(&state.fetch_options(), &query.url).await {
        Ok(info) => Json(ApiResponse::ok(info)),
        Err(resolve_error) => {
            error!(error = %resolve_error, "share url resolution failed");
            Json(ApiResponse::failure(&resolve_error))
        }
    }
}

async fn video_id_parse(
    State(state): State<AppState>,
    Query(query): Query<IdParseQuery>,
) -> Json<ApiResponse> {
    match parser::resolve_by_id(&state.fetch_options(), query.source, &query.video_id).await {
        Ok(info) => Json(ApiResponse::ok(info)),
        Err(resolve_error) => {
            error!(
                source = %query.source,
                video_id = %query.video_id,
                error = %resolve_error,
                "id resolution failed"
            );
            Json(ApiResponse::failure(&resolve_error))
        }
    }
}

/// Basic health-check handler used for readiness probes.
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn landing_page() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>unfurl</title></head>
<body>
<h1>unfurl</h1>
<p>Resolve a share link: <code>GET /video/share/url/parse?url=&lt;share text&gt;</code></p>
<p>Resolve by id: <code>GET /video/id/parse?source=douyin&amp;video_id=&lt;id&gt;</code></p>
<p>Proxy media bytes: <code>GET /video/proxy?url=&lt;media url&gt;</code></p>
</body>
</html>
"#,
    )
}

/// Optional basic-auth gate.
///
/// With no credentials configured, requests pass straight through. The
/// comparison is constant-time on both fields regardless of which one
/// mismatches.
async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config().auth.clone() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic_credentials);

    match provided {
        Some((username, password)) if credentials_match(&expected, &username, &password) => {
            next.run(request).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic")],
            "Incorrect username or password",
        )
            .into_response(),
    }
}

fn decode_basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn credentials_match(expected: &BasicAuthConfig, username: &str, password: &str) -> bool {
    let username_ok: bool = username
        .as_bytes()
        .ct_eq(expected.username.as_bytes())
        .into();
    let password_ok: bool = password
        .as_bytes()
        .ct_eq(expected.password.as_bytes())
        .into();

    username_ok & password_ok
}
