use std::time::Duration;

use reqwest::{
    header::{
        HeaderMap as ReqwestHeaderMap, HeaderValue as ReqwestHeaderValue, ACCEPT,
        ACCEPT_ENCODING, ACCEPT_LANGUAGE, RANGE, REFERER, USER_AGENT,
    },
    redirect::Policy,
    Client, Response,
};

use crate::error::ResolveError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Mobile browser identity presented to the upstream platform. The platform
/// serves the embedded-JSON page variants only to mobile user agents.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

const REDIRECT_FOLLOW_MAX: usize = 10;

/// Per-call options for building upstream HTTP clients.
///
/// `danger_accept_invalid_certs` and `trust_env_proxy` exist because the
/// upstream platforms regularly present broken certificate chains and
/// because ambient proxy configuration on the host must not detour these
/// requests. Both defaults are deliberate, documented risk acceptances that
/// operators can tighten per deployment (see `config.rs`).
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub danger_accept_invalid_certs: bool,
    pub trust_env_proxy: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            danger_accept_invalid_certs: true,
            trust_env_proxy: false,
        }
    }
}

/// Builds a client scoped to a single logical call.
///
/// Clients are never shared across resolution calls; dropping the client on
/// any exit path releases its connections. Callers wrap the build error in
/// their own taxonomy.
pub fn build_client(
    options: &FetchOptions,
    follow_redirects: bool,
) -> Result<Client, reqwest::Error> {
    let redirect_policy = if follow_redirects {
        Policy::limited(REDIRECT_FOLLOW_MAX)
    } else {
        Policy::none()
    };

    let mut builder = Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.request_timeout)
        .redirect(redirect_policy)
        .danger_accept_invalid_certs(options.danger_accept_invalid_certs);

    if !options.trust_env_proxy {
        builder = builder.no_proxy();
    }

    builder.build()
}

/// Default header set mimicking the platform's mobile web client.
///
/// `Accept-Encoding` pins identity so the body arrives uncompressed and the
/// textual extraction patterns can run over it directly.
pub fn default_headers() -> ReqwestHeaderMap {
    let mut headers = ReqwestHeaderMap::new();
    headers.insert(USER_AGENT, ReqwestHeaderValue::from_static(MOBILE_USER_AGENT));
    headers.insert(ACCEPT, ReqwestHeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_ENCODING,
        ReqwestHeaderValue::from_static("identity;q=1, *;q=0"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        ReqwestHeaderValue::from_static("zh-CN,zh;q=0.9"),
    );
    headers
}

/// Header set used when fetching media bytes through the proxy. Extends the
/// default set with a playback `Range` hint and the platform referer some
/// CDN edges require before releasing the file.
pub fn media_headers(referer: &str) -> ReqwestHeaderMap {
    let mut headers = default_headers();
    headers.insert(RANGE, ReqwestHeaderValue::from_static("bytes=0-"));
    if let Ok(value) = ReqwestHeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }
    headers
}

/// Issues a GET and surfaces rejection statuses distinctly from transport
/// failures, so callers can tell "host unreachable" from "host rejected us".
pub async fn get_checked(
    client: &Client,
    url: &str,
    headers: ReqwestHeaderMap,
) -> Result<Response, ResolveError> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|source| ResolveError::Fetch { source })?;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ResolveError::UpstreamStatus { status });
    }

    Ok(response)
}
