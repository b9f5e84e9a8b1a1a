use super::*;

use axum::http::{header, StatusCode as AxumStatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot};

use unfurl::config::{BasicAuthConfig, Config};

async fn spawn_app(config: Config) -> (std::net::SocketAddr, oneshot::Sender<()>) {
    let state = AppState::new(config);
    let router = app::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind successfully");
    let local_addr = listener
        .local_addr()
        .expect("listener should expose local address");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (local_addr, shutdown_tx)
}

async fn spawn_upstream(router: Router) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_endpoint_returns_success() {
    let (addr, shutdown) = spawn_app(Config::default()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn parse_endpoint_wraps_failures_in_the_envelope() {
    let (addr, shutdown) = spawn_app(Config::default()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/video/share/url/parse"))
        .query(&[("url", "look at https://example.com/watch/1 please")])
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let envelope: Value = response.json().await.expect("body should be json");
    assert_eq!(envelope["code"], 500);
    assert!(envelope["msg"]
        .as_str()
        .unwrap()
        .contains("unsupported share host"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn parse_endpoint_requires_credentials_when_configured() {
    let config = Config {
        auth: Some(BasicAuthConfig {
            username: "ops".into(),
            password: "hunter2".into(),
        }),
        ..Config::default()
    };
    let (addr, shutdown) = spawn_app(config).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/video/share/url/parse"))
        .query(&[("url", "https://v.douyin.com/abc/")])
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("http://{addr}/video/share/url/parse"))
        .query(&[("url", "words with no link")])
        .basic_auth("ops", Some("hunter2"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn proxy_surfaces_upstream_rejection_status() {
    let upstream = spawn_upstream(Router::new().route(
        "/media.mp4",
        get(|| async { (AxumStatusCode::FORBIDDEN, "denied").into_response() }),
    ))
    .await;

    let (addr, shutdown) = spawn_app(Config::default()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/video/proxy"))
        .query(&[("url", format!("http://{upstream}/media.mp4"))])
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body = response.text().await.unwrap();
    assert!(body.contains("403"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn proxy_streams_upstream_bytes_with_attachment_headers() {
    let upstream = spawn_upstream(Router::new().route(
        "/clip.mp4",
        get(|| async {
            (
                [(header::CONTENT_TYPE, "video/mp4")],
                b"example-bytes".to_vec(),
            )
        }),
    ))
    .await;

    let (addr, shutdown) = spawn_app(Config::default()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/video/proxy"))
        .query(&[("url", format!("http://{upstream}/clip.mp4"))])
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap(),
        "video/mp4"
    );
    assert!(response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("attachment"));

    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[..], b"example-bytes");

    let _ = shutdown.send(());
}
