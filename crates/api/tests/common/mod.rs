#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use carelink_api::config::ServerConfig;
use carelink_api::router::build_app_router;
use carelink_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// Long-polls return after one second so tests that poll an idle session
/// stay fast.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        namespace: "presence".to_string(),
        heartbeat_interval_secs: 30,
        poll_timeout_secs: 1,
        poll_session_ttl_secs: 60,
    }
}

/// Fresh state plus the full router over it.
pub fn build_test_app() -> (Router, AppState) {
    let state = AppState::new(test_config());
    (router_for(&state), state)
}

/// The full router (same middleware as production) over existing state.
pub fn router_for(state: &AppState) -> Router {
    build_app_router(state.clone(), &state.config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty(), None).await
}

pub async fn post_text(app: Router, uri: &str, text: &str) -> Response<Body> {
    send(
        app,
        Method::POST,
        uri,
        Body::from(text.to_string()),
        Some("application/json"),
    )
    .await
}

pub async fn put_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    send(
        app,
        Method::PUT,
        uri,
        Body::from(json.to_string()),
        Some("application/json"),
    )
    .await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Body,
    content_type: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A hub listening on an ephemeral localhost port.
pub struct TestHub {
    pub addr: SocketAddr,
    pub state: AppState,
    server: tokio::task::JoinHandle<()>,
}

impl TestHub {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The hub's router, for driving REST endpoints in-process against the
    /// same sessions.
    pub fn router(&self) -> Router {
        router_for(&self.state)
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn spawn_hub() -> TestHub {
    let state = AppState::new(test_config());
    let app = router_for(&state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestHub {
        addr,
        state,
        server,
    }
}

/// Poll `condition` every 20 ms until it holds, panicking after 10 s.
pub async fn eventually<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
