//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sm_post_api::app::{Application, bootstrap};
use sm_post_api::build_router;
use sm_post_api::config::Settings;
use sm_post_query::projection::ConsumerConfig;
use tower::ServiceExt;

/// Settings for a fully in-memory process with a fast projector.
pub fn in_memory_settings() -> Settings {
    Settings {
        projector: ConsumerConfig {
            poll_timeout: Duration::from_millis(20),
            retry_min_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(50),
            max_retries: 5,
        },
        outbox_relay_interval: Duration::from_millis(100),
        ..Settings::default()
    }
}

/// Wires the in-memory application and returns it with its router. Uses the
/// same wiring as `main.rs`.
pub async fn start_app() -> (Application, Router) {
    let application = bootstrap(&in_memory_settings()).await.unwrap();
    let router = build_router(application.state.clone());
    (application, router)
}

/// Send a request with an optional JSON body and return the response.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send_json(app, "GET", uri, None).await
}

/// Polls a lookup until `done` accepts its `posts`, since the read side is
/// updated asynchronously.
pub async fn eventually(
    app: &Router,
    uri: &str,
    done: impl Fn(&[serde_json::Value]) -> bool,
) -> Vec<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, json) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
        let posts = json["posts"].as_array().cloned().unwrap_or_default();
        if done(&posts) {
            return posts;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "read model did not converge for {uri}: {posts:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
