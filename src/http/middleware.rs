//! Admission middleware: one admit/deny decision per request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::identity::client_key;
use crate::ratelimit::BucketStore;

static RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");

const THROTTLE_MESSAGE: &str = "Too many requests. Please try again later.";

/// Body of the 429 rejection response.
#[derive(Debug, Serialize)]
struct ThrottleBody {
    status: u16,
    message: &'static str,
    timestamp: String,
}

/// Admission control middleware.
///
/// Resolves the client's rate-limit key, charges one token against the
/// client's bucket account, and either forwards the request downstream
/// (attaching an `X-Rate-Limit-Remaining` header to the response) or
/// short-circuits with a 429. A rejected request never reaches the
/// downstream handler and never costs a token.
pub async fn admission(
    State(store): State<Arc<BucketStore>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers(), remote_addr);
    let now = Instant::now();

    let account = store.resolve(&key, now);
    if !account.try_consume(now) {
        warn!(
            client = %key,
            method = %request.method(),
            uri = %request.uri(),
            "Rate limit exceeded"
        );
        return reject();
    }

    let remaining = account.available(now);
    debug!(
        client = %key,
        method = %request.method(),
        uri = %request.uri(),
        remaining = remaining,
        "Request admitted"
    );

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    response
}

fn reject() -> Response {
    let body = ThrottleBody {
        status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
        message: THROTTLE_MESSAGE,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Limit;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_store(capacity: u64) -> Arc<BucketStore> {
        let limits = vec![Limit::new(capacity, Duration::from_secs(60)).unwrap()];
        Arc::new(BucketStore::new(limits, 100, Duration::from_secs(600)).unwrap())
    }

    fn app(store: Arc<BucketStore>, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/users",
                get(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(store, admission))
    }

    fn request(remote: &str) -> Request {
        let mut request = Request::builder()
            .uri("/users")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = remote.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler_with_remaining_header() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(test_store(5), hits.clone());

        let response = app.oneshot(request("10.1.1.1:1000")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-rate-limit-remaining").unwrap(),
            "4"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_429_json_and_skips_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(test_store(2), hits.clone());

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("10.1.1.1:1000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request("10.1.1.1:1000")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 429);
        assert!(body["message"].as_str().unwrap().contains("Too many"));
        assert!(body["timestamp"].as_str().is_some());

        // The downstream handler ran only for the two admitted requests.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_does_not_cost_a_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = test_store(1);
        let app = app(store.clone(), hits);

        let ok = app.clone().oneshot(request("10.1.1.1:1000")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        // Repeated rejections leave the account at zero, not negative:
        // the key's account still reports an empty, not corrupted, state.
        for _ in 0..3 {
            let rejected = app.clone().oneshot(request("10.1.1.1:1000")).await.unwrap();
            assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        }
        let account = store.resolve("10.1.1.1", Instant::now());
        assert_eq!(account.available(Instant::now()), 0);
    }

    #[tokio::test]
    async fn test_clients_are_limited_independently() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(test_store(1), hits);

        let first = app.clone().oneshot(request("10.1.1.1:1000")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let throttled = app.clone().oneshot(request("10.1.1.1:1000")).await.unwrap();
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);

        // A different client still has its own full bucket.
        let other = app.oneshot(request("10.2.2.2:1000")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_header_scopes_the_bucket() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(test_store(1), hits);

        let mut first = Request::builder()
            .uri("/users")
            .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "10.1.1.1:1000".parse().unwrap();
        first.extensions_mut().insert(ConnectInfo(addr));

        let response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Same forwarded client via a different connection shares the key.
        let mut second = Request::builder()
            .uri("/users")
            .header("x-forwarded-for", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = "10.9.9.9:2000".parse().unwrap();
        second.extensions_mut().insert(ConnectInfo(addr));

        let response = app.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
