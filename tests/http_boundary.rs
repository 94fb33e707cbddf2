//! Router behavior with stubbed upstream fetchers.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use dk_relay::resolver::{
    Candidate, CandidatePlanner, Fetcher, RawResponse, Relay, ResourceRequest, TransportError,
};
use dk_relay::server::{router, AppState, RelayBody};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Serves `body` as `text/html` on the mirror and fails everything else.
struct MirrorOnly {
    body: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for MirrorOnly {
    async fn fetch(&self, candidate: &Candidate, timeout: Duration) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if candidate.host.contains("mirror") {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
            Ok(RawResponse { status: 200, headers, body: self.body.to_string() })
        } else {
            Err(TransportError::Timeout { after: timeout })
        }
    }
}

struct Panicking;

#[async_trait]
impl Fetcher for Panicking {
    async fn fetch(&self, _candidate: &Candidate, _timeout: Duration) -> Result<RawResponse, TransportError> {
        panic!("boom");
    }
}

/// Never answers; flags when its in-flight future is dropped.
struct Hanging {
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for Hanging {
    async fn fetch(&self, _candidate: &Candidate, _timeout: Duration) -> Result<RawResponse, TransportError> {
        let _flag = DropFlag(self.dropped.clone());
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn planner() -> CandidatePlanner {
    CandidatePlanner::new(
        vec!["https://primary.example".to_string(), "https://mirror.example".to_string()],
        "US-NJ",
        "baseball/mlb",
    )
}

fn app(fetcher: Arc<dyn Fetcher>) -> axum::Router {
    let relay = Relay::new(planner(), fetcher, Duration::from_secs(1));
    router(AppState { relay: Arc::new(relay) })
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let resp = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::ORIGIN, "https://odds.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_resolved_request_returns_200_with_headers() {
    let fetcher = Arc::new(MirrorOnly { body: r#"{"eventGroup":{"name":"MLB"}}"#, calls: AtomicUsize::new(0) });
    let (status, headers, text) = get(app(fetcher.clone()), "/api/dk?site=US-NJ&group=84240").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let body: RelayBody = serde_json::from_str(&text).unwrap();
    assert!(body.ok);
    assert_eq!(body.group.as_deref(), Some("84240"));
    assert!(body.endpoint_used.unwrap().starts_with("https://mirror.example/sites/US-NJ/api/v5/eventgroups/84240"));
    assert_eq!(body.data.unwrap()["eventGroup"]["name"], "MLB");
    assert_eq!(body.errors.unwrap().len(), 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_params_use_default_site_and_null_group() {
    let fetcher = Arc::new(MirrorOnly { body: "[]", calls: AtomicUsize::new(0) });
    let (status, _, text) = get(app(fetcher), "/api/dk").await;

    assert_eq!(status, StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["site"], "US-NJ");
    assert!(v["group"].is_null());
    assert!(v["endpoint_used"].as_str().unwrap().contains("/sports/baseball/mlb"));
}

#[tokio::test]
async fn test_repeated_params_use_first_value() {
    let fetcher = Arc::new(MirrorOnly { body: "{}", calls: AtomicUsize::new(0) });
    let (status, headers, text) =
        get(app(fetcher), "/api/dk?site=US-NY&site=US-NJ&group=84240&group=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    let body: RelayBody = serde_json::from_str(&text).unwrap();
    assert_eq!(body.site, "US-NY");
    assert_eq!(body.group.as_deref(), Some("84240"));
    assert!(body
        .endpoint_used
        .unwrap()
        .contains("/sites/US-NY/api/v5/eventgroups/84240?"));
}

#[tokio::test]
async fn test_exhausted_request_returns_502() {
    let fetcher = Arc::new(MirrorOnly { body: "<html>blocked</html>", calls: AtomicUsize::new(0) });
    let (status, headers, text) = get(app(fetcher), "/api/dk?site=US-PA").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
    let body: RelayBody = serde_json::from_str(&text).unwrap();
    assert!(!body.ok);
    assert_eq!(body.site, "US-PA");
    assert_eq!(body.message.as_deref(), Some("DK: all endpoints failed"));
    let errors = body.errors.unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].error, "timed out after 1000ms");
    assert_eq!(errors[1].error, "Unexpected content-type: text/html (body is not JSON)");
}

#[tokio::test]
async fn test_pipeline_panic_returns_500() {
    let (status, _, text) = get(app(Arc::new(Panicking)), "/api/dk?group=84240").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: RelayBody = serde_json::from_str(&text).unwrap();
    assert!(!body.ok);
    assert_eq!(body.message.as_deref(), Some("internal error"));
    assert!(body.errors.is_none());
}

#[tokio::test]
async fn test_preflight_allows_any_origin() {
    let fetcher = Arc::new(MirrorOnly { body: "{}", calls: AtomicUsize::new(0) });
    let resp = app(fetcher.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/dk")
                .header(header::ORIGIN, "https://odds.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health() {
    let (status, _, text) = get(app(Arc::new(Panicking)), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn test_dropping_resolution_aborts_in_flight_attempt() {
    let dropped = Arc::new(AtomicBool::new(false));
    let relay = Relay::new(
        planner(),
        Arc::new(Hanging { dropped: dropped.clone() }),
        Duration::from_secs(60),
    );

    // Caller gives up long before the per-attempt timeout.
    let result = tokio::time::timeout(Duration::from_millis(50), relay.fetch(&ResourceRequest::default())).await;
    assert!(result.is_err());
    assert!(dropped.load(Ordering::SeqCst));
}
