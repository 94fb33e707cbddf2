//! HTTP front for the relay: `GET /api/dk?site=&group=`.

use crate::resolver::{Relay, Resolution, ResourceRequest};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const EXHAUSTED_MESSAGE: &str = "DK: all endpoints failed";

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// `site` and `group` from the query string. Repeated keys keep their first value.
#[derive(Debug, Default, PartialEq)]
pub struct DkQuery {
    pub site: Option<String>,
    pub group: Option<String>,
}

impl DkQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "site" => &mut query.site,
                "group" => &mut query.group,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointError {
    pub endpoint: String,
    pub error: String,
}

/// Response body for both outcomes. `group` is always present, `null` when unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayBody {
    pub ok: bool,
    pub site: String,
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<EndpointError>>,
}

impl RelayBody {
    pub fn from_resolution(site: String, group: Option<String>, resolution: Resolution) -> Self {
        let errors: Vec<EndpointError> = resolution
            .failures()
            .filter_map(|a| {
                a.outcome.error().map(|error| EndpointError {
                    endpoint: a.candidate.url(),
                    error,
                })
            })
            .collect();

        match resolution {
            Resolution::Resolved { candidate, data, .. } => Self {
                ok: true,
                site,
                group,
                endpoint_used: Some(candidate.url()),
                data: Some(data),
                message: None,
                errors: (!errors.is_empty()).then_some(errors),
            },
            Resolution::Exhausted { .. } => Self {
                ok: false,
                site,
                group,
                endpoint_used: None,
                data: None,
                message: Some(EXHAUSTED_MESSAGE.to_string()),
                errors: Some(errors),
            },
        }
    }

    pub fn internal_error(site: String, group: Option<String>) -> Self {
        Self {
            ok: false,
            site,
            group,
            endpoint_used: None,
            data: None,
            message: Some("internal error".to_string()),
            errors: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match (self.ok, self.errors.is_some()) {
            (true, _) => StatusCode::OK,
            (false, true) => StatusCode::BAD_GATEWAY,
            (false, false) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_pretty_json(&self) -> String {
        // Only String/Value/bool fields; serializing cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/dk", get(dk_handler))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve a request and build the body. A panic anywhere in the pipeline
/// becomes the 500 body instead of tearing down the connection.
pub async fn relay_body(relay: &Relay, request: ResourceRequest) -> RelayBody {
    let site = request.site_or(relay.planner().default_site()).to_string();
    let group = request.group().map(str::to_string);

    match AssertUnwindSafe(relay.fetch(&request)).catch_unwind().await {
        Ok(resolution) => RelayBody::from_resolution(site, group, resolution),
        Err(_) => {
            tracing::error!(site = %site, group = ?group, "resolution panicked");
            RelayBody::internal_error(site, group)
        }
    }
}

async fn dk_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = DkQuery::from_pairs(pairs);
    let request = ResourceRequest::new(query.site, query.group);
    let body = relay_body(&state.relay, request).await;
    (
        body.status(),
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body.to_pretty_json(),
    )
        .into_response()
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serve until ctrl-c.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("dk-relay listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    shutdown_on(tokio::signal::ctrl_c()).await
}

/// Resolves when `signal` fires. If the handler could not be installed,
/// never resolves, so the server keeps running until the process is killed.
async fn shutdown_on(signal: impl std::future::Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    }
}
