//! HTTP server assembly: routes, middleware stack and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use spatial_features::SpatialFeatures;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;
use utoipa::openapi::OpenApi;

use crate::config::{CorsConfig, ServerConfig};

const REQUEST_ID_HEADER: &str = "x-request-id";

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn openapi_json(Extension(doc): Extension<Arc<OpenApi>>) -> Json<OpenApi> {
    Json(OpenApi::clone(&doc))
}

fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
}

fn build_cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    if cfg.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allows any origin");
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();
        layer = layer.allow_origin(origins);
    }

    if cfg.allowed_methods.iter().any(|m| m == "*") {
        layer = layer.allow_methods(Any);
    } else {
        let methods: Vec<Method> = cfg
            .allowed_methods
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        layer = layer.allow_methods(methods);
    }

    if cfg.allowed_headers.iter().any(|h| h == "*") {
        layer = layer.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = cfg
            .allowed_headers
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        layer = layer.allow_headers(headers);
    }

    if let Some(max_age) = cfg.max_age {
        layer = layer.max_age(max_age);
    }
    layer
}

fn apply_trace_layer(router: Router) -> Router {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &Request<axum::body::Body>| {
                let rid = req
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("n/a");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri().path(),
                    request_id = %rid,
                    status = Empty,
                    latency_ms = Empty,
                )
            })
            .on_response(
                |res: &axum::http::Response<axum::body::Body>,
                 latency: Duration,
                 span: &tracing::Span| {
                    span.record("status", res.status().as_u16());
                    span.record("latency_ms", latency.as_millis());
                },
            ),
    )
}

/// Wrap `router` in the middleware stack.
///
/// Requests pass, outermost first: `SetRequestId`, `PropagateRequestId`,
/// Trace, Timeout, `BodyLimit`, CORS, then the routes.
fn apply_middleware_stack(mut router: Router, cfg: &ServerConfig) -> Router {
    if cfg.cors.enabled {
        router = router.layer(build_cors_layer(&cfg.cors));
    }

    router = router.layer(RequestBodyLimitLayer::new(cfg.body_limit_bytes));
    router = router.layer(DefaultBodyLimit::max(cfg.body_limit_bytes));

    router = router.layer(TimeoutLayer::with_status_code(
        StatusCode::GATEWAY_TIMEOUT,
        cfg.request_timeout,
    ));

    router = apply_trace_layer(router);

    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router = router.layer(PropagateRequestIdLayer::new(x_request_id.clone()));
    router.layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

/// Application router: health checks, `/openapi.json` and the feature API.
#[must_use]
pub fn build_router(module: &SpatialFeatures, cfg: &ServerConfig) -> Router {
    let router = health_routes()
        .route(
            "/openapi.json",
            get(openapi_json).layer(Extension(Arc::new(SpatialFeatures::openapi()))),
        )
        .merge(module.router());
    apply_middleware_stack(router, cfg)
}

/// Bind and serve until `shutdown` resolves, then drain in-flight requests.
///
/// # Errors
/// Invalid bind address, bind failure or a fatal server error.
pub async fn serve<F>(router: Router, cfg: &ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", cfg.bind_addr, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.bind_addr, cfg.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
