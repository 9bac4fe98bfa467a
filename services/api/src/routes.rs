use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use inquiry_desk::workflows::inquiries::{
    inquiry_router, ActivityLog, BrokerDirectory, InquiryDeskService, InquiryRepository,
    WorkloadQuery,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_inquiry_routes<R, D, L>(
    service: Arc<InquiryDeskService<R, D, L>>,
) -> axum::Router
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    inquiry_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
