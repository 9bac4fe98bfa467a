use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::dispatch::ReassignmentReport;
use super::domain::{BrokerId, InquiryId, InquirySubmission};
use super::duplicates::DuplicateCheck;
use super::repository::{
    ActivityLog, BrokerDirectory, InquiryRepository, InquiryStatusView, WorkloadQuery,
};
use super::service::InquiryDeskService;
use super::status::InquiryStatus;
use crate::error::AppError;

/// Router exposing intake, lifecycle, and assignment endpoints.
pub fn inquiry_router<R, D, L>(service: Arc<InquiryDeskService<R, D, L>>) -> Router
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    Router::new()
        .route("/api/v1/inquiries", post(submit_handler::<R, D, L>))
        .route("/api/v1/inquiries/:inquiry_id", get(status_handler::<R, D, L>))
        .route(
            "/api/v1/inquiries/:inquiry_id/status",
            post(transition_handler::<R, D, L>),
        )
        .route(
            "/api/v1/inquiries/:inquiry_id/assign",
            post(assign_handler::<R, D, L>),
        )
        .route(
            "/api/v1/brokers/:broker_id/deactivate",
            post(deactivate_handler::<R, D, L>),
        )
        .with_state(service)
}

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    #[serde(flatten)]
    pub inquiry: InquiryStatusView,
    pub flagged_for_review: bool,
    pub check: DuplicateCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: InquiryStatus,
}

#[derive(Debug, Serialize)]
pub struct AssignmentView {
    pub inquiry_id: InquiryId,
    pub assigned_broker_id: Option<BrokerId>,
}

pub(crate) async fn submit_handler<R, D, L>(
    State(service): State<Arc<InquiryDeskService<R, D, L>>>,
    Json(submission): Json<InquirySubmission>,
) -> Result<Response, AppError>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    let receipt = service.submit(submission)?;
    let view = SubmissionView {
        inquiry: receipt.inquiry.status_view(),
        flagged_for_review: receipt.flagged_for_review(),
        check: receipt.check,
        dispatch_error: receipt.dispatch_error,
    };
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub(crate) async fn status_handler<R, D, L>(
    State(service): State<Arc<InquiryDeskService<R, D, L>>>,
    Path(inquiry_id): Path<String>,
) -> Result<Json<InquiryStatusView>, AppError>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    let inquiry = service.get(&InquiryId(inquiry_id))?;
    Ok(Json(inquiry.status_view()))
}

pub(crate) async fn transition_handler<R, D, L>(
    State(service): State<Arc<InquiryDeskService<R, D, L>>>,
    Path(inquiry_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<InquiryStatusView>, AppError>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    let inquiry = service.transition(&InquiryId(inquiry_id), request.status)?;
    Ok(Json(inquiry.status_view()))
}

pub(crate) async fn assign_handler<R, D, L>(
    State(service): State<Arc<InquiryDeskService<R, D, L>>>,
    Path(inquiry_id): Path<String>,
) -> Result<Json<AssignmentView>, AppError>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    let inquiry_id = InquiryId(inquiry_id);
    let assigned_broker_id = service.assign(&inquiry_id)?;
    Ok(Json(AssignmentView {
        inquiry_id,
        assigned_broker_id,
    }))
}

pub(crate) async fn deactivate_handler<R, D, L>(
    State(service): State<Arc<InquiryDeskService<R, D, L>>>,
    Path(broker_id): Path<String>,
) -> Result<Json<ReassignmentReport>, AppError>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    let report = service.deactivate_broker(&BrokerId(broker_id))?;
    Ok(Json(report))
}
