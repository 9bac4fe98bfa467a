use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::inquiries::{DispatchError, InquiryServiceError, RepositoryError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Inquiry(InquiryServiceError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Inquiry(err) => inquiry_status(err),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn inquiry_status(err: &InquiryServiceError) -> StatusCode {
    match err {
        InquiryServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InquiryServiceError::DuplicateRejected(_) => StatusCode::TOO_MANY_REQUESTS,
        InquiryServiceError::InvalidTransition(_)
        | InquiryServiceError::Repository(RepositoryError::Conflict)
        | InquiryServiceError::Dispatch(DispatchError::AssignmentRaceLost { .. }) => {
            StatusCode::CONFLICT
        }
        InquiryServiceError::Repository(RepositoryError::NotFound)
        | InquiryServiceError::Dispatch(DispatchError::Repository(RepositoryError::NotFound)) => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Inquiry(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Inquiry(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Inquiry(InquiryServiceError::DuplicateRejected(check)) => Json(json!({
                "error": self.to_string(),
                "duplicate_type": check.duplicate_type.map(|kind| kind.label()),
                "original_inquiry_id": check.original_inquiry_id.as_ref().map(|id| id.0.clone()),
            })),
            _ => Json(json!({ "error": self.to_string() })),
        };
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<InquiryServiceError> for AppError {
    fn from(value: InquiryServiceError) -> Self {
        Self::Inquiry(value)
    }
}
