use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::models::ErrorEnvelope;
use crate::application::error::{ErrorReport, ResourceError};

/// Error response: the public envelope plus an internal report the
/// logging middleware picks out of the response extensions.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: StatusCode::NOT_FOUND,
            report: ErrorReport::from_message(source, StatusCode::NOT_FOUND, message.clone()),
            message,
        }
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: StatusCode::BAD_REQUEST,
            report: ErrorReport::from_message(source, StatusCode::BAD_REQUEST, message.clone()),
            message,
        }
    }

    pub fn from_resource(source: &'static str, err: ResourceError) -> Self {
        let status = err.status_code();
        Self {
            status,
            message: err.public_message(),
            report: ErrorReport::from_error(source, status, &err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError {
            status,
            message,
            report,
        } = self;
        let envelope = ErrorEnvelope::for_status(status, message);
        let mut response = (status, Json(envelope)).into_response();
        report.install(&mut response);
        response
    }
}
