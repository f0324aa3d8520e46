use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::application::Fetched;

/// Success envelope for resource operations. Reads carry `cached`;
/// lists additionally carry `results`.
#[derive(Debug, Serialize)]
pub struct ResourceEnvelope {
    #[serde(skip)]
    code: StatusCode,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub doc: Value,
}

impl ResourceEnvelope {
    pub fn created(doc: Value) -> Self {
        Self {
            code: StatusCode::CREATED,
            status: "success",
            cached: None,
            results: None,
            doc,
        }
    }

    pub fn updated(doc: Value) -> Self {
        Self {
            code: StatusCode::OK,
            status: "success",
            cached: None,
            results: None,
            doc,
        }
    }

    pub fn single(fetched: Fetched<Value>) -> Self {
        Self {
            code: StatusCode::OK,
            status: "success",
            cached: Some(fetched.cached),
            results: None,
            doc: fetched.value,
        }
    }

    pub fn list(fetched: Fetched<Value>) -> Self {
        let results = fetched.value.as_array().map_or(0, Vec::len);
        Self {
            code: StatusCode::OK,
            status: "success",
            cached: Some(fetched.cached),
            results: Some(results),
            doc: fetched.value,
        }
    }
}

impl IntoResponse for ResourceEnvelope {
    fn into_response(self) -> Response {
        let code = self.code;
        (code, Json(self)).into_response()
    }
}

/// Error envelope: `fail` for client errors, `error` for server
/// errors.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn for_status(status: StatusCode, message: impl Into<String>) -> Self {
        let label = if status.is_server_error() {
            "error"
        } else {
            "fail"
        };
        Self {
            status: label,
            message: message.into(),
        }
    }
}
