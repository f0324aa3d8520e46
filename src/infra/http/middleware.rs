//! Request tracking: every response gets an `x-request-id` header,
//! and failed responses are logged with the error report their
//! handler left in the extensions.

use std::time::Instant;

use axum::http::{HeaderName, HeaderValue};
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

const TARGET: &str = "mercato::http";
const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::try_from(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID, value);
    }

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.chain),
        None => ("unknown", Vec::new()),
    };
    let detail = chain
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available")
        .to_string();

    if status.is_server_error() {
        error!(
            target: TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = started.elapsed().as_millis() as u64,
            source,
            detail = %detail,
            chain = ?chain,
            request_id,
            "request failed",
        );
    } else {
        warn!(
            target: TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = started.elapsed().as_millis() as u64,
            source,
            detail = %detail,
            chain = ?chain,
            request_id,
            "request rejected",
        );
    }

    response
}
