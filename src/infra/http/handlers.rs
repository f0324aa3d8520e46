use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

use super::AppState;
use super::error::ApiError;
use super::models::ResourceEnvelope;
use crate::application::ResourceBinding;
use crate::application::error::ErrorReport;
use crate::domain::QueryParams;

pub(super) async fn health(State(state): State<AppState>) -> Response {
    match state.store.health().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error("infra::http::health", StatusCode::SERVICE_UNAVAILABLE, &err)
                .install(&mut response);
            response
        }
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<ResourceEnvelope, ApiError> {
    let binding = resolve(&state, &resource)?;
    let Query(pairs) = query
        .map_err(|rejection| ApiError::bad_request("infra::http::list", rejection.body_text()))?;
    let params = QueryParams::from_pairs(pairs);
    let fetched = state
        .resources
        .get_all(&binding, &params)
        .await
        .map_err(|err| ApiError::from_resource("infra::http::list", err))?;
    Ok(ResourceEnvelope::list(fetched))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ResourceEnvelope, ApiError> {
    let binding = resolve(&state, &resource)?;
    let fields = object_payload("infra::http::create", payload)?;
    let doc = state
        .resources
        .create_one(&binding, &fields)
        .await
        .map_err(|err| ApiError::from_resource("infra::http::create", err))?;
    Ok(ResourceEnvelope::created(doc))
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<ResourceEnvelope, ApiError> {
    let binding = resolve(&state, &resource)?;
    let fetched = state
        .resources
        .get_one(&binding, &id)
        .await
        .map_err(|err| ApiError::from_resource("infra::http::get_by_id", err))?;
    Ok(ResourceEnvelope::single(fetched))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ResourceEnvelope, ApiError> {
    let binding = resolve(&state, &resource)?;
    let fields = object_payload("infra::http::update", payload)?;
    let doc = state
        .resources
        .update_one(&binding, &id, &fields)
        .await
        .map_err(|err| ApiError::from_resource("infra::http::update", err))?;
    Ok(ResourceEnvelope::updated(doc))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let binding = resolve(&state, &resource)?;
    state
        .resources
        .delete_one(&binding, &id)
        .await
        .map_err(|err| ApiError::from_resource("infra::http::delete", err))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn fallback(uri: Uri) -> ApiError {
    ApiError::not_found(
        "infra::http::fallback",
        format!("Cannot find {} on this server", uri.path()),
    )
}

fn resolve(state: &AppState, path: &str) -> Result<ResourceBinding, ApiError> {
    state.registry.find_by_path(path).copied().ok_or_else(|| {
        ApiError::not_found("infra::http::resolve", format!("Unknown resource `{path}`"))
    })
}

fn object_payload(
    source: &'static str,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Map<String, Value>, ApiError> {
    let Json(value) =
        payload.map_err(|rejection| ApiError::bad_request(source, rejection.body_text()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request(
            source,
            "request body must be a JSON object",
        )),
    }
}
