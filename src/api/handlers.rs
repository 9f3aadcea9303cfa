//! REST handlers behind `/api`.

use std::str::FromStr as _;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{Method, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::api::AppState;
use crate::config::{ConfigSnapshot, ReplaceError};
use crate::deviceid::DeviceId;
use crate::humansize;

/// JSON responses carry an explicit charset, matching what the UI expects.
fn json_response(status: StatusCode, value: &impl Serialize) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(body))
        .expect("static headers are valid")
}

/// Rejects everything but GET and POST before routing decides anything else,
/// so an unsupported method on a known path never falls through to the asset
/// handler.
pub async fn method_guard(request: Request, next: Next) -> Response<Body> {
    if request.method() != Method::GET && request.method() != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    next.run(request).await
}

pub async fn get_system_config(State(state): State<AppState>) -> Response<Body> {
    json_response(StatusCode::OK, state.config.current().as_ref())
}

/// The in-sync flag is encoded as a bare JSON boolean; the UI reads the
/// response body directly.
pub async fn get_config_in_sync(State(state): State<AppState>) -> Response<Body> {
    json_response(StatusCode::OK, &state.config.in_sync().await)
}

/// Replaces the whole configuration document.
///
/// The body is read as a string first so a malformed document can be
/// reported distinctly from a well-formed but invalid one.
pub async fn post_system_config(State(state): State<AppState>, body: String) -> Response<Body> {
    let document: ConfigSnapshot = match serde_json::from_str(&body) {
        Ok(document) => document,
        Err(e) => {
            debug!(error = %e, "rejected undecodable config");
            return error_text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    match state.config.replace(document).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ ReplaceError::Validation(_)) => error_text(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e @ ReplaceError::Persist(_)) => {
            error_text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

pub async fn get_connections(State(state): State<AppState>) -> Response<Body> {
    json_response(StatusCode::OK, &state.model.connections())
}

pub async fn get_pin_status(State(state): State<AppState>) -> Response<Body> {
    json_response(StatusCode::OK, &state.model.pin_status())
}

/// Absent query parameters are treated as empty strings, never rejected.
#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(rename = "folderID", default)]
    folder_id: String,
    #[serde(rename = "pathPrefix", default)]
    path_prefix: String,
}

pub async fn get_db_browse(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Response<Body> {
    json_response(
        StatusCode::OK,
        &state.model.browse(&query.folder_id, &query.path_prefix),
    )
}

#[derive(Debug, Deserialize)]
pub struct DeviceIdQuery {
    #[serde(default)]
    id: String,
}

/// Canonicalizes a device ID. Always 200: the result object carries either
/// the normalized `id` or an `error` message, and the UI branches on which
/// key is present.
pub async fn get_device_id(Query(query): Query<DeviceIdQuery>) -> Json<serde_json::Value> {
    match DeviceId::from_str(&query.id) {
        Ok(id) => Json(json!({ "id": id.to_string() })),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

/// Validates a human-readable size string such as "10 MB".
pub async fn post_verify_human_size(body: String) -> Response<Body> {
    match humansize::parse_size(&body) {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => error_text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn error_text(status: StatusCode, message: &str) -> Response<Body> {
    (status, format!("{message}\n")).into_response()
}
