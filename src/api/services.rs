use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use uuid::Uuid;

use super::error::ApiError;
use super::models::{
    AddScriptResponse, HealthResponse, JobResponse, NextJobQuery, RegisterPackageRequest,
    ResultAck,
};
use super::state::AppState;
use crate::jobs::{ClientInfo, JobResult, JobScriptInfo};

/// Aggregate statistics: handlers, clients, host resources (GET /api/server/info)
pub async fn server_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.server.get_statistics())
}

/// List registered packages (GET /api/packages)
pub async fn list_packages(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let packages = state.server.get_registered_packages()?;
    Ok(Json(packages))
}

/// Register a package (POST /api/packages)
///
/// The body is JSON with the archive base64-encoded, validated against the
/// configured upload limit before decoding. Gzip request bodies are handled
/// by the decompression middleware.
pub async fn register_package(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let max_size = state.server.config().server.max_upload_bytes.as_usize();
    let body_bytes = super::utils::read_body(body, max_size).await?;

    let request: RegisterPackageRequest = serde_json::from_slice(&body_bytes)?;
    let archive = BASE64
        .decode(request.archive_b64.as_bytes())
        .map_err(|e| ApiError::InvalidPayload(format!("archive is not valid base64: {e}")))?;

    state.server.register_package(&request.info, &archive)?;
    Ok((StatusCode::CREATED, Json(request.info)))
}

/// Add a job script, creating a stopped handler (POST /api/scripts)
pub async fn add_script(
    State(state): State<AppState>,
    Json(script): Json<JobScriptInfo>,
) -> Result<impl IntoResponse, ApiError> {
    let handler_id = state.server.add_job_script(&script)?;
    Ok((StatusCode::CREATED, Json(AddScriptResponse { handler_id })))
}

/// Remove a handler (DELETE /api/scripts/{id})
pub async fn remove_script(
    State(state): State<AppState>,
    Path(handler_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.server.remove_job_script(handler_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict(format!(
            "handler {handler_id} could not be removed"
        )))
    }
}

/// Lifecycle command (POST /api/scripts/{id}/{action})
pub async fn script_action(
    State(state): State<AppState>,
    Path((handler_id, action)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ok = match action.as_str() {
        "start" => state.server.start_job_script(handler_id),
        "stop" => state.server.stop_job_script(handler_id),
        "pause" => state.server.pause_job_script(handler_id),
        "enable" => state.server.enable_job_script(handler_id),
        "disable" => state.server.disable_job_script(handler_id),
        other => {
            return Err(ApiError::InvalidPayload(format!(
                "unknown action: {other}"
            )));
        }
    };
    if ok {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict(format!(
            "cannot {action} handler {handler_id}"
        )))
    }
}

/// What a client needs to execute this handler's jobs (GET /api/scripts/{id}/info)
pub async fn script_info(
    State(state): State<AppState>,
    Path(handler_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.server.get_handler_job_info(handler_id)?;
    Ok(Json(info))
}

/// Raw file from the handler's backing package (GET /api/scripts/{id}/files/{*file})
pub async fn script_file(
    State(state): State<AppState>,
    Path((handler_id, file)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let contents = state.server.get_file(handler_id, &file)?;
    Ok((
        [(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())],
        contents,
    ))
}

/// Client registration/heartbeat (POST /api/clients/info)
pub async fn client_info(
    State(state): State<AppState>,
    Json(info): Json<ClientInfo>,
) -> impl IntoResponse {
    state.server.received_client_info(&info);
    StatusCode::NO_CONTENT
}

/// Pull the next job (GET /api/jobs/next?client_id=...)
///
/// 204 No Content when no running handler has work.
pub async fn next_job(
    State(state): State<AppState>,
    Query(query): Query<NextJobQuery>,
) -> Result<impl IntoResponse, ApiError> {
    match state.server.get_job(query.client_id).await {
        Some(job) => Ok((
            StatusCode::OK,
            Json(JobResponse {
                job_id: job.id,
                handler_id: job.handler_id,
                payload: job.payload,
            }),
        )
            .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Push a job result (POST /api/jobs/result)
///
/// Always 200 when the payload parses: late and duplicate results are
/// expected under network unreliability and come back `accepted: false`.
pub async fn post_result(
    State(state): State<AppState>,
    Json(result): Json<JobResult>,
) -> impl IntoResponse {
    let accepted = state.server.receive_result(&result).await;
    Json(ResultAck { accepted })
}

/// Health check (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("dispatch".to_string(), "healthy".to_string());
    components.insert(
        "packages".to_string(),
        match state.server.get_registered_packages() {
            Ok(_) => "healthy".to_string(),
            Err(_) => "unhealthy".to_string(),
        },
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
