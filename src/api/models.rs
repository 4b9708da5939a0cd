use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::packages::PackageInfo;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Package registration payload. The archive travels base64-encoded so the
/// whole request stays JSON.
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterPackageRequest {
    pub info: PackageInfo,
    pub archive_b64: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddScriptResponse {
    pub handler_id: Uuid,
}

/// One dispatched job as seen by a client.
#[derive(Debug, Deserialize, Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub handler_id: Uuid,
    #[serde(with = "crate::jobs::base64_bytes")]
    pub payload: bytes::Bytes,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResultAck {
    /// False for late/duplicate results the core no longer tracks; the
    /// request itself still succeeds.
    pub accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct NextJobQuery {
    pub client_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
