//! Core domain types shared across the dispatch core and the API layer.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handler::state::LifecycleState;

/// One unit of work dispatched to a client. Immutable once created.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: Uuid,
    pub handler_id: Uuid,
    pub payload: Bytes,
}

impl Job {
    /// Jobs get time-sortable v7 ids so dispatch order is visible in logs.
    pub fn new(handler_id: Uuid, payload: Bytes) -> Self {
        Self {
            id: Uuid::now_v7(),
            handler_id,
            payload,
        }
    }
}

/// Result pushed back by a client. Consumed immediately by the owning handler.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub success: bool,
    #[serde(default, with = "base64_bytes")]
    pub output: Bytes,
}

/// Request to create a new handler: which package, which job type within it,
/// and opaque per-source settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobScriptInfo {
    pub package_name: String,
    pub job_type: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Per-handler dispatch counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct DispatchCounters {
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
}

/// Point-in-time view of one handler, produced by `get_statistics`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandlerStats {
    pub id: Uuid,
    pub package_name: String,
    pub job_type: String,
    pub state: LifecycleState,
    /// Source exhausted, queue drained, nothing in flight.
    pub finished: bool,
    pub pending: usize,
    pub in_progress: usize,
    #[serde(flatten)]
    pub counters: DispatchCounters,
}

/// What a client needs to fetch and run the handler logic for a job.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandlerJobInfo {
    pub handler_id: Uuid,
    pub package_name: String,
    pub handler_files: Vec<String>,
    pub dependency_files: Vec<String>,
}

/// Registration/heartbeat payload sent by a worker.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub name: String,
}

/// Read-only view of one known client.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientSnapshot {
    pub id: Uuid,
    pub name: String,
    pub last_contact: DateTime<Utc>,
    pub jobs_in_progress: u64,
    pub total_processed: u64,
    pub total_failed: u64,
}

/// Aggregate snapshot returned by `get_statistics`. Recomputed on demand,
/// no lifecycle of its own.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerInfo {
    pub handlers: Vec<HandlerStats>,
    pub clients: Vec<ClientSnapshot>,
    pub resources: crate::telemetry::ResourceUsage,
    pub metrics: crate::observability::MetricsSnapshot,
}

/// Serde helper: opaque payload bytes travel base64-encoded in JSON.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}
