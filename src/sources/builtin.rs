//! Built-in job sources. These exercise the dispatch core without any
//! uploaded handler logic and double as fixtures in the integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use super::{JobSource, SourceError};

/// Finite source producing `count` numbered payloads: `"0"`, `"1"`, ...
#[derive(Debug)]
pub struct SequenceSource {
    next: u64,
    count: u64,
}

#[derive(Deserialize)]
struct SequenceSettings {
    count: u64,
}

impl SequenceSource {
    pub fn new(count: u64) -> Self {
        Self { next: 0, count }
    }

    pub fn from_settings(settings: &serde_json::Value) -> Result<Self, SourceError> {
        let parsed: SequenceSettings = serde_json::from_value(settings.clone())
            .map_err(|e| SourceError::InvalidSettings(e.to_string()))?;
        Ok(Self::new(parsed.count))
    }
}

#[async_trait]
impl JobSource for SequenceSource {
    async fn produce_next(&mut self) -> Option<Bytes> {
        if self.next >= self.count {
            return None;
        }
        let payload = Bytes::from(self.next.to_string());
        self.next += 1;
        Some(payload)
    }
}

/// Repeats one fixed payload, infinitely unless `limit` is set. Results are
/// logged and dropped.
#[derive(Debug)]
pub struct EchoSource {
    payload: Bytes,
    remaining: Option<u64>,
}

#[derive(Deserialize)]
struct EchoSettings {
    #[serde(default = "default_echo_payload")]
    payload: String,
    limit: Option<u64>,
}

fn default_echo_payload() -> String {
    "echo".to_string()
}

impl EchoSource {
    pub fn from_settings(settings: &serde_json::Value) -> Result<Self, SourceError> {
        let parsed: EchoSettings = serde_json::from_value(settings.clone())
            .map_err(|e| SourceError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            payload: Bytes::from(parsed.payload),
            remaining: parsed.limit,
        })
    }
}

#[async_trait]
impl JobSource for EchoSource {
    async fn produce_next(&mut self) -> Option<Bytes> {
        match &mut self.remaining {
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.payload.clone())
            }
            None => Some(self.payload.clone()),
        }
    }

    async fn consume_result(&mut self, output: Bytes) {
        debug!(bytes = output.len(), "Echo source received result");
    }
}
