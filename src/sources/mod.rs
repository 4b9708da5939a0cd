//! Pluggable job sources: the logic, loaded per package + job type, that
//! produces job payloads and consumes results.

mod builtin;

pub use builtin::{EchoSource, SequenceSource};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no job source registered for {package}/{job_type}")]
    UnknownJobType { package: String, job_type: String },

    #[error("invalid source settings: {0}")]
    InvalidSettings(String),
}

/// A possibly-infinite lazy sequence of job payloads plus a result sink.
///
/// Implementations are driven by exactly one handler; the handler serializes
/// access, so `&mut self` is fine.
#[async_trait]
pub trait JobSource: Send + std::fmt::Debug {
    /// Next job payload, or `None` once the source is exhausted.
    async fn produce_next(&mut self) -> Option<Bytes>;

    /// Hand a completed job's output to the source. Fire-and-forget from the
    /// core's perspective; implementations log their own failures.
    async fn consume_result(&mut self, _output: Bytes) {}
}

type SourceFactory =
    dyn Fn(&serde_json::Value) -> Result<Box<dyn JobSource>, SourceError> + Send + Sync;

/// Capability table mapping `(package, job_type)` to a source factory.
///
/// Factories are registered once at server construction; handler creation
/// resolves against this table instead of inspecting uploaded code at
/// runtime.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<(String, String), Arc<SourceFactory>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, package: impl Into<String>, job_type: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn JobSource>, SourceError> + Send + Sync + 'static,
    {
        self.factories
            .insert((package.into(), job_type.into()), Arc::new(factory));
    }

    pub fn contains(&self, package: &str, job_type: &str) -> bool {
        self.factories
            .contains_key(&(package.to_string(), job_type.to_string()))
    }

    /// Instantiate a source for the given package + job type.
    pub fn create(
        &self,
        package: &str,
        job_type: &str,
        settings: &serde_json::Value,
    ) -> Result<Box<dyn JobSource>, SourceError> {
        let factory = self
            .factories
            .get(&(package.to_string(), job_type.to_string()))
            .ok_or_else(|| SourceError::UnknownJobType {
                package: package.to_string(),
                job_type: job_type.to_string(),
            })?;
        factory(settings)
    }

    /// Registry with the built-in sources bound to the given package name.
    pub fn with_builtins(package: &str) -> Self {
        let mut registry = Self::new();
        registry.register(package, "sequence", |settings| {
            Ok(Box::new(SequenceSource::from_settings(settings)?) as Box<dyn JobSource>)
        });
        registry.register(package, "echo", |settings| {
            Ok(Box::new(EchoSource::from_settings(settings)?) as Box<dyn JobSource>)
        });
        registry
    }
}
