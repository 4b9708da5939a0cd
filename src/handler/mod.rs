//! Handler lifecycle, per-handler dispatch core, and the manager that owns
//! the handler collection.

pub mod handler;
pub mod manager;
pub mod state;

pub use handler::{JobHandler, ResultOutcome};
pub use manager::HandlerManager;
pub use state::LifecycleState;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler not found: {0}")]
    HandlerNotFound(Uuid),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("no handler logic registered for {package}/{job_type}")]
    HandlerTypeNotFound { package: String, job_type: String },

    #[error("invalid job script: {0}")]
    InvalidJobScript(String),

    #[error("cannot {requested} a handler in state {from:?}")]
    InvalidTransition {
        from: LifecycleState,
        requested: &'static str,
    },

    #[error("handler is running or paused and cannot be removed")]
    HandlerBusy,

    #[error("unknown job: {0}")]
    UnknownJob(Uuid),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
