//! Handler lifecycle state machine.
//!
//! `Stopped ⇄ Running ⇄ Paused` plus an orthogonal disable: disabling from
//! any state remembers the prior state, enabling restores it exactly. All
//! illegal transitions are rejected as no-ops.

use serde::{Deserialize, Serialize};

use super::DispatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Running,
    Paused,
    Disabled,
}

/// Tagged state plus the single saved pre-disable state, so independent
/// flags can never drift into inconsistent combinations.
#[derive(Clone, Copy, Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    pre_disable: Option<LifecycleState>,
}

impl Lifecycle {
    /// New handlers come up stopped with an empty queue.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Stopped,
            pre_disable: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn start(&mut self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Stopped | LifecycleState::Paused => {
                self.state = LifecycleState::Running;
                Ok(())
            }
            from => Err(DispatchError::InvalidTransition {
                from,
                requested: "start",
            }),
        }
    }

    pub fn stop(&mut self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Running | LifecycleState::Paused => {
                self.state = LifecycleState::Stopped;
                Ok(())
            }
            from => Err(DispatchError::InvalidTransition {
                from,
                requested: "stop",
            }),
        }
    }

    pub fn pause(&mut self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Running => {
                self.state = LifecycleState::Paused;
                Ok(())
            }
            from => Err(DispatchError::InvalidTransition {
                from,
                requested: "pause",
            }),
        }
    }

    pub fn disable(&mut self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Disabled => Err(DispatchError::InvalidTransition {
                from: LifecycleState::Disabled,
                requested: "disable",
            }),
            prior => {
                self.pre_disable = Some(prior);
                self.state = LifecycleState::Disabled;
                Ok(())
            }
        }
    }

    pub fn enable(&mut self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Disabled => {
                // pre_disable is always set when entering Disabled
                self.state = self.pre_disable.take().unwrap_or(LifecycleState::Stopped);
                Ok(())
            }
            from => Err(DispatchError::InvalidTransition {
                from,
                requested: "enable",
            }),
        }
    }

    /// Removal is only legal while the handler is inactive.
    pub fn ensure_removable(&self) -> Result<(), DispatchError> {
        match self.state {
            LifecycleState::Stopped | LifecycleState::Disabled => Ok(()),
            LifecycleState::Running | LifecycleState::Paused => Err(DispatchError::HandlerBusy),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
