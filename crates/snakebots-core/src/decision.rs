use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Perception;

/// Motion command produced by one decision step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    /// Change of heading in radians, added to the current heading.
    pub heading_delta: f32,
    pub boost: bool,
}

impl Decision {
    #[must_use]
    pub const fn turn(heading_delta: f32) -> Self {
        Self {
            heading_delta,
            boost: false,
        }
    }
}

/// Lifecycle of a decision runtime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RuntimeState {
    #[default]
    Uninitialized,
    Ready,
    /// Sticky until the host calls [`DecisionBackend::reset`].
    Faulted,
}

/// Failures raised by decision backends.
///
/// All of these are contained at the agent boundary: the owning agent makes no decision
/// for the tick and the rest of the world carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// The support or agent script failed to parse or raised while loading.
    #[error("script failed to load: {0}")]
    ScriptLoad(String),
    /// The per-tick entry point raised or returned something unusable.
    #[error("script runtime error: {0}")]
    ScriptRuntime(String),
    /// The instruction or wall-clock budget ran out.
    #[error("script exceeded its quota: {0}")]
    QuotaExceeded(String),
    /// The runtime faulted on an earlier tick and has not been reset.
    #[error("decision runtime is faulted")]
    Faulted,
}

/// Thin trait object used to drive agent decisions without coupling to concrete runtimes.
pub trait DecisionBackend: Send {
    /// Static identifier of the backend implementation.
    fn kind(&self) -> &'static str;

    fn state(&self) -> RuntimeState;

    /// Prepare the backend. Failure leaves it [`RuntimeState::Faulted`].
    fn initialize(&mut self) -> Result<(), DecisionError>;

    /// Produce this tick's decision. Backends initialize lazily when still
    /// [`RuntimeState::Uninitialized`].
    fn step(&mut self, perception: &Perception) -> Result<Decision, DecisionError>;

    /// Return to [`RuntimeState::Uninitialized`], discarding any loaded state.
    fn reset(&mut self);
}

/// Backend that never turns; useful for scripted-less placeholders and tests.
#[derive(Debug, Default, Clone)]
pub struct HoldCourse {
    state: RuntimeState,
}

impl HoldCourse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionBackend for HoldCourse {
    fn kind(&self) -> &'static str {
        "hold-course"
    }

    fn state(&self) -> RuntimeState {
        self.state
    }

    fn initialize(&mut self) -> Result<(), DecisionError> {
        self.state = RuntimeState::Ready;
        Ok(())
    }

    fn step(&mut self, _perception: &Perception) -> Result<Decision, DecisionError> {
        if self.state == RuntimeState::Uninitialized {
            self.initialize()?;
        }
        Ok(Decision::default())
    }

    fn reset(&mut self) {
        self.state = RuntimeState::Uninitialized;
    }
}
