use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::{
    Decision, DecisionBackend, DecisionError, Perception, RuntimeState, SnakeBody, Torus,
    normalize_heading,
};

/// Public identity of an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    pub guid: Uuid,
    pub name: Arc<str>,
}

/// A snake: identity, body and the backend deciding where it goes.
pub struct Agent {
    identity: AgentIdentity,
    body: SnakeBody,
    backend: Box<dyn DecisionBackend>,
    last_decision: Option<Decision>,
    last_error: Option<DecisionError>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("identity", &self.identity)
            .field("backend", &self.backend.kind())
            .field("state", &self.backend.state())
            .field("head", &self.body.head())
            .field("heading", &self.body.heading())
            .finish()
    }
}

impl Agent {
    pub(crate) fn new(
        identity: AgentIdentity,
        body: SnakeBody,
        backend: Box<dyn DecisionBackend>,
    ) -> Self {
        Self {
            identity,
            body,
            backend,
            last_decision: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    #[must_use]
    pub fn guid(&self) -> Uuid {
        self.identity.guid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    #[must_use]
    pub fn body(&self) -> &SnakeBody {
        &self.body
    }

    #[must_use]
    pub fn heading(&self) -> f32 {
        self.body.heading()
    }

    /// Backend identifier (e.g. `"rhai"`).
    #[must_use]
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    #[must_use]
    pub fn decision_state(&self) -> RuntimeState {
        self.backend.state()
    }

    /// Decision applied on the most recent tick, if the backend produced one.
    #[must_use]
    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision
    }

    /// The failure that moved the backend into the faulted state, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&DecisionError> {
        self.last_error.as_ref()
    }

    /// Ask the backend for this tick's decision; failures are logged and yield `None`.
    pub fn decide(&mut self, perception: &Perception) -> Option<Decision> {
        let decision = match self.backend.step(perception) {
            Ok(decision) => Some(decision),
            Err(DecisionError::Faulted) => {
                trace!(agent = %self.identity.name, "decision runtime faulted; holding course");
                None
            }
            Err(err) => {
                warn!(
                    agent = %self.identity.name,
                    guid = %self.identity.guid,
                    backend = self.backend.kind(),
                    %err,
                    "agent decision failed"
                );
                self.last_error = Some(err);
                None
            }
        };
        self.last_decision = decision;
        decision
    }

    /// Apply a decision (or the hold-course fallback) and move one step.
    pub(crate) fn apply(
        &mut self,
        decision: Option<Decision>,
        torus: &Torus,
        speed: f32,
        boost_speed: f32,
        max_turn: Option<f32>,
    ) {
        let Decision {
            heading_delta,
            boost,
        } = decision.unwrap_or_default();
        let delta = match max_turn {
            Some(limit) => heading_delta.clamp(-limit, limit),
            None => heading_delta,
        };
        if delta.is_finite() {
            self.body
                .set_heading(normalize_heading(self.body.heading() + delta));
        }
        let distance = if boost { boost_speed } else { speed };
        self.body.advance(torus, distance);
    }

    pub(crate) fn reset_backend(&mut self) {
        self.backend.reset();
        self.last_error = None;
        self.last_decision = None;
    }
}
