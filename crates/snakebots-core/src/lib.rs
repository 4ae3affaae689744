//! Core types shared across the SnakeBots workspace.
//!
//! A [`WorldState`] owns a toroidal arena, a static batch of food, and a generational
//! arena of [`Agent`]s. Each tick runs in two phases: every agent's
//! [`DecisionBackend`] is consulted against an immutable [`SpatialView`] of the previous
//! tick, then the resulting motion is applied and the spatial indices are updated.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

mod agent;
mod body;
mod config;
mod debug;
mod decision;
mod food;
mod sensing;
mod world;

pub use agent::{Agent, AgentIdentity};
pub use body::SnakeBody;
pub use config::{MIN_MAP_SIZE, ScriptSettings, SnakeBotsConfig};
pub use debug::{DebugGrid, MAX_SNAPSHOT_CELLS};
pub use decision::{Decision, DecisionBackend, DecisionError, HoldCourse, RuntimeState};
pub use food::FoodItem;
pub use sensing::{FoodSighting, Perception, SegmentKey, SegmentSighting, SegmentTag, SpatialView};
pub use snakebots_index::{IndexError, Point, RelativeVector, SpatialIndex, Torus};
pub use world::{TickSummary, WorldError, WorldState};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

new_key_type! {
    /// Stable handle for food items.
    pub struct FoodId;
}

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Reduce an angle into `[0, 2π)`; non-finite input collapses to zero.
#[must_use]
pub fn normalize_heading(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// Monotonic simulation tick counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}
