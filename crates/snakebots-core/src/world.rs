use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::food::FoodSampler;
use crate::{
    Agent, AgentId, AgentIdentity, DebugGrid, Decision, DecisionBackend, FoodId, FoodItem,
    IndexError, Perception, Point, RelativeVector, RuntimeState, ScriptSettings, SegmentKey,
    SegmentTag, SnakeBody, SnakeBotsConfig, SpatialIndex, SpatialView, Tick, Torus,
};

/// Errors raised by world construction and host-facing operations.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The handle does not name a live agent.
    #[error("unknown agent {0:?}")]
    UnknownAgent(AgentId),
    /// The arena has too many cells to render as text.
    #[error("a {width}x{height} arena is too large for a debug snapshot")]
    SnapshotTooLarge { width: f32, height: f32 },
    /// A spatial index contract was violated.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Summary recorded after each tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_count: usize,
    /// Agents whose backend produced a decision this tick.
    pub decisions: usize,
    /// Agents that fell back to holding course.
    pub undecided: usize,
    /// Agents whose backend is faulted after this tick.
    pub faulted: usize,
    pub food_count: usize,
}

/// Aggregate world state: arena, food, agents and their spatial indices.
pub struct WorldState {
    config: SnakeBotsConfig,
    torus: Torus,
    tick: Tick,
    rng: SmallRng,
    food_sampler: FoodSampler,
    food: SlotMap<FoodId, FoodItem>,
    agents: SlotMap<AgentId, Agent>,
    view: Arc<SpatialView>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("torus", &self.torus)
            .field("tick", &self.tick)
            .field("agent_count", &self.agents.len())
            .field("food_count", &self.food.len())
            .finish()
    }
}

impl WorldState {
    /// Instantiate a new world and seed its static food.
    pub fn new(config: SnakeBotsConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let torus = Torus::new(config.world_width, config.world_height)?;
        let food_sampler =
            FoodSampler::new(torus, config.food_value_mean, config.food_value_stddev)?;
        let view = SpatialView::new(torus, config.index_cell_size)?;
        let mut world = Self {
            torus,
            tick: Tick::zero(),
            rng: config.seeded_rng(),
            food_sampler,
            food: SlotMap::with_key(),
            agents: SlotMap::with_key(),
            view: Arc::new(view),
            history: VecDeque::with_capacity(config.history_capacity),
            config,
        };
        world.create_food(world.config.food_count)?;
        info!(
            width = world.torus.width(),
            height = world.torus.height(),
            food = world.food.len(),
            "world created"
        );
        Ok(world)
    }

    /// Scatter `count` food items uniformly with normally distributed values.
    pub fn create_food(&mut self, count: usize) -> Result<(), WorldError> {
        for _ in 0..count {
            let (position, value) = self.food_sampler.sample(&mut self.rng);
            self.insert_food(position, value)?;
        }
        Ok(())
    }

    /// Place a single food item at a chosen position.
    pub fn place_food(&mut self, position: Point, value: f32) -> Result<FoodId, WorldError> {
        if !value.is_finite() || value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "food value must be finite and non-negative",
            ));
        }
        if !is_finite_point(position) {
            return Err(WorldError::InvalidConfig("food position must be finite"));
        }
        self.insert_food(position, value)
    }

    fn insert_food(&mut self, position: Point, value: f32) -> Result<FoodId, WorldError> {
        let position = self.torus.wrap(position);
        let id = self.food.insert_with_key(|id| FoodItem {
            id,
            position,
            value,
        });
        if let Err(err) = Arc::make_mut(&mut self.view).food.insert(id, position, value) {
            self.food.remove(id);
            return Err(err.into());
        }
        Ok(id)
    }

    /// Add an agent at a random position, heading along +x.
    pub fn add_agent(
        &mut self,
        name: impl Into<Arc<str>>,
        backend: Box<dyn DecisionBackend>,
    ) -> Result<AgentId, WorldError> {
        let head = Point::new(
            self.rng.random_range(0.0..self.torus.width()),
            self.rng.random_range(0.0..self.torus.height()),
        );
        self.add_agent_at(name, backend, head, 0.0)
    }

    /// Add an agent with an explicit head position and heading (radians).
    pub fn add_agent_at(
        &mut self,
        name: impl Into<Arc<str>>,
        backend: Box<dyn DecisionBackend>,
        head: Point,
        heading: f32,
    ) -> Result<AgentId, WorldError> {
        if !is_finite_point(head) || !heading.is_finite() {
            return Err(WorldError::InvalidConfig(
                "agent head and heading must be finite",
            ));
        }
        let identity = AgentIdentity {
            guid: uuid::Builder::from_random_bytes(self.rng.random()).into_uuid(),
            name: name.into(),
        };
        let body = SnakeBody::new(
            &self.torus,
            self.torus.wrap(head),
            heading,
            self.config.initial_segments,
            self.config.segment_spacing,
            self.config.segment_radius,
        );
        let tag_radius = body.segment_radius();
        let guid = identity.guid;
        info!(agent = %identity.name, %guid, "created agent");
        let id = self.agents.insert(Agent::new(identity, body, backend));

        let tag = SegmentTag {
            owner: id,
            owner_guid: guid,
            radius: tag_radius,
        };
        let segments = self.agents[id].body().segments().to_vec();
        let view = Arc::make_mut(&mut self.view);
        for (idx, position) in segments.iter().enumerate() {
            let key = SegmentKey::new(id, idx as u32);
            if let Err(err) = view.segments.insert(key, *position, tag) {
                for undo in 0..idx {
                    let _ = view.segments.remove(SegmentKey::new(id, undo as u32));
                }
                self.agents.remove(id);
                return Err(err.into());
            }
        }
        Ok(id)
    }

    /// Remove an agent together with its index entries, returning it.
    pub fn remove_agent(&mut self, id: AgentId) -> Result<Agent, WorldError> {
        let agent = self.agents.remove(id).ok_or(WorldError::UnknownAgent(id))?;
        let view = Arc::make_mut(&mut self.view);
        for idx in 0..agent.body().segments().len() {
            view.segments.remove(SegmentKey::new(id, idx as u32))?;
        }
        info!(agent = %agent.name(), guid = %agent.guid(), "removed agent");
        Ok(agent)
    }

    /// Put a faulted (or any) agent's backend back into its uninitialized state.
    pub fn reset_agent_decisions(&mut self, id: AgentId) -> Result<(), WorldError> {
        let agent = self.agents.get_mut(id).ok_or(WorldError::UnknownAgent(id))?;
        agent.reset_backend();
        debug!(agent = %agent.name(), "decision backend reset");
        Ok(())
    }

    /// Perception handle for an agent over the current spatial snapshot.
    pub fn perception_for(&self, id: AgentId) -> Result<Perception, WorldError> {
        let agent = self.agents.get(id).ok_or(WorldError::UnknownAgent(id))?;
        Ok(Self::perceive(&self.view, &self.config.script, id, agent))
    }

    fn perceive(
        view: &Arc<SpatialView>,
        settings: &ScriptSettings,
        id: AgentId,
        agent: &Agent,
    ) -> Perception {
        let body = agent.body();
        Perception::new(
            Arc::clone(view),
            id,
            agent.guid(),
            Arc::clone(&agent.identity().name),
            body.head(),
            body.heading(),
            body.segment_radius(),
            settings.max_sight(body.segment_radius()),
        )
    }

    fn stage_decisions(&mut self) -> Vec<(AgentId, Option<Decision>)> {
        let view = Arc::clone(&self.view);
        let settings = &self.config.script;
        let decide = |(id, agent): (AgentId, &mut Agent)| {
            let perception = Self::perceive(&view, settings, id, agent);
            (id, agent.decide(&perception))
        };
        if self.config.parallel_decisions {
            let agents: Vec<(AgentId, &mut Agent)> = self.agents.iter_mut().collect();
            agents.into_par_iter().map(decide).collect()
        } else {
            self.agents.iter_mut().map(decide).collect()
        }
    }

    fn stage_apply(&mut self, decisions: &[(AgentId, Option<Decision>)]) -> Result<(), WorldError> {
        let torus = self.torus;
        let speed = self.config.speed;
        let boost_speed = self.config.boost_speed;
        let max_turn = self.config.max_turn_per_tick;
        let view = Arc::make_mut(&mut self.view);
        let mut before = Vec::new();
        for &(id, decision) in decisions {
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            before.clear();
            before.extend_from_slice(agent.body().segments());
            agent.apply(decision, &torus, speed, boost_speed, max_turn);
            for (idx, (old, new)) in before.iter().zip(agent.body().segments()).enumerate() {
                if old != new {
                    view.segments
                        .update_position(SegmentKey::new(id, idx as u32), *new)?;
                }
            }
        }
        Ok(())
    }

    /// Execute one tick: decide against last tick's snapshot, then move everyone.
    pub fn step(&mut self) -> Result<TickSummary, WorldError> {
        let decisions = self.stage_decisions();
        self.stage_apply(&decisions)?;
        self.tick = self.tick.next();

        let decided = decisions.iter().filter(|(_, d)| d.is_some()).count();
        let faulted = self
            .agents
            .values()
            .filter(|agent| agent.decision_state() == RuntimeState::Faulted)
            .count();
        let summary = TickSummary {
            tick: self.tick,
            agent_count: self.agents.len(),
            decisions: decided,
            undecided: decisions.len() - decided,
            faulted,
            food_count: self.food.len(),
        };
        debug!(
            tick = summary.tick.0,
            agents = summary.agent_count,
            decisions = summary.decisions,
            faulted = summary.faulted,
            "tick complete"
        );
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        Ok(summary)
    }

    /// Wrap a point into the arena.
    #[must_use]
    pub fn wrap_coords(&self, p: Point) -> Point {
        self.torus.wrap(p)
    }

    /// Shortest vector from `reference` to `p`.
    #[must_use]
    pub fn unwrap_coords(&self, p: Point, reference: Point) -> RelativeVector {
        self.torus.relative(p, reference)
    }

    /// ASCII rendering of food and snakes for debugging.
    ///
    /// Arenas above [`MAX_SNAPSHOT_CELLS`](crate::MAX_SNAPSHOT_CELLS) cells are refused.
    pub fn debug_snapshot(&self) -> Result<DebugGrid, WorldError> {
        DebugGrid::render(
            &self.torus,
            self.food.values(),
            self.agents.values().map(Agent::body),
        )
    }

    #[must_use]
    pub fn config(&self) -> &SnakeBotsConfig {
        &self.config
    }

    #[must_use]
    pub const fn torus(&self) -> &Torus {
        &self.torus
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.agents.iter()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Resolve a public GUID to the world-internal handle.
    #[must_use]
    pub fn find_agent_by_guid(&self, guid: Uuid) -> Option<AgentId> {
        self.agents
            .iter()
            .find(|(_, agent)| agent.guid() == guid)
            .map(|(id, _)| id)
    }

    pub fn food(&self) -> impl Iterator<Item = &FoodItem> {
        self.food.values()
    }

    #[must_use]
    pub fn food_item(&self, id: FoodId) -> Option<&FoodItem> {
        self.food.get(id)
    }

    #[must_use]
    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    /// Spatial snapshot the next decision phase will read.
    #[must_use]
    pub fn spatial_view(&self) -> &SpatialView {
        &self.view
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

fn is_finite_point(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}
