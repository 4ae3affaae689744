//! Agent-relative perception over the shared spatial indices.

use std::ops::ControlFlow;
use std::sync::Arc;

use snakebots_index::UniformGridIndex;
use uuid::Uuid;

use crate::{AgentId, FoodId, Point, RelativeVector, SpatialIndex, Torus, WorldError, normalize_heading};

/// Key of one body segment in the segment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub agent: AgentId,
    pub index: u32,
}

impl SegmentKey {
    #[must_use]
    pub const fn new(agent: AgentId, index: u32) -> Self {
        Self { agent, index }
    }
}

/// Payload stored for each indexed segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTag {
    pub owner: AgentId,
    pub owner_guid: Uuid,
    pub radius: f32,
}

/// Both proximity indices plus the arena they live on.
///
/// The world publishes this behind an `Arc`; during the decision phase it is read-only
/// and reflects positions committed at the end of the previous tick.
#[derive(Debug, Clone)]
pub struct SpatialView {
    torus: Torus,
    pub(crate) food: UniformGridIndex<FoodId, f32>,
    pub(crate) segments: UniformGridIndex<SegmentKey, SegmentTag>,
}

impl SpatialView {
    pub(crate) fn new(torus: Torus, cell_size: f32) -> Result<Self, WorldError> {
        Ok(Self {
            torus,
            food: UniformGridIndex::new(torus, cell_size)?,
            segments: UniformGridIndex::new(torus, cell_size)?,
        })
    }

    #[must_use]
    pub const fn torus(&self) -> &Torus {
        &self.torus
    }

    #[must_use]
    pub fn food(&self) -> &UniformGridIndex<FoodId, f32> {
        &self.food
    }

    #[must_use]
    pub fn segments(&self) -> &UniformGridIndex<SegmentKey, SegmentTag> {
        &self.segments
    }
}

/// One food item as seen from an agent's head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodSighting {
    pub food: FoodId,
    pub offset: RelativeVector,
    pub value: f32,
    /// Bearing relative to the agent's heading, in `[0, 2π)`.
    pub direction: f32,
    pub distance: f32,
}

/// One body segment as seen from an agent's head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSighting {
    pub owner: AgentId,
    pub owner_guid: Uuid,
    pub offset: RelativeVector,
    pub radius: f32,
    /// Bearing relative to the agent's heading, in `[0, 2π)`.
    pub direction: f32,
    pub distance: f32,
}

/// Agent-scoped handle over the spatial snapshot handed to decision backends.
///
/// Cheap to clone. Backends must drop their copies once a step completes so the world
/// can update the indices in place.
#[derive(Debug, Clone)]
pub struct Perception {
    view: Arc<SpatialView>,
    agent: AgentId,
    guid: Uuid,
    name: Arc<str>,
    head: Point,
    heading: f32,
    segment_radius: f32,
    max_sight: f32,
}

impl Perception {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        view: Arc<SpatialView>,
        agent: AgentId,
        guid: Uuid,
        name: Arc<str>,
        head: Point,
        heading: f32,
        segment_radius: f32,
        max_sight: f32,
    ) -> Self {
        Self {
            view,
            agent,
            guid,
            name,
            head,
            heading,
            segment_radius,
            max_sight,
        }
    }

    #[must_use]
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    #[must_use]
    pub const fn guid(&self) -> Uuid {
        self.guid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn head(&self) -> Point {
        self.head
    }

    #[must_use]
    pub const fn heading(&self) -> f32 {
        self.heading
    }

    #[must_use]
    pub const fn segment_radius(&self) -> f32 {
        self.segment_radius
    }

    /// Largest radius the sensing queries honour.
    #[must_use]
    pub const fn max_sight(&self) -> f32 {
        self.max_sight
    }

    fn clamp_radius(&self, radius: f32) -> f32 {
        if radius.is_nan() {
            return -1.0;
        }
        radius.min(self.max_sight)
    }

    fn bearing(&self, offset: RelativeVector) -> f32 {
        normalize_heading(offset.angle() - self.heading)
    }

    /// Food within `radius` (clamped to sight) whose value is at least `min_value`.
    ///
    /// The result is built fresh on every call; order is unspecified.
    #[must_use]
    pub fn find_food(&self, radius: f32, min_value: f32) -> Vec<FoodSighting> {
        let mut found = Vec::new();
        self.view
            .food
            .query_radius(self.head, self.clamp_radius(radius), &mut |hit| {
                if *hit.payload >= min_value {
                    found.push(FoodSighting {
                        food: hit.id,
                        offset: hit.offset,
                        value: *hit.payload,
                        direction: self.bearing(hit.offset),
                        distance: hit.offset.norm(),
                    });
                }
                ControlFlow::Continue(())
            });
        found
    }

    /// Body segments within `radius` (clamped to sight), optionally including our own.
    #[must_use]
    pub fn find_segments(&self, radius: f32, include_self: bool) -> Vec<SegmentSighting> {
        let mut found = Vec::new();
        self.view
            .segments
            .query_radius(self.head, self.clamp_radius(radius), &mut |hit| {
                if !include_self && hit.payload.owner == self.agent {
                    return ControlFlow::Continue(());
                }
                found.push(SegmentSighting {
                    owner: hit.payload.owner,
                    owner_guid: hit.payload.owner_guid,
                    offset: hit.offset,
                    radius: hit.payload.radius,
                    direction: self.bearing(hit.offset),
                    distance: hit.offset.norm(),
                });
                ControlFlow::Continue(())
            });
        found
    }
}
