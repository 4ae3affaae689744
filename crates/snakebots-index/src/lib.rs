//! Spatial indexing abstractions for proximity queries on a wraparound arena.

use std::fmt::Debug;
use std::ops::ControlFlow;

use ordered_float::OrderedFloat;
use thiserror::Error;

mod grid;
mod linear;
mod torus;

pub use grid::{MAX_GRID_CELLS, UniformGridIndex, grid_dimensions};
pub use linear::LinearIndex;
pub use torus::{Point, RelativeVector, Torus};

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The id is already present in the index.
    #[error("entity {0} is already indexed")]
    DuplicateId(String),
    /// The id is not present in the index.
    #[error("entity {0} is not indexed")]
    NotFound(String),
    /// Positions must have finite coordinates.
    #[error("entity {0} has a non-finite position")]
    NonFinite(String),
}

impl IndexError {
    pub(crate) fn duplicate(id: impl Debug) -> Self {
        Self::DuplicateId(format!("{id:?}"))
    }

    pub(crate) fn not_found(id: impl Debug) -> Self {
        Self::NotFound(format!("{id:?}"))
    }

    /// Reject positions that could never satisfy a distance comparison.
    pub(crate) fn check_finite(id: impl Debug, position: Point) -> Result<(), Self> {
        if position.x.is_finite() && position.y.is_finite() {
            Ok(())
        } else {
            Err(Self::NonFinite(format!("{id:?}")))
        }
    }
}

/// A single hit reported to a query visitor.
#[derive(Debug)]
pub struct Neighbor<'a, K, T> {
    pub id: K,
    /// Stored (wrapped) position of the entity.
    pub position: Point,
    pub payload: &'a T,
    /// Shortest displacement from the query center to the entity.
    pub offset: RelativeVector,
    pub distance_sq: OrderedFloat<f32>,
}

impl<K, T> Neighbor<'_, K, T> {
    /// Wrapped Euclidean distance between the query center and the entity.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance_sq.into_inner().sqrt()
    }
}

/// Common behaviour exposed by proximity indices.
///
/// Queries take `&self` and mutations take `&mut self`, so a visitor can never observe
/// the index being modified underneath it.
pub trait SpatialIndex<K, T> {
    /// Domain the index wraps positions into.
    fn torus(&self) -> &Torus;

    /// Number of live entities.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a new entity; the position is wrapped into the domain.
    ///
    /// Fails with [`IndexError::NonFinite`] for NaN or infinite coordinates.
    fn insert(&mut self, id: K, position: Point, payload: T) -> Result<(), IndexError>;

    /// Remove an entity, returning its payload.
    fn remove(&mut self, id: K) -> Result<T, IndexError>;

    /// Move an existing entity. Non-finite positions are rejected and leave it in place.
    fn update_position(&mut self, id: K, position: Point) -> Result<(), IndexError>;

    /// Look up the stored position and payload of an entity.
    fn get(&self, id: K) -> Option<(Point, &T)>;

    /// Drop every entity.
    fn clear(&mut self);

    /// Visit every entity whose wrapped distance to `center` is at most `radius`.
    ///
    /// Visit order is unspecified. Returning [`ControlFlow::Break`] stops the scan.
    /// Negative or NaN radii visit nothing.
    fn query_radius(
        &self,
        center: Point,
        radius: f32,
        visitor: &mut dyn FnMut(Neighbor<'_, K, T>) -> ControlFlow<()>,
    );

    /// Collect the ids within `radius` of `center`.
    fn ids_within(&self, center: Point, radius: f32) -> Vec<K>
    where
        K: Copy,
    {
        let mut ids = Vec::new();
        self.query_radius(center, radius, &mut |hit| {
            ids.push(hit.id);
            ControlFlow::Continue(())
        });
        ids
    }
}

/// Squared query radius, or `None` when the radius cannot match anything.
pub(crate) fn radius_sq(radius: f32) -> Option<f32> {
    if radius.is_nan() || radius < 0.0 {
        None
    } else {
        Some(radius * radius)
    }
}
