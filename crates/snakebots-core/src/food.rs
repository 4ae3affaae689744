use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{FoodId, Point, Torus, WorldError};

/// A static piece of food.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FoodItem {
    pub id: FoodId,
    pub position: Point,
    pub value: f32,
}

/// Samples food placement and value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FoodSampler {
    torus: Torus,
    value: Normal<f32>,
}

impl FoodSampler {
    pub(crate) fn new(torus: Torus, mean: f32, stddev: f32) -> Result<Self, WorldError> {
        let value = Normal::new(mean, stddev)
            .map_err(|_| WorldError::InvalidConfig("food value distribution is invalid"))?;
        Ok(Self { torus, value })
    }

    /// Uniform position over the arena and a non-negative value.
    pub(crate) fn sample<R: Rng>(&self, rng: &mut R) -> (Point, f32) {
        let x = rng.random_range(0.0..self.torus.width());
        let y = rng.random_range(0.0..self.torus.height());
        let value = self.value.sample(rng).max(0.0);
        (Point::new(x, y), value)
    }
}
