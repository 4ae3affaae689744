use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use snakebots_index::{Torus, grid_dimensions};

use crate::WorldError;

/// Static configuration for a SnakeBots world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnakeBotsConfig {
    /// Width of the arena in world units.
    pub world_width: f32,
    /// Height of the arena in world units.
    pub world_height: f32,
    /// Number of static food items created with the world.
    pub food_count: usize,
    /// Mean of the normal distribution food values are drawn from.
    pub food_value_mean: f32,
    /// Standard deviation of the food value distribution.
    pub food_value_stddev: f32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Edge length of the spatial index buckets.
    pub index_cell_size: f32,
    /// Segments a newly created snake starts with (head included).
    pub initial_segments: usize,
    /// Radius of every segment of a new snake.
    pub segment_radius: f32,
    /// Distance kept between consecutive segments.
    pub segment_spacing: f32,
    /// Distance the head travels per tick.
    pub speed: f32,
    /// Distance the head travels per tick while boosting.
    pub boost_speed: f32,
    /// Optional cap on the heading change applied in one tick (radians).
    pub max_turn_per_tick: Option<f32>,
    /// Run the decision phase across the rayon pool.
    pub parallel_decisions: bool,
    /// Maximum number of tick summaries retained in memory.
    pub history_capacity: usize,
    /// Limits applied to each agent's decision runtime.
    pub script: ScriptSettings,
}

impl Default for SnakeBotsConfig {
    fn default() -> Self {
        Self {
            world_width: 128.0,
            world_height: 128.0,
            food_count: 100,
            food_value_mean: 3.0,
            food_value_stddev: 1.5,
            rng_seed: None,
            index_cell_size: 16.0,
            initial_segments: 5,
            segment_radius: 1.0,
            segment_spacing: 1.0,
            speed: 1.0,
            boost_speed: 2.0,
            max_turn_per_tick: None,
            parallel_decisions: true,
            history_capacity: 256,
            script: ScriptSettings::default(),
        }
    }
}

/// Resource limits and sensing constants for decision runtimes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptSettings {
    /// Instruction budget for one invocation.
    pub max_operations: u64,
    /// Wall-clock budget for one invocation, in milliseconds.
    pub time_budget_ms: u64,
    /// Maximum script call depth.
    pub max_call_depth: usize,
    /// Longest string a script may build.
    pub max_string_size: usize,
    /// Largest array a script may build; sensing results are truncated to it.
    pub max_array_size: usize,
    /// Largest object map a script may build, including sighting maps and `this`.
    pub max_map_size: usize,
    /// Longest line forwarded from `log`.
    pub max_log_line: usize,
    /// Sight radius of a snake with zero segment radius.
    pub sight_base: f32,
    /// Additional sight radius per unit of segment radius.
    pub sight_per_radius: f32,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            time_budget_ms: 100,
            max_call_depth: 64,
            max_string_size: 4_096,
            max_array_size: 4_096,
            max_map_size: 256,
            max_log_line: 256,
            sight_base: 50.0,
            sight_per_radius: 15.0,
        }
    }
}

/// Smallest map limit that still fits a segment sighting or the published `this` fields.
pub const MIN_MAP_SIZE: usize = 8;

impl ScriptSettings {
    /// Maximum query radius for a snake with the given segment radius.
    #[must_use]
    pub fn max_sight(&self, segment_radius: f32) -> f32 {
        self.sight_base + self.sight_per_radius * segment_radius
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

impl SnakeBotsConfig {
    /// Validate every field that would otherwise make the world unusable.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !positive(self.world_width) || !positive(self.world_height) {
            return Err(WorldError::InvalidConfig(
                "world dimensions must be finite and positive",
            ));
        }
        if !self.food_value_mean.is_finite() || !non_negative(self.food_value_stddev) {
            return Err(WorldError::InvalidConfig(
                "food value mean must be finite and stddev non-negative",
            ));
        }
        if !positive(self.index_cell_size) {
            return Err(WorldError::InvalidConfig("index_cell_size must be positive"));
        }
        let torus = Torus::new(self.world_width, self.world_height)?;
        if grid_dimensions(&torus, self.index_cell_size).is_err() {
            return Err(WorldError::InvalidConfig(
                "index_cell_size is too small for the world dimensions",
            ));
        }
        if self.initial_segments == 0 {
            return Err(WorldError::InvalidConfig(
                "initial_segments must be at least one",
            ));
        }
        if !positive(self.segment_radius) || !positive(self.segment_spacing) {
            return Err(WorldError::InvalidConfig(
                "segment radius and spacing must be positive",
            ));
        }
        if !non_negative(self.speed) || !non_negative(self.boost_speed) {
            return Err(WorldError::InvalidConfig(
                "speeds must be finite and non-negative",
            ));
        }
        if let Some(turn) = self.max_turn_per_tick
            && !positive(turn)
        {
            return Err(WorldError::InvalidConfig(
                "max_turn_per_tick must be positive when set",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig("history_capacity must be non-zero"));
        }
        self.script.validate()
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

impl ScriptSettings {
    fn validate(&self) -> Result<(), WorldError> {
        if self.max_operations == 0 || self.time_budget_ms == 0 {
            return Err(WorldError::InvalidConfig(
                "script quotas must be non-zero",
            ));
        }
        if self.max_call_depth == 0
            || self.max_string_size == 0
            || self.max_array_size == 0
            || self.max_log_line == 0
        {
            return Err(WorldError::InvalidConfig(
                "script size limits must be non-zero",
            ));
        }
        if self.max_map_size < MIN_MAP_SIZE {
            return Err(WorldError::InvalidConfig(
                "max_map_size is too small to hold a sighting",
            ));
        }
        if !non_negative(self.sight_base) || !non_negative(self.sight_per_radius) {
            return Err(WorldError::InvalidConfig(
                "sight constants must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SnakeBotsConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn degenerate_domains_are_rejected() {
        for (w, h) in [(0.0, 10.0), (10.0, -3.0), (f32::NAN, 1.0)] {
            let config = SnakeBotsConfig {
                world_width: w,
                world_height: h,
                ..SnakeBotsConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(WorldError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn oversized_index_grids_are_rejected() {
        let config = SnakeBotsConfig {
            world_width: 1.0e9,
            world_height: 1.0e9,
            index_cell_size: 1.0e-3,
            ..SnakeBotsConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldError::InvalidConfig(_))
        ));
        assert!(matches!(
            crate::WorldState::new(config),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn map_limit_must_fit_sightings() {
        let mut config = SnakeBotsConfig::default();
        config.script.max_map_size = MIN_MAP_SIZE - 1;
        assert!(config.validate().is_err());
        config.script.max_map_size = MIN_MAP_SIZE;
        config.script.max_array_size = 1;
        config.validate().expect("small arrays with room for sightings");
    }

    #[test]
    fn zero_quota_is_rejected() {
        let mut config = SnakeBotsConfig::default();
        config.script.max_operations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sight_grows_with_radius() {
        let settings = ScriptSettings::default();
        assert_eq!(settings.max_sight(0.0), 50.0);
        assert_eq!(settings.max_sight(2.0), 80.0);
    }
}
