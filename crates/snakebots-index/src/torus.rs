use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Point in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Translate by a relative vector (no wrapping).
    #[must_use]
    pub fn offset(self, by: RelativeVector) -> Self {
        Self::new(self.x + by.dx, self.y + by.dy)
    }
}

/// Shortest displacement between two points on the torus.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RelativeVector {
    pub dx: f32,
    pub dy: f32,
}

impl RelativeVector {
    #[must_use]
    pub const fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    #[must_use]
    pub fn norm_sq(self) -> f32 {
        self.dx * self.dx + self.dy * self.dy
    }

    #[must_use]
    pub fn norm(self) -> f32 {
        self.norm_sq().sqrt()
    }

    /// Angle of the vector measured from the +x axis, in `(-π, π]`.
    #[must_use]
    pub fn angle(self) -> f32 {
        self.dy.atan2(self.dx)
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.dx * factor, self.dy * factor)
    }
}

/// Rectangular domain with periodic boundaries on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Torus {
    width: f32,
    height: f32,
}

impl Torus {
    /// Build a torus; both extents must be finite and positive.
    pub fn new(width: f32, height: f32) -> Result<Self, IndexError> {
        if !(width.is_finite() && height.is_finite()) {
            return Err(IndexError::InvalidConfig("torus extents must be finite"));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(IndexError::InvalidConfig("torus extents must be positive"));
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// Reduce `p` into `[0, width) x [0, height)`.
    #[must_use]
    pub fn wrap(&self, p: Point) -> Point {
        Point::new(wrap_axis(p.x, self.width), wrap_axis(p.y, self.height))
    }

    /// Shortest vector leading from `reference` to `p`.
    #[must_use]
    pub fn relative(&self, p: Point, reference: Point) -> RelativeVector {
        RelativeVector::new(
            shortest_axis(p.x - reference.x, self.width),
            shortest_axis(p.y - reference.y, self.height),
        )
    }

    /// Squared wrapped distance between two points.
    #[must_use]
    pub fn distance_sq(&self, a: Point, b: Point) -> f32 {
        self.relative(b, a).norm_sq()
    }

    #[must_use]
    pub fn distance(&self, a: Point, b: Point) -> f32 {
        self.distance_sq(a, b).sqrt()
    }
}

fn wrap_axis(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid of a tiny negative value can round up to the extent itself.
    if wrapped >= extent { 0.0 } else { wrapped }
}

fn shortest_axis(delta: f32, extent: f32) -> f32 {
    let forward = wrap_axis(delta, extent);
    if forward > extent * 0.5 {
        forward - extent
    } else {
        forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn torus() -> Torus {
        Torus::new(100.0, 50.0).expect("torus")
    }

    #[test]
    fn rejects_degenerate_extents() {
        assert!(Torus::new(0.0, 10.0).is_err());
        assert!(Torus::new(10.0, -1.0).is_err());
        assert!(Torus::new(f32::INFINITY, 10.0).is_err());
        assert!(Torus::new(f32::NAN, 10.0).is_err());
    }

    #[test]
    fn wrap_handles_far_excursions() {
        let t = torus();
        let p = t.wrap(Point::new(-1_030.0, 2_575.0));
        assert_relative_eq!(p.x, 70.0, epsilon = 1e-3);
        assert_relative_eq!(p.y, 25.0, epsilon = 1e-3);
    }

    #[test]
    fn wrap_maps_upper_edge_to_zero() {
        let t = torus();
        let p = t.wrap(Point::new(100.0, 50.0));
        assert_eq!(p, Point::new(0.0, 0.0));
        let tiny = t.wrap(Point::new(-f32::EPSILON * 0.01, 0.0));
        assert!(tiny.x < 100.0);
    }

    #[test]
    fn relative_takes_the_short_way_round() {
        let t = torus();
        let v = t.relative(Point::new(1.0, 1.0), Point::new(99.0, 49.0));
        assert_relative_eq!(v.dx, 2.0, epsilon = 1e-4);
        assert_relative_eq!(v.dy, 2.0, epsilon = 1e-4);

        let back = t.relative(Point::new(99.0, 49.0), Point::new(1.0, 1.0));
        assert_relative_eq!(back.dx, -2.0, epsilon = 1e-4);
        assert_relative_eq!(back.dy, -2.0, epsilon = 1e-4);
    }

    #[test]
    fn distance_crosses_the_seam() {
        let t = Torus::new(100.0, 100.0).expect("torus");
        let d = t.distance(Point::new(99.0, 99.0), Point::new(1.0, 1.0));
        assert_relative_eq!(d, 8.0_f32.sqrt(), epsilon = 1e-4);
    }
}
