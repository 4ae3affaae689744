use serde::{Deserialize, Serialize};

use crate::{Point, RelativeVector, Torus, normalize_heading};

/// Chain of segments trailing a head, all wrapped into the arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnakeBody {
    segments: Vec<Point>,
    segment_radius: f32,
    spacing: f32,
    heading: f32,
}

impl SnakeBody {
    /// Lay out `count` segments in a straight line behind `head`, opposite `heading`.
    #[must_use]
    pub fn new(
        torus: &Torus,
        head: Point,
        heading: f32,
        count: usize,
        spacing: f32,
        segment_radius: f32,
    ) -> Self {
        let heading = normalize_heading(heading);
        let back = RelativeVector::new(-heading.cos() * spacing, -heading.sin() * spacing);
        let segments = (0..count.max(1))
            .map(|idx| torus.wrap(head.offset(back.scaled(idx as f32))))
            .collect();
        Self {
            segments,
            segment_radius,
            spacing,
            heading,
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Point] {
        &self.segments
    }

    #[must_use]
    pub fn head(&self) -> Point {
        self.segments[0]
    }

    #[must_use]
    pub const fn segment_radius(&self) -> f32 {
        self.segment_radius
    }

    /// Heading in radians within `[0, 2π)`.
    #[must_use]
    pub const fn heading(&self) -> f32 {
        self.heading
    }

    pub(crate) fn set_heading(&mut self, heading: f32) {
        self.heading = normalize_heading(heading);
    }

    /// Move the head `distance` along the current heading and drag the chain after it.
    pub(crate) fn advance(&mut self, torus: &Torus, distance: f32) {
        let step = RelativeVector::new(self.heading.cos() * distance, self.heading.sin() * distance);
        self.segments[0] = torus.wrap(self.segments[0].offset(step));
        for idx in 1..self.segments.len() {
            let leader = self.segments[idx - 1];
            let follower = self.segments[idx];
            let gap = torus.relative(follower, leader);
            let length = gap.norm();
            if length > self.spacing {
                let pulled = gap.scaled(self.spacing / length);
                self.segments[idx] = torus.wrap(leader.offset(pulled));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn torus() -> Torus {
        Torus::new(20.0, 20.0).expect("torus")
    }

    #[test]
    fn segments_trail_behind_the_head() {
        let body = SnakeBody::new(&torus(), Point::new(1.0, 5.0), 0.0, 3, 1.0, 0.5);
        assert_eq!(body.segments().len(), 3);
        assert_eq!(body.head(), Point::new(1.0, 5.0));
        assert_relative_eq!(body.segments()[1].x, 0.0, epsilon = 1e-5);
        // The third segment wraps across the left edge.
        assert_relative_eq!(body.segments()[2].x, 19.0, epsilon = 1e-4);
    }

    #[test]
    fn advance_moves_head_and_keeps_spacing() {
        let t = torus();
        let mut body = SnakeBody::new(&t, Point::new(19.5, 10.0), 0.0, 4, 1.0, 0.5);
        body.advance(&t, 1.0);
        assert_relative_eq!(body.head().x, 0.5, epsilon = 1e-4);
        for pair in body.segments().windows(2) {
            assert!(t.distance(pair[0], pair[1]) <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn turning_bends_the_chain() {
        let t = torus();
        let mut body = SnakeBody::new(&t, Point::new(10.0, 10.0), 0.0, 3, 1.0, 0.5);
        body.set_heading(FRAC_PI_2);
        body.advance(&t, 1.0);
        assert_relative_eq!(body.head().y, 11.0, epsilon = 1e-5);
        assert_relative_eq!(body.head().x, 10.0, epsilon = 1e-5);
        assert!(t.distance(body.segments()[0], body.segments()[1]) <= 1.0 + 1e-4);
    }
}
