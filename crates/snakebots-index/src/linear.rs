use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;

use ordered_float::OrderedFloat;

use crate::{IndexError, Neighbor, Point, SpatialIndex, Torus, radius_sq};

#[derive(Debug, Clone)]
struct Entry<K, T> {
    id: K,
    position: Point,
    payload: T,
}

/// Brute-force index scanning every entity per query.
///
/// Correct for any radius and cheap for a few hundred entities; also serves as the
/// reference the grid index is checked against.
#[derive(Debug, Clone)]
pub struct LinearIndex<K, T> {
    torus: Torus,
    entries: Vec<Entry<K, T>>,
    slots: HashMap<K, usize>,
}

impl<K, T> LinearIndex<K, T>
where
    K: Copy + Eq + Hash + Debug,
{
    #[must_use]
    pub fn new(torus: Torus) -> Self {
        Self {
            torus,
            entries: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<K, T> SpatialIndex<K, T> for LinearIndex<K, T>
where
    K: Copy + Eq + Hash + Debug,
{
    fn torus(&self) -> &Torus {
        &self.torus
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, id: K, position: Point, payload: T) -> Result<(), IndexError> {
        if self.slots.contains_key(&id) {
            return Err(IndexError::duplicate(id));
        }
        IndexError::check_finite(id, position)?;
        self.slots.insert(id, self.entries.len());
        self.entries.push(Entry {
            id,
            position: self.torus.wrap(position),
            payload,
        });
        Ok(())
    }

    fn remove(&mut self, id: K) -> Result<T, IndexError> {
        let slot = self
            .slots
            .remove(&id)
            .ok_or_else(|| IndexError::not_found(id))?;
        let removed = self.entries.swap_remove(slot);
        if let Some(moved) = self.entries.get(slot) {
            self.slots.insert(moved.id, slot);
        }
        Ok(removed.payload)
    }

    fn update_position(&mut self, id: K, position: Point) -> Result<(), IndexError> {
        let slot = *self.slots.get(&id).ok_or_else(|| IndexError::not_found(id))?;
        IndexError::check_finite(id, position)?;
        self.entries[slot].position = self.torus.wrap(position);
        Ok(())
    }

    fn get(&self, id: K) -> Option<(Point, &T)> {
        let slot = *self.slots.get(&id)?;
        let entry = &self.entries[slot];
        Some((entry.position, &entry.payload))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }

    fn query_radius(
        &self,
        center: Point,
        radius: f32,
        visitor: &mut dyn FnMut(Neighbor<'_, K, T>) -> ControlFlow<()>,
    ) {
        let Some(limit) = radius_sq(radius) else {
            return;
        };
        let center = self.torus.wrap(center);
        for entry in &self.entries {
            let offset = self.torus.relative(entry.position, center);
            let distance_sq = offset.norm_sq();
            if !(distance_sq <= limit) {
                continue;
            }
            let hit = Neighbor {
                id: entry.id,
                position: entry.position,
                payload: &entry.payload,
                offset,
                distance_sq: OrderedFloat(distance_sq),
            };
            if visitor(hit).is_break() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> LinearIndex<u32, &'static str> {
        LinearIndex::new(Torus::new(100.0, 100.0).expect("torus"))
    }

    #[test]
    fn duplicate_and_missing_ids_are_rejected() {
        let mut idx = index();
        idx.insert(1, Point::new(5.0, 5.0), "a").expect("insert");
        assert_eq!(
            idx.insert(1, Point::new(6.0, 6.0), "b"),
            Err(IndexError::DuplicateId("1".into()))
        );
        assert_eq!(idx.remove(2), Err(IndexError::NotFound("2".into())));
        assert!(idx.update_position(3, Point::default()).is_err());
    }

    #[test]
    fn remove_keeps_slots_coherent() {
        let mut idx = index();
        for id in 0..4 {
            idx.insert(id, Point::new(id as f32, 0.0), "x").expect("insert");
        }
        assert_eq!(idx.remove(0).expect("remove"), "x");
        assert_eq!(idx.len(), 3);
        // id 3 was swapped into slot 0 and must still be addressable.
        idx.update_position(3, Point::new(50.0, 50.0)).expect("update");
        assert_eq!(idx.get(3).map(|(p, _)| p), Some(Point::new(50.0, 50.0)));
    }

    #[test]
    fn visitor_can_stop_early() {
        let mut idx = index();
        for id in 0..10 {
            idx.insert(id, Point::new(10.0, 10.0), "x").expect("insert");
        }
        let mut seen = 0;
        idx.query_radius(Point::new(10.0, 10.0), 1.0, &mut |_| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn negative_radius_matches_nothing() {
        let mut idx = index();
        idx.insert(1, Point::new(10.0, 10.0), "x").expect("insert");
        assert!(idx.ids_within(Point::new(10.0, 10.0), -1.0).is_empty());
        assert!(idx.ids_within(Point::new(10.0, 10.0), f32::NAN).is_empty());
        assert_eq!(idx.ids_within(Point::new(10.0, 10.0), 0.0), vec![1]);
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let mut idx = index();
        assert_eq!(
            idx.insert(1, Point::new(f32::NAN, 5.0), "x"),
            Err(IndexError::NonFinite("1".into()))
        );
        assert!(idx.insert(2, Point::new(1.0, f32::INFINITY), "x").is_err());
        assert!(idx.is_empty());

        idx.insert(3, Point::new(0.5, 0.5), "x").expect("insert");
        assert!(idx.update_position(3, Point::new(f32::NAN, 0.5)).is_err());
        assert_eq!(idx.get(3).map(|(p, _)| p), Some(Point::new(0.5, 0.5)));
        assert!(idx.ids_within(Point::new(f32::NAN, 0.5), 10.0).is_empty());
    }
}
