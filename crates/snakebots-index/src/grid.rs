use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::{IndexError, Neighbor, Point, SpatialIndex, Torus, radius_sq};

#[derive(Debug, Clone)]
struct GridEntry<T> {
    position: Point,
    cell: usize,
    payload: T,
}

/// Uniform bucket grid over the torus.
///
/// The requested cell size is stretched so that a whole number of cells tiles each axis,
/// which keeps the seam between the last and first column a regular cell boundary.
#[derive(Debug, Clone)]
pub struct UniformGridIndex<K, T> {
    torus: Torus,
    cols: usize,
    rows: usize,
    cell_width: f32,
    cell_height: f32,
    cells: Vec<SmallVec<[K; 4]>>,
    entries: HashMap<K, GridEntry<T>>,
}

impl<K, T> UniformGridIndex<K, T>
where
    K: Copy + Eq + Hash + Debug,
{
    /// Create a grid whose cells are roughly `cell_size` on a side.
    pub fn new(torus: Torus, cell_size: f32) -> Result<Self, IndexError> {
        let (cols, rows) = grid_dimensions(&torus, cell_size)?;
        Ok(Self {
            torus,
            cols,
            rows,
            cell_width: torus.width() / cols as f32,
            cell_height: torus.height() / rows as f32,
            cells: vec![SmallVec::new(); cols * rows],
            entries: HashMap::new(),
        })
    }

    /// Grid dimensions as `(columns, rows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn cell_coords(&self, p: Point) -> (usize, usize) {
        let col = ((p.x / self.cell_width) as usize).min(self.cols - 1);
        let row = ((p.y / self.cell_height) as usize).min(self.rows - 1);
        (col, row)
    }

    fn cell_of(&self, p: Point) -> usize {
        let (col, row) = self.cell_coords(p);
        row * self.cols + col
    }

    fn detach(&mut self, id: K, cell: usize) {
        let bucket = &mut self.cells[cell];
        if let Some(pos) = bucket.iter().position(|other| *other == id) {
            bucket.swap_remove(pos);
        }
    }
}

/// Upper bound on the number of buckets a grid may allocate.
pub const MAX_GRID_CELLS: usize = 1 << 20;

/// Columns and rows a grid over `torus` with cells of about `cell_size` would use.
///
/// Fails when the cell size is not positive or the grid would exceed [`MAX_GRID_CELLS`].
pub fn grid_dimensions(torus: &Torus, cell_size: f32) -> Result<(usize, usize), IndexError> {
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(IndexError::InvalidConfig("cell_size must be positive"));
    }
    let cols = axis_count(torus.width(), cell_size)?;
    let rows = axis_count(torus.height(), cell_size)?;
    match cols.checked_mul(rows) {
        Some(total) if total <= MAX_GRID_CELLS => Ok((cols, rows)),
        _ => Err(IndexError::InvalidConfig(
            "cell_size is too small for the domain",
        )),
    }
}

fn axis_count(extent: f32, cell_size: f32) -> Result<usize, IndexError> {
    let count = (extent / cell_size).floor().max(1.0);
    if count > MAX_GRID_CELLS as f32 {
        return Err(IndexError::InvalidConfig(
            "cell_size is too small for the domain",
        ));
    }
    Ok(count as usize)
}

/// Distinct cell indices within `reach` of `center` along an axis of `count` cells.
fn axis_cells(center: usize, reach: usize, count: usize) -> impl Iterator<Item = usize> {
    let (start, len) = if reach.saturating_mul(2).saturating_add(1) >= count {
        (0, count)
    } else {
        (center + count - reach, 2 * reach + 1)
    };
    (0..len).map(move |step| (start + step) % count)
}

impl<K, T> SpatialIndex<K, T> for UniformGridIndex<K, T>
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
        if self.entries.contains_key(&id) {
            return Err(IndexError::duplicate(id));
        }
        IndexError::check_finite(id, position)?;
        let position = self.torus.wrap(position);
        let cell = self.cell_of(position);
        self.cells[cell].push(id);
        self.entries.insert(
            id,
            GridEntry {
                position,
                cell,
                payload,
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: K) -> Result<T, IndexError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or_else(|| IndexError::not_found(id))?;
        self.detach(id, entry.cell);
        Ok(entry.payload)
    }

    fn update_position(&mut self, id: K, position: Point) -> Result<(), IndexError> {
        IndexError::check_finite(id, position)?;
        let position = self.torus.wrap(position);
        let cell = self.cell_of(position);
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| IndexError::not_found(id))?;
        entry.position = position;
        let previous = std::mem::replace(&mut entry.cell, cell);
        if previous != cell {
            self.detach(id, previous);
            self.cells[cell].push(id);
        }
        Ok(())
    }

    fn get(&self, id: K) -> Option<(Point, &T)> {
        self.entries
            .get(&id)
            .map(|entry| (entry.position, &entry.payload))
    }

    fn clear(&mut self) {
        self.entries.clear();
        for bucket in &mut self.cells {
            bucket.clear();
        }
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
        let (center_col, center_row) = self.cell_coords(center);
        // One extra ring absorbs rounding at cell boundaries.
        let reach_x = ((radius / self.cell_width).ceil() as usize).saturating_add(1);
        let reach_y = ((radius / self.cell_height).ceil() as usize).saturating_add(1);

        for row in axis_cells(center_row, reach_y, self.rows) {
            for col in axis_cells(center_col, reach_x, self.cols) {
                for id in &self.cells[row * self.cols + col] {
                    let Some(entry) = self.entries.get(id) else {
                        continue;
                    };
                    let offset = self.torus.relative(entry.position, center);
                    let distance_sq = offset.norm_sq();
                    if !(distance_sq <= limit) {
                        continue;
                    }
                    let hit = Neighbor {
                        id: *id,
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
    }
}
