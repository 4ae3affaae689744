use std::fmt;

use crate::{FoodItem, Point, SnakeBody, Torus, WorldError};

/// Largest arena, in cells, that a snapshot will render.
pub const MAX_SNAPSHOT_CELLS: usize = 1 << 24;

/// Character grid rendering of the arena, one cell per world unit.
///
/// Food shows as its value digit (`X` from 10 up), heads as `#`, other segments as `+`.
/// Later layers overwrite earlier ones, so snakes hide food underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugGrid {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl DebugGrid {
    pub(crate) fn render<'a>(
        torus: &Torus,
        food: impl Iterator<Item = &'a FoodItem>,
        bodies: impl Iterator<Item = &'a SnakeBody>,
    ) -> Result<Self, WorldError> {
        let too_large = WorldError::SnapshotTooLarge {
            width: torus.width(),
            height: torus.height(),
        };
        let width = torus.width().floor().max(1.0);
        let height = torus.height().floor().max(1.0);
        if width > MAX_SNAPSHOT_CELLS as f32 || height > MAX_SNAPSHOT_CELLS as f32 {
            return Err(too_large);
        }
        let (width, height) = (width as usize, height as usize);
        let cells = match width.checked_mul(height) {
            Some(total) if total <= MAX_SNAPSHOT_CELLS => total,
            _ => return Err(too_large),
        };
        let mut grid = Self {
            width,
            height,
            cells: vec!['.'; cells],
        };
        for item in food {
            grid.plot(item.position, food_glyph(item.value));
        }
        for body in bodies {
            for (idx, segment) in body.segments().iter().enumerate() {
                grid.plot(*segment, if idx == 0 { '#' } else { '+' });
            }
        }
        Ok(grid)
    }

    fn plot(&mut self, p: Point, glyph: char) {
        let x = (p.x.max(0.0).floor() as usize).min(self.width - 1);
        let y = (p.y.max(0.0).floor() as usize).min(self.height - 1);
        self.cells[y * self.width + x] = glyph;
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<char> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }

    /// Number of cells showing `glyph`.
    #[must_use]
    pub fn count(&self, glyph: char) -> usize {
        self.cells.iter().filter(|&&c| c == glyph).count()
    }
}

fn food_glyph(value: f32) -> char {
    if value >= 10.0 {
        return 'X';
    }
    char::from_digit(value.max(0.0).floor() as u32, 10).unwrap_or('X')
}

impl fmt::Display for DebugGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, line) in self.cells.chunks(self.width).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for c in line {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
