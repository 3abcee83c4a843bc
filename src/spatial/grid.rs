//! Generic grid for spatial data

use crate::core::types::{Cell, Vec2};

/// Generic 2D grid with configurable cell size
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T: Clone> {
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    pub origin: Vec2,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(width: usize, height: usize, cell_size: f32, origin: Vec2, fill: T) -> Self {
        Self {
            width,
            height,
            cell_size,
            origin,
            data: vec![fill; width * height],
        }
    }

    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.width && (cell.y as usize) < self.height
    }

    /// Flat index of an in-bounds cell
    #[inline]
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        self.in_bounds(cell)
            .then(|| cell.y as usize * self.width + cell.x as usize)
    }

    #[inline]
    pub fn cell_of(&self, index: usize) -> Cell {
        Cell::new((index % self.width) as i32, (index / self.width) as i32)
    }

    #[inline]
    pub fn get(&self, cell: Cell) -> Option<&T> {
        self.index_of(cell).map(|i| &self.data[i])
    }

    #[inline]
    pub fn get_mut(&mut self, cell: Cell) -> Option<&mut T> {
        self.index_of(cell).map(move |i| &mut self.data[i])
    }

    #[inline]
    pub fn set(&mut self, cell: Cell, value: T) {
        if let Some(i) = self.index_of(cell) {
            self.data[i] = value;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert world position to cell coordinates (clamped onto the grid)
    #[inline]
    pub fn world_to_cell(&self, pos: Vec2) -> Cell {
        let x = ((pos.x - self.origin.x) / self.cell_size).floor() as i32;
        let y = ((pos.y - self.origin.y) / self.cell_size).floor() as i32;
        Cell::new(
            x.clamp(0, self.width as i32 - 1),
            y.clamp(0, self.height as i32 - 1),
        )
    }

    /// Sample grid at world position
    pub fn sample(&self, pos: Vec2) -> Option<&T> {
        self.get(self.world_to_cell(pos))
    }

    /// Cell center in world coordinates
    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        Vec2::new(
            self.origin.x + (cell.x as f32 + 0.5) * self.cell_size,
            self.origin.y + (cell.y as f32 + 0.5) * self.cell_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_cell_roundtrip() {
        let grid = Grid::new(10, 10, 4.0, Vec2::ZERO, 0u8);
        let cell = grid.world_to_cell(Vec2::new(9.0, 17.5));
        assert_eq!(cell, Cell::new(2, 4));
        assert_eq!(grid.cell_center(cell), Vec2::new(10.0, 18.0));
        // Outside positions clamp onto the edge
        assert_eq!(grid.world_to_cell(Vec2::new(-5.0, 500.0)), Cell::new(0, 9));
    }

    #[test]
    fn test_index_bounds() {
        let mut grid = Grid::new(3, 2, 1.0, Vec2::ZERO, 1u8);
        assert_eq!(grid.index_of(Cell::new(2, 1)), Some(5));
        assert_eq!(grid.index_of(Cell::new(3, 0)), None);
        assert_eq!(grid.cell_of(4), Cell::new(1, 1));
        grid.set(Cell::new(1, 1), 7);
        assert_eq!(grid.get(Cell::new(1, 1)), Some(&7));
        grid.set(Cell::new(-1, 0), 9);
        assert_eq!(grid.len(), 6);
    }
}
