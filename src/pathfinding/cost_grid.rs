//! Terrain cost grid
//!
//! Step costs use the integer x10 convention: an orthogonal step costs 10, a
//! diagonal step 14, each multiplied by the terrain cost of the cell entered.
//! A terrain cost of 0 marks the cell impassable.

use crate::core::types::{Cell, CellRect, Vec2};
use crate::spatial::grid::Grid;

pub const ORTHOGONAL_STEP: u32 = 10;
pub const DIAGONAL_STEP: u32 = 14;
pub const BLOCKED: u8 = 0;

/// The 8-neighbourhood, orthogonal directions first
pub const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CostGrid {
    grid: Grid<u8>,
}

impl CostGrid {
    /// Open terrain (cost 1 everywhere)
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        Self {
            grid: Grid::new(width, height, cell_size, Vec2::ZERO, 1),
        }
    }

    /// Parse an ASCII map: `.` open, `#` blocked, `1`-`9` terrain cost
    ///
    /// Rows must have equal length; unknown characters count as open.
    pub fn from_rows(rows: &[&str], cell_size: f32) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.chars().count());
        let mut grid = Self::new(width, height, cell_size);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let cost = match ch {
                    '#' => BLOCKED,
                    '1'..='9' => ch as u8 - b'0',
                    _ => 1,
                };
                grid.set_cost(Cell::new(x as i32, y as i32), cost);
            }
        }
        grid
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn cell_count(&self) -> usize {
        self.grid.len()
    }

    pub fn cell_size(&self) -> f32 {
        self.grid.cell_size
    }

    pub fn bounds(&self) -> CellRect {
        CellRect::new(
            Cell::new(0, 0),
            Cell::new(self.grid.width as i32 - 1, self.grid.height as i32 - 1),
        )
    }

    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.grid.in_bounds(cell)
    }

    #[inline]
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        self.grid.index_of(cell)
    }

    #[inline]
    pub fn cell_of(&self, index: usize) -> Cell {
        self.grid.cell_of(index)
    }

    /// Terrain cost, `None` outside the grid
    #[inline]
    pub fn cost(&self, cell: Cell) -> Option<u8> {
        self.grid.get(cell).copied()
    }

    #[inline]
    pub fn is_passable(&self, cell: Cell) -> bool {
        self.cost(cell).is_some_and(|c| c != BLOCKED)
    }

    pub fn set_cost(&mut self, cell: Cell, cost: u8) {
        self.grid.set(cell, cost);
    }

    /// Set every cell in `region`; returns the part of the region on the grid
    pub fn fill_region(&mut self, region: CellRect, cost: u8) -> Option<CellRect> {
        let clipped = self.clip(region)?;
        for cell in clipped.cells() {
            self.grid.set(cell, cost);
        }
        Some(clipped)
    }

    pub fn clip(&self, region: CellRect) -> Option<CellRect> {
        let bounds = self.bounds();
        if !bounds.intersects(&region) {
            return None;
        }
        Some(CellRect {
            min: Cell::new(region.min.x.max(bounds.min.x), region.min.y.max(bounds.min.y)),
            max: Cell::new(region.max.x.min(bounds.max.x), region.max.y.min(bounds.max.y)),
        })
    }

    /// Cost of stepping between two adjacent cells
    ///
    /// Diagonal steps may not cut the corner of a blocked cell.
    #[inline]
    pub fn move_cost(&self, from: Cell, to: Cell) -> Option<u32> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx.abs() > 1 || dy.abs() > 1 || (dx == 0 && dy == 0) || !self.in_bounds(from) {
            return None;
        }
        let terrain = self.cost(to).filter(|&c| c != BLOCKED)? as u32;
        if dx != 0 && dy != 0 {
            if !self.is_passable(Cell::new(from.x + dx, from.y)) || !self.is_passable(Cell::new(from.x, from.y + dy)) {
                return None;
            }
            Some(DIAGONAL_STEP * terrain)
        } else {
            Some(ORTHOGONAL_STEP * terrain)
        }
    }

    /// Reachable neighbours of `cell` with their step costs
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = (Cell, u32)> + '_ {
        DIRECTIONS.iter().filter_map(move |&(dx, dy)| {
            let to = Cell::new(cell.x + dx, cell.y + dy);
            self.move_cost(cell, to).map(|cost| (to, cost))
        })
    }

    pub fn world_to_cell(&self, pos: Vec2) -> Cell {
        self.grid.world_to_cell(pos)
    }

    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        self.grid.cell_center(cell)
    }

    /// Total cost of walking a path, `None` if any step is invalid
    pub fn path_cost(&self, path: &[Cell]) -> Option<u32> {
        path.windows(2).try_fold(0u32, |total, step| {
            self.move_cost(step[0], step[1]).map(|c| total + c)
        })
    }
}
