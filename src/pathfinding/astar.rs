//! A* search over a `CostGrid`
//!
//! Octile heuristic scaled to the 10/14 step costs. Terrain costs are at
//! least 1, so the heuristic never overestimates and the first time the goal
//! leaves the open set its cost is optimal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::core::types::Cell;
use crate::pathfinding::cost_grid::CostGrid;

const NO_PARENT: u32 = u32::MAX;

/// A found route, start and goal included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub cells: Vec<Cell>,
    pub cost: u32,
}

impl Path {
    pub fn start(&self) -> Option<Cell> {
        self.cells.first().copied()
    }

    pub fn goal(&self) -> Option<Cell> {
        self.cells.last().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathResult {
    Found(Path),
    NoPath,
}

impl PathResult {
    pub fn is_found(&self) -> bool {
        matches!(self, PathResult::Found(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            PathResult::Found(path) => Some(path),
            PathResult::NoPath => None,
        }
    }

    pub fn into_path(self) -> Option<Path> {
        match self {
            PathResult::Found(path) => Some(path),
            PathResult::NoPath => None,
        }
    }
}

/// Node in the A* open set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: u32,
    h: u32,
    index: u32,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap: lowest f, then lowest h, then lowest cell index
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reusable per-search buffers
///
/// Only the cells touched by the previous search are reset, so repeated
/// short searches on a large grid stay cheap.
#[derive(Debug, Default)]
pub struct SearchScratch {
    g: Vec<u32>,
    parent: Vec<u32>,
    closed: Vec<bool>,
    touched: Vec<u32>,
    open: BinaryHeap<OpenNode>,
}

impl SearchScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(&mut self, cells: usize) {
        if self.g.len() != cells {
            self.g = vec![u32::MAX; cells];
            self.parent = vec![NO_PARENT; cells];
            self.closed = vec![false; cells];
            self.touched.clear();
        } else {
            for &i in &self.touched {
                let i = i as usize;
                self.g[i] = u32::MAX;
                self.parent[i] = NO_PARENT;
                self.closed[i] = false;
            }
            self.touched.clear();
        }
        self.open.clear();
    }

    fn touch(&mut self, index: usize) {
        if self.g[index] == u32::MAX {
            self.touched.push(index as u32);
        }
    }
}

/// Find the cheapest path from `start` to `goal`
///
/// `start == goal` yields a single-cell path of cost 0. A goal that is
/// blocked or off the grid yields `NoPath`.
pub fn find_path(grid: &CostGrid, start: Cell, goal: Cell) -> PathResult {
    let mut scratch = SearchScratch::new();
    find_path_with(grid, start, goal, &mut scratch)
}

pub fn find_path_with(grid: &CostGrid, start: Cell, goal: Cell, scratch: &mut SearchScratch) -> PathResult {
    let (Some(start_index), Some(goal_index)) = (grid.index_of(start), grid.index_of(goal)) else {
        return PathResult::NoPath;
    };
    if !grid.is_passable(goal) {
        return PathResult::NoPath;
    }
    if start == goal {
        return PathResult::Found(Path { cells: vec![start], cost: 0 });
    }

    scratch.prepare(grid.cell_count());
    scratch.touch(start_index);
    scratch.g[start_index] = 0;
    let h = start.octile_distance(&goal);
    scratch.open.push(OpenNode { f: h, h, index: start_index as u32 });

    while let Some(current) = scratch.open.pop() {
        let index = current.index as usize;
        if scratch.closed[index] {
            continue;
        }
        scratch.closed[index] = true;

        if index == goal_index {
            return PathResult::Found(reconstruct_path(grid, scratch, goal_index));
        }

        let cell = grid.cell_of(index);
        let current_g = scratch.g[index];

        for (neighbor, step) in grid.neighbors(cell) {
            let Some(n) = grid.index_of(neighbor) else {
                continue;
            };
            if scratch.closed[n] {
                continue;
            }
            let tentative_g = current_g + step;
            if tentative_g < scratch.g[n] {
                scratch.touch(n);
                scratch.g[n] = tentative_g;
                scratch.parent[n] = index as u32;
                let h = neighbor.octile_distance(&goal);
                scratch.open.push(OpenNode { f: tentative_g + h, h, index: n as u32 });
            }
        }
    }

    PathResult::NoPath
}

fn reconstruct_path(grid: &CostGrid, scratch: &SearchScratch, goal_index: usize) -> Path {
    let mut cells = vec![grid.cell_of(goal_index)];
    let mut current = goal_index;
    while scratch.parent[current] != NO_PARENT {
        current = scratch.parent[current] as usize;
        cells.push(grid.cell_of(current));
    }
    cells.reverse();
    Path { cells, cost: scratch.g[goal_index] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinding::cost_grid::BLOCKED;

    fn cells(points: &[(i32, i32)]) -> Vec<Cell> {
        points.iter().map(|&p| Cell::from(p)).collect()
    }

    #[test]
    fn test_open_diagonal() {
        let grid = CostGrid::new(3, 3, 1.0);
        let result = find_path(&grid, Cell::new(0, 0), Cell::new(2, 2));
        let path = result.path().unwrap();
        assert_eq!(path.cells, cells(&[(0, 0), (1, 1), (2, 2)]));
        assert_eq!(path.cost, 28);
    }

    #[test]
    fn test_pathfind_around_obstacle() {
        let grid = CostGrid::from_rows(&[".....", "..#..", "..#..", "..#..", "....."], 1.0);
        let path = find_path(&grid, Cell::new(0, 2), Cell::new(4, 2)).into_path().unwrap();
        assert!(!path.cells.contains(&Cell::new(2, 2)));
        assert_eq!(grid.path_cost(&path.cells), Some(path.cost));
    }

    #[test]
    fn test_pathfind_prefers_cheap_terrain() {
        // Straight through the swamp costs 10 + 90 + 90 + 10; going round is cheaper
        let grid = CostGrid::from_rows(&[".99.", "....", "...."], 1.0);
        let path = find_path(&grid, Cell::new(0, 0), Cell::new(3, 0)).into_path().unwrap();
        assert!(!path.cells.contains(&Cell::new(1, 0)));
        assert_eq!(path.cost, 14 + 10 + 14);
    }

    #[test]
    fn test_pathfind_no_path() {
        let mut grid = CostGrid::new(6, 6, 1.0);
        for x in 0..6 {
            grid.set_cost(Cell::new(x, 3), BLOCKED);
        }
        assert_eq!(find_path(&grid, Cell::new(0, 0), Cell::new(5, 5)), PathResult::NoPath);
    }

    #[test]
    fn test_blocked_goal() {
        let grid = CostGrid::from_rows(&["..#"], 1.0);
        assert_eq!(find_path(&grid, Cell::new(0, 0), Cell::new(2, 0)), PathResult::NoPath);
        assert_eq!(find_path(&grid, Cell::new(0, 0), Cell::new(7, 0)), PathResult::NoPath);
    }

    #[test]
    fn test_pathfind_same_start_goal() {
        let grid = CostGrid::new(4, 4, 1.0);
        let path = find_path(&grid, Cell::new(1, 1), Cell::new(1, 1)).into_path().unwrap();
        assert_eq!(path.cells, vec![Cell::new(1, 1)]);
        assert_eq!(path.cost, 0);
    }

    #[test]
    fn test_scratch_reuse_matches_fresh_search() {
        let grid = CostGrid::from_rows(&["......", ".####.", "......", "#####.", "......"], 1.0);
        let mut scratch = SearchScratch::new();
        let queries = [
            (Cell::new(0, 0), Cell::new(0, 4)),
            (Cell::new(5, 4), Cell::new(0, 2)),
            (Cell::new(0, 4), Cell::new(0, 0)),
        ];
        for (start, goal) in queries {
            assert_eq!(
                find_path_with(&grid, start, goal, &mut scratch),
                find_path(&grid, start, goal)
            );
        }
    }

    #[test]
    fn test_no_corner_cut_in_path() {
        let grid = CostGrid::from_rows(&[".#", ".."], 1.0);
        let path = find_path(&grid, Cell::new(0, 0), Cell::new(1, 1)).into_path().unwrap();
        assert_eq!(path.cells, cells(&[(0, 0), (0, 1), (1, 1)]));
        assert_eq!(path.cost, 20);
    }
}
