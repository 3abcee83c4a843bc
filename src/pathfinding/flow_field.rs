//! Goal-directed flow fields
//!
//! One reverse Dijkstra pass from the goal gives every cell its cheapest cost
//! to the goal and the neighbour to step to next. Many requesters sharing a
//! goal then read their paths off the field instead of searching separately.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::core::types::{Cell, Tick};
use crate::pathfinding::astar::{Path, PathResult};
use crate::pathfinding::cost_grid::{CostGrid, DIRECTIONS};

const UNREACHED: u32 = u32::MAX;
const NO_NEXT: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct FlowField {
    goal: Cell,
    width: usize,
    integration: Vec<u32>,
    next: Vec<u32>,
    built_at: Tick,
}

impl FlowField {
    /// Build the field for `goal` on the current terrain
    pub fn build(grid: &CostGrid, goal: Cell, tick: Tick) -> Self {
        let cells = grid.cell_count();
        let mut field = Self {
            goal,
            width: grid.width(),
            integration: vec![UNREACHED; cells],
            next: vec![NO_NEXT; cells],
            built_at: tick,
        };
        let Some(goal_index) = grid.index_of(goal) else {
            return field;
        };
        if !grid.is_passable(goal) {
            return field;
        }

        let mut open = BinaryHeap::new();
        field.integration[goal_index] = 0;
        open.push(Reverse((0u32, goal_index as u32)));

        while let Some(Reverse((cost, index))) = open.pop() {
            let index = index as usize;
            if cost > field.integration[index] {
                continue;
            }
            let to = grid.cell_of(index);
            // Relax every cell that can step onto `to`
            for &(dx, dy) in DIRECTIONS.iter() {
                let from = Cell::new(to.x + dx, to.y + dy);
                let Some(from_index) = grid.index_of(from) else {
                    continue;
                };
                let Some(step) = grid.move_cost(from, to) else {
                    continue;
                };
                let candidate = cost + step;
                if candidate < field.integration[from_index] {
                    field.integration[from_index] = candidate;
                    field.next[from_index] = index as u32;
                    open.push(Reverse((candidate, from_index as u32)));
                }
            }
        }
        field
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn built_at(&self) -> Tick {
        self.built_at
    }

    pub fn is_expired(&self, now: Tick, ttl: u64) -> bool {
        now.saturating_sub(self.built_at) > ttl
    }

    fn index_of(&self, cell: Cell) -> Option<usize> {
        let height = self.integration.len() / self.width.max(1);
        (cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.width && (cell.y as usize) < height)
            .then(|| cell.y as usize * self.width + cell.x as usize)
    }

    fn cell_of(&self, index: usize) -> Cell {
        Cell::new((index % self.width) as i32, (index / self.width) as i32)
    }

    /// Cheapest cost from `cell` to the goal, `None` if unreachable
    pub fn cost_to_goal(&self, cell: Cell) -> Option<u32> {
        let cost = *self.integration.get(self.index_of(cell)?)?;
        (cost != UNREACHED).then_some(cost)
    }

    /// The neighbour to step to from `cell`
    pub fn next_cell(&self, cell: Cell) -> Option<Cell> {
        let next = *self.next.get(self.index_of(cell)?)?;
        (next != NO_NEXT).then(|| self.cell_of(next as usize))
    }

    /// Unit step direction from `cell` toward the goal
    pub fn direction(&self, cell: Cell) -> Option<(i32, i32)> {
        self.next_cell(cell).map(|n| (n.x - cell.x, n.y - cell.y))
    }

    /// Follow the field from `start` to the goal
    pub fn path_from(&self, start: Cell) -> PathResult {
        let Some(cost) = self.cost_to_goal(start) else {
            return PathResult::NoPath;
        };
        let mut cells = vec![start];
        let mut current = start;
        while current != self.goal {
            match self.next_cell(current) {
                Some(next) if cells.len() <= self.integration.len() => {
                    cells.push(next);
                    current = next;
                }
                _ => return PathResult::NoPath,
            }
        }
        PathResult::Found(Path { cells, cost })
    }
}
