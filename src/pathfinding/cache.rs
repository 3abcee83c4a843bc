//! Path cache keyed by (start, goal)
//!
//! Entries remember the cell rectangle their path covers so a terrain change
//! only evicts the paths that could have crossed it.

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::core::types::{Cell, CellRect};
use crate::pathfinding::astar::Path;

#[derive(Debug, Clone)]
struct CachedPath {
    path: Path,
    bounds: CellRect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidated: u64,
    pub evicted: u64,
}

#[derive(Debug)]
pub struct PathCache {
    entries: AHashMap<(Cell, Cell), CachedPath>,
    order: VecDeque<(Cell, Cell)>,
    capacity: usize,
    stats: CacheStats,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: AHashMap::new(),
            order: VecDeque::new(),
            capacity,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, start: Cell, goal: Cell) -> Option<Path> {
        match self.entries.get(&(start, goal)) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.path.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a found path; oldest entries are evicted past capacity
    pub fn insert(&mut self, path: &Path) {
        if self.capacity == 0 {
            return;
        }
        let (Some(start), Some(goal), Some(bounds)) = (path.start(), path.goal(), CellRect::covering(&path.cells))
        else {
            return;
        };
        let key = (start, goal);
        let entry = CachedPath { path: path.clone(), bounds };
        if self.entries.insert(key, entry).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                self.stats.evicted += 1;
            }
        }
    }

    /// Drop every path whose bounds touch `region`; returns how many
    pub fn invalidate_region(&mut self, region: CellRect) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.bounds.intersects(&region));
        let removed = before - self.entries.len();
        if removed > 0 {
            let entries = &self.entries;
            self.order.retain(|key| entries.contains_key(key));
            self.stats.invalidated += removed as u64;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
