//! Asynchronous path request service
//!
//! Systems submit requests and get a `PathTicket` back. Requests are resolved
//! during `process` (once per tick, by the path service system) in submission
//! order: path cache first, then a live flow field for the goal, then A*.
//! Goals wanted by more than `batch_threshold` requesters in the same tick get
//! a flow field instead of individual searches, and large search batches fan
//! out over rayon.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::config::PathfindingConfig;
use crate::core::types::{Cell, CellRect, EntityHandle, Tick};
use crate::pathfinding::astar::{self, PathResult, SearchScratch};
use crate::pathfinding::cache::PathCache;
use crate::pathfinding::cost_grid::CostGrid;
use crate::pathfinding::flow_field::FlowField;

/// Receipt for a submitted request
///
/// Goes stale once the result is taken or the request is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathTicket {
    slot: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TicketStatus {
    Pending,
    Ready,
    /// Taken, cancelled, or never issued
    Unknown,
}

#[derive(Debug, Clone)]
enum SlotState {
    Free,
    Pending,
    Ready(PathResult),
}

#[derive(Debug, Clone)]
struct RequestSlot {
    generation: u32,
    owner: Option<EntityHandle>,
    start: Cell,
    goal: Cell,
    state: SlotState,
}

/// Running totals since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathStats {
    pub requests: u64,
    pub cancelled: u64,
    pub searches: u64,
    pub cache_hits: u64,
    pub flow_fields_built: u64,
    pub flow_field_paths: u64,
    pub no_path: u64,
    pub deferred: u64,
}

/// What a single `process` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub from_cache: usize,
    pub from_flow_field: usize,
    pub searched: usize,
    pub flow_fields_built: usize,
    pub deferred: usize,
}

impl ProcessReport {
    pub fn resolved(&self) -> usize {
        self.from_cache + self.from_flow_field + self.searched
    }
}

pub struct Pathfinder {
    config: PathfindingConfig,
    slots: Vec<RequestSlot>,
    free_slots: Vec<u32>,
    pending: VecDeque<PathTicket>,
    by_owner: AHashMap<EntityHandle, PathTicket>,
    cache: PathCache,
    flow_fields: AHashMap<Cell, FlowField>,
    scratch: SearchScratch,
    stats: PathStats,
}

impl Pathfinder {
    pub fn new(config: PathfindingConfig) -> Self {
        let cache = PathCache::new(config.cache_capacity);
        Self {
            config,
            slots: Vec::new(),
            free_slots: Vec::new(),
            pending: VecDeque::new(),
            by_owner: AHashMap::new(),
            cache,
            flow_fields: AHashMap::new(),
            scratch: SearchScratch::new(),
            stats: PathStats::default(),
        }
    }

    /// Submit a request; an owner's previous request is cancelled
    pub fn request(&mut self, owner: EntityHandle, start: Cell, goal: Cell) -> PathTicket {
        if let Some(previous) = self.by_owner.get(&owner).copied() {
            self.cancel(previous);
        }
        let ticket = self.submit(Some(owner), start, goal);
        self.by_owner.insert(owner, ticket);
        ticket
    }

    /// Submit a request nobody owns (tools, benches)
    pub fn request_unowned(&mut self, start: Cell, goal: Cell) -> PathTicket {
        self.submit(None, start, goal)
    }

    fn submit(&mut self, owner: Option<EntityHandle>, start: Cell, goal: Cell) -> PathTicket {
        let slot = RequestSlot {
            generation: 0,
            owner,
            start,
            goal,
            state: SlotState::Pending,
        };
        let ticket = match self.free_slots.pop() {
            Some(index) => {
                let existing = &mut self.slots[index as usize];
                let generation = existing.generation;
                *existing = RequestSlot { generation, ..slot };
                PathTicket { slot: index, generation }
            }
            None => {
                self.slots.push(slot);
                PathTicket {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.pending.push_back(ticket);
        self.stats.requests += 1;
        ticket
    }

    fn live_slot(&self, ticket: PathTicket) -> Option<&RequestSlot> {
        self.slots
            .get(ticket.slot as usize)
            .filter(|s| s.generation == ticket.generation && !matches!(s.state, SlotState::Free))
    }

    pub fn status(&self, ticket: PathTicket) -> TicketStatus {
        match self.live_slot(ticket).map(|s| &s.state) {
            Some(SlotState::Pending) => TicketStatus::Pending,
            Some(SlotState::Ready(_)) => TicketStatus::Ready,
            _ => TicketStatus::Unknown,
        }
    }

    /// Peek at a finished result without consuming the ticket
    pub fn poll(&self, ticket: PathTicket) -> Option<&PathResult> {
        match &self.live_slot(ticket)?.state {
            SlotState::Ready(result) => Some(result),
            _ => None,
        }
    }

    /// Consume a finished result; the ticket is stale afterwards
    pub fn take(&mut self, ticket: PathTicket) -> Option<PathResult> {
        if self.status(ticket) != TicketStatus::Ready {
            return None;
        }
        match self.release(ticket) {
            Some(SlotState::Ready(result)) => Some(result),
            _ => None,
        }
    }

    /// Drop a pending or finished request
    pub fn cancel(&mut self, ticket: PathTicket) -> bool {
        if self.live_slot(ticket).is_none() {
            return false;
        }
        self.release(ticket);
        self.stats.cancelled += 1;
        true
    }

    /// Drop whatever `owner` has in flight (entity destroyed)
    pub fn cancel_owner(&mut self, owner: EntityHandle) -> bool {
        match self.by_owner.get(&owner).copied() {
            Some(ticket) => self.cancel(ticket),
            None => false,
        }
    }

    pub fn ticket_for(&self, owner: EntityHandle) -> Option<PathTicket> {
        self.by_owner.get(&owner).copied()
    }

    fn release(&mut self, ticket: PathTicket) -> Option<SlotState> {
        let slot = self.slots.get_mut(ticket.slot as usize)?;
        let state = std::mem::replace(&mut slot.state, SlotState::Free);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(owner) = slot.owner.take() {
            if self.by_owner.get(&owner) == Some(&ticket) {
                self.by_owner.remove(&owner);
            }
        }
        self.free_slots.push(ticket.slot);
        Some(state)
    }

    fn complete(&mut self, ticket: PathTicket, result: PathResult) {
        if !result.is_found() {
            self.stats.no_path += 1;
        }
        if let Some(slot) = self.slots.get_mut(ticket.slot as usize) {
            slot.state = SlotState::Ready(result);
        }
    }

    /// Resolve pending requests against the current terrain
    pub fn process(&mut self, grid: &CostGrid, tick: Tick) -> ProcessReport {
        let ttl = self.config.flow_field_ttl_ticks;
        self.flow_fields.retain(|_, field| !field.is_expired(tick, ttl));

        let mut report = ProcessReport::default();
        let mut waiting: Vec<(PathTicket, Cell, Cell)> = Vec::new();

        while let Some(ticket) = self.pending.pop_front() {
            let Some((start, goal)) = self.live_slot(ticket).map(|s| (s.start, s.goal)) else {
                continue;
            };
            if let Some(path) = self.cache.get(start, goal) {
                self.stats.cache_hits += 1;
                report.from_cache += 1;
                self.complete(ticket, PathResult::Found(path));
            } else if let Some(field) = self.flow_fields.get(&goal) {
                let result = field.path_from(start);
                self.stats.flow_field_paths += 1;
                report.from_flow_field += 1;
                self.complete(ticket, result);
            } else {
                waiting.push((ticket, start, goal));
            }
        }

        let mut per_goal: BTreeMap<Cell, usize> = BTreeMap::new();
        for &(_, _, goal) in &waiting {
            *per_goal.entry(goal).or_default() += 1;
        }

        let mut budget = self.config.max_searches_per_tick;
        for (&goal, &count) in &per_goal {
            if count > self.config.batch_threshold && budget > 0 {
                self.flow_fields.insert(goal, FlowField::build(grid, goal, tick));
                self.stats.flow_fields_built += 1;
                report.flow_fields_built += 1;
                budget -= 1;
            }
        }

        let mut searches: Vec<(PathTicket, Cell, Cell)> = Vec::new();
        let mut deferred: Vec<PathTicket> = Vec::new();
        for (ticket, start, goal) in waiting {
            if let Some(field) = self.flow_fields.get(&goal) {
                let result = field.path_from(start);
                self.stats.flow_field_paths += 1;
                report.from_flow_field += 1;
                self.complete(ticket, result);
            } else if budget > 0 {
                budget -= 1;
                searches.push((ticket, start, goal));
            } else {
                deferred.push(ticket);
            }
        }

        let results: Vec<PathResult> = if searches.len() >= self.config.parallel_threshold {
            searches
                .par_iter()
                .map_init(SearchScratch::new, |scratch, &(_, start, goal)| {
                    astar::find_path_with(grid, start, goal, scratch)
                })
                .collect()
        } else {
            let scratch = &mut self.scratch;
            searches
                .iter()
                .map(|&(_, start, goal)| astar::find_path_with(grid, start, goal, scratch))
                .collect()
        };

        report.searched = searches.len();
        self.stats.searches += searches.len() as u64;
        for ((ticket, _, _), result) in searches.into_iter().zip(results) {
            if let PathResult::Found(path) = &result {
                self.cache.insert(path);
            }
            self.complete(ticket, result);
        }

        if !deferred.is_empty() {
            report.deferred = deferred.len();
            self.stats.deferred += deferred.len() as u64;
            tracing::debug!(deferred = deferred.len(), tick, "path search budget exhausted");
            for ticket in deferred.into_iter().rev() {
                self.pending.push_front(ticket);
            }
        }

        report
    }

    /// Terrain inside `region` changed: drop cached paths crossing it and
    /// every flow field
    pub fn terrain_changed(&mut self, region: CellRect) -> usize {
        let invalidated = self.cache.invalidate_region(region);
        let fields = self.flow_fields.len();
        self.flow_fields.clear();
        tracing::debug!(invalidated, fields, ?region, "terrain changed");
        invalidated
    }

    pub fn flow_field(&self, goal: Cell) -> Option<&FlowField> {
        self.flow_fields.get(&goal)
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .iter()
            .filter(|&&t| self.status(t) == TicketStatus::Pending)
            .count()
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    pub fn stats(&self) -> PathStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PathfindingConfig {
        PathfindingConfig {
            cache_capacity: 64,
            batch_threshold: 4,
            flow_field_ttl_ticks: 10,
            max_searches_per_tick: 8,
            parallel_threshold: 1000,
        }
    }

    fn owner(i: u32) -> EntityHandle {
        EntityHandle::new(i, 0)
    }

    #[test]
    fn test_request_resolves_on_process() {
        let grid = CostGrid::new(8, 8, 1.0);
        let mut pf = Pathfinder::new(config());
        let ticket = pf.request(owner(1), Cell::new(0, 0), Cell::new(2, 2));
        assert_eq!(pf.status(ticket), TicketStatus::Pending);
        assert!(pf.poll(ticket).is_none());

        let report = pf.process(&grid, 1);
        assert_eq!(report.searched, 1);
        assert_eq!(pf.poll(ticket).and_then(|r| r.path()).map(|p| p.cost), Some(28));

        let result = pf.take(ticket).unwrap();
        assert!(result.is_found());
        assert_eq!(pf.status(ticket), TicketStatus::Unknown);
        assert!(pf.take(ticket).is_none());
        assert_eq!(pf.ticket_for(owner(1)), None);
    }

    #[test]
    fn test_second_identical_request_hits_cache() {
        let grid = CostGrid::new(8, 8, 1.0);
        let mut pf = Pathfinder::new(config());
        let a = pf.request(owner(1), Cell::new(0, 0), Cell::new(7, 7));
        pf.process(&grid, 1);
        pf.take(a);
        let b = pf.request(owner(2), Cell::new(0, 0), Cell::new(7, 7));
        let report = pf.process(&grid, 2);
        assert_eq!(report.from_cache, 1);
        assert!(pf.take(b).unwrap().is_found());
    }

    #[test]
    fn test_cancelled_ticket_is_never_resolved() {
        let grid = CostGrid::new(8, 8, 1.0);
        let mut pf = Pathfinder::new(config());
        let ticket = pf.request(owner(1), Cell::new(0, 0), Cell::new(5, 5));
        assert!(pf.cancel_owner(owner(1)));
        assert!(!pf.cancel_owner(owner(1)));
        let report = pf.process(&grid, 1);
        assert_eq!(report.resolved(), 0);
        assert_eq!(pf.status(ticket), TicketStatus::Unknown);

        // Slot reuse must not revive the old ticket
        let fresh = pf.request(owner(2), Cell::new(1, 1), Cell::new(2, 2));
        assert_ne!(fresh, ticket);
        pf.process(&grid, 2);
        assert!(pf.poll(ticket).is_none());
        assert!(pf.poll(fresh).is_some());
    }

    #[test]
    fn test_rerequest_replaces_previous() {
        let mut pf = Pathfinder::new(config());
        let first = pf.request(owner(1), Cell::new(0, 0), Cell::new(3, 3));
        let second = pf.request(owner(1), Cell::new(0, 0), Cell::new(4, 4));
        assert_eq!(pf.status(first), TicketStatus::Unknown);
        assert_eq!(pf.ticket_for(owner(1)), Some(second));
        assert_eq!(pf.pending_len(), 1);
    }

    #[test]
    fn test_shared_goal_uses_flow_field() {
        let grid = CostGrid::from_rows(&["..........", "....##....", "....##....", ".........."], 1.0);
        let mut pf = Pathfinder::new(config());
        let goal = Cell::new(9, 3);
        let tickets: Vec<_> = (0..6).map(|i| pf.request(owner(i), Cell::new(0, (i % 4) as i32), goal)).collect();
        let report = pf.process(&grid, 1);
        assert_eq!(report.flow_fields_built, 1);
        assert_eq!(report.from_flow_field, 6);
        assert!(pf.flow_field(goal).is_some());
        for ticket in tickets {
            let result = pf.take(ticket).unwrap();
            let path = result.path().unwrap();
            let expected = astar::find_path(&grid, path.cells[0], goal);
            assert_eq!(Some(path.cost), expected.path().map(|p| p.cost));
        }

        // Field expires after its ttl
        pf.process(&grid, 20);
        assert!(pf.flow_field(goal).is_none());
    }

    #[test]
    fn test_search_budget_defers_in_order() {
        let grid = CostGrid::new(16, 16, 1.0);
        let mut pf = Pathfinder::new(config());
        let tickets: Vec<_> = (0..10).map(|i| pf.request(owner(i), Cell::new(0, 0), Cell::new(i as i32 + 1, 15))).collect();
        let report = pf.process(&grid, 1);
        assert_eq!(report.searched, 8);
        assert_eq!(report.deferred, 2);
        assert_eq!(pf.status(tickets[7]), TicketStatus::Ready);
        assert_eq!(pf.status(tickets[8]), TicketStatus::Pending);
        pf.process(&grid, 2);
        assert_eq!(pf.status(tickets[9]), TicketStatus::Ready);
    }

    #[test]
    fn test_parallel_batch_matches_sequential() {
        let grid = CostGrid::from_rows(&["..........", ".########.", "..........", "########..", ".........."], 1.0);
        let mut parallel = Pathfinder::new(PathfindingConfig { parallel_threshold: 2, ..config() });
        let mut sequential = Pathfinder::new(config());
        let routes: Vec<(Cell, Cell)> = (0..6).map(|i| (Cell::new(i, 0), Cell::new(9 - i, 4))).collect();
        let a: Vec<_> = routes.iter().map(|&(s, g)| parallel.request_unowned(s, g)).collect();
        let b: Vec<_> = routes.iter().map(|&(s, g)| sequential.request_unowned(s, g)).collect();
        parallel.process(&grid, 1);
        sequential.process(&grid, 1);
        for (x, y) in a.into_iter().zip(b) {
            assert_eq!(parallel.take(x), sequential.take(y));
        }
    }

    #[test]
    fn test_terrain_change_invalidates() {
        let mut grid = CostGrid::new(8, 8, 1.0);
        let mut pf = Pathfinder::new(config());
        let t = pf.request(owner(1), Cell::new(0, 0), Cell::new(7, 0));
        pf.process(&grid, 1);
        pf.take(t);
        assert_eq!(pf.cached_paths(), 1);

        let region = CellRect::single(Cell::new(3, 0));
        grid.fill_region(region, 0);
        assert_eq!(pf.terrain_changed(region), 1);

        let t = pf.request(owner(1), Cell::new(0, 0), Cell::new(7, 0));
        let report = pf.process(&grid, 2);
        assert_eq!(report.from_cache, 0);
        let path = pf.take(t).unwrap().into_path().unwrap();
        assert!(!path.cells.contains(&Cell::new(3, 0)));
    }
}
