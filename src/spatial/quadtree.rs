//! Quad-tree spatial index over entity positions
//!
//! Nodes live in a flat arena and refer to each other by index. Leaves split
//! when they overflow (up to `max_depth`) and subtrees collapse back into a
//! single leaf once their occupancy drops below `merge_threshold`.
//!
//! The index is never the source of truth: positions live in the entity
//! store's `Transform` column, and `rebuild` restores the index from there.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::core::config::SpatialConfig;
use crate::core::error::SpatialError;
use crate::core::types::{Aabb, EntityHandle, Vec2};
use crate::ecs::components::Transform;
use crate::ecs::store::EntityStore;

const ROOT: u32 = 0;

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    entries: Vec<(EntityHandle, Vec2)>,
    children: Option<[u32; 4]>,
    parent: Option<u32>,
    depth: u32,
    /// Entries in this subtree
    count: usize,
}

impl Node {
    fn leaf(bounds: Aabb, parent: Option<u32>, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            parent,
            depth,
            count: 0,
        }
    }

    /// Quadrant a point belongs to, matching `Aabb::quadrants` order
    #[inline]
    fn quadrant_of(&self, pos: Vec2) -> usize {
        let c = self.bounds.center();
        (pos.x >= c.x) as usize + 2 * (pos.y >= c.y) as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpatialStats {
    pub entries: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: u32,
}

/// Quad-tree keyed by entity handle
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    nodes: Vec<Node>,
    free_nodes: Vec<u32>,
    /// Leaf currently holding each entity
    locations: AHashMap<EntityHandle, u32>,
    leaf_capacity: usize,
    max_depth: u32,
    merge_threshold: usize,
}

impl SpatialIndex {
    pub fn new(bounds: Aabb, config: &SpatialConfig) -> Self {
        Self {
            nodes: vec![Node::leaf(bounds, None, 0)],
            free_nodes: Vec::new(),
            locations: AHashMap::new(),
            leaf_capacity: config.leaf_capacity.max(1),
            max_depth: config.max_depth,
            merge_threshold: config.merge_threshold,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[ROOT as usize].bounds
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.locations.contains_key(&handle)
    }

    /// Indexed position of an entity
    pub fn position(&self, handle: EntityHandle) -> Option<Vec2> {
        let leaf = *self.locations.get(&handle)?;
        self.nodes[leaf as usize]
            .entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, pos)| *pos)
    }

    /// Insert an entity; an already-indexed entity is moved instead
    pub fn insert(&mut self, handle: EntityHandle, pos: Vec2) -> Result<(), SpatialError> {
        if self.locations.contains_key(&handle) {
            return self.update(handle, pos);
        }
        if !self.bounds().contains(pos) {
            return Err(SpatialError::OutOfBounds { handle, x: pos.x, y: pos.y });
        }

        let mut node_id = ROOT;
        while let Some(children) = self.nodes[node_id as usize].children {
            let quadrant = self.nodes[node_id as usize].quadrant_of(pos);
            node_id = children[quadrant];
        }

        self.nodes[node_id as usize].entries.push((handle, pos));
        self.locations.insert(handle, node_id);
        self.adjust_counts(node_id, true);

        let node = &self.nodes[node_id as usize];
        if node.entries.len() > self.leaf_capacity && node.depth < self.max_depth {
            self.split(node_id);
        }
        Ok(())
    }

    /// Remove an entity; returns false if it was not indexed
    pub fn remove(&mut self, handle: EntityHandle) -> bool {
        let Some(leaf) = self.locations.remove(&handle) else {
            return false;
        };
        let entries = &mut self.nodes[leaf as usize].entries;
        if let Some(slot) = entries.iter().position(|(h, _)| *h == handle) {
            entries.swap_remove(slot);
        }
        self.adjust_counts(leaf, false);
        self.merge_upward(leaf);
        true
    }

    /// Move an entity; stays in place when the new position is inside its leaf
    pub fn update(&mut self, handle: EntityHandle, pos: Vec2) -> Result<(), SpatialError> {
        let Some(&leaf) = self.locations.get(&handle) else {
            return self.insert(handle, pos);
        };
        if !self.bounds().contains(pos) {
            return Err(SpatialError::OutOfBounds { handle, x: pos.x, y: pos.y });
        }

        let node = &mut self.nodes[leaf as usize];
        if node.bounds.contains(pos) {
            if let Some(entry) = node.entries.iter_mut().find(|(h, _)| *h == handle) {
                entry.1 = pos;
                return Ok(());
            }
        }

        self.remove(handle);
        self.insert(handle, pos)
    }

    /// Entities whose position lies inside `bounds` (inclusive)
    pub fn query_range(&self, bounds: Aabb) -> QueryRange<'_> {
        let mut stack = Vec::new();
        let root = &self.nodes[ROOT as usize];
        if root.count > 0 && root.bounds.intersects(&bounds) {
            stack.push(ROOT);
        }
        QueryRange {
            index: self,
            bounds,
            stack,
            entries: Default::default(),
        }
    }

    /// Entities within `radius` of `center`
    pub fn query_radius(&self, center: Vec2, radius: f32) -> impl Iterator<Item = EntityHandle> + '_ {
        let bounds = Aabb::new(
            Vec2::new(center.x - radius, center.y - radius),
            Vec2::new(center.x + radius, center.y + radius),
        );
        let radius_sq = radius * radius;
        self.query_range(bounds).filter(move |handle| {
            self.position(*handle)
                .is_some_and(|pos| pos.distance_sq(&center) <= radius_sq)
        })
    }

    /// The `k` entities closest to `pos`, nearest first
    pub fn query_nearest(&self, pos: Vec2, k: usize) -> Vec<(EntityHandle, f32)> {
        self.query_nearest_where(pos, k, f32::INFINITY, |_| true)
    }

    /// Best-first k-nearest search restricted to `max_distance` and a filter
    pub fn query_nearest_where<F>(
        &self,
        pos: Vec2,
        k: usize,
        max_distance: f32,
        mut filter: F,
    ) -> Vec<(EntityHandle, f32)>
    where
        F: FnMut(EntityHandle) -> bool,
    {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let max_sq = max_distance * max_distance;

        // Min-heap of nodes by distance to their bounds
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse((OrderedFloat(self.nodes[ROOT as usize].bounds.distance_sq_to(pos)), ROOT)));
        // Max-heap of the best k candidates so far
        let mut best: BinaryHeap<(OrderedFloat<f32>, EntityHandle)> = BinaryHeap::with_capacity(k + 1);

        while let Some(Reverse((OrderedFloat(node_dist), node_id))) = frontier.pop() {
            if node_dist > max_sq {
                break;
            }
            if best.len() == k && best.peek().is_some_and(|(worst, _)| node_dist > worst.0) {
                break;
            }

            let node = &self.nodes[node_id as usize];
            match node.children {
                Some(children) => {
                    for child in children {
                        let child_node = &self.nodes[child as usize];
                        if child_node.count > 0 {
                            let d = child_node.bounds.distance_sq_to(pos);
                            frontier.push(Reverse((OrderedFloat(d), child)));
                        }
                    }
                }
                None => {
                    for &(handle, entry_pos) in &node.entries {
                        let d = entry_pos.distance_sq(&pos);
                        if d > max_sq || !filter(handle) {
                            continue;
                        }
                        best.push((OrderedFloat(d), handle));
                        if best.len() > k {
                            best.pop();
                        }
                    }
                }
            }
        }

        let mut found: Vec<(EntityHandle, f32)> = best
            .into_iter()
            .map(|(d, handle)| (handle, d.0.sqrt()))
            .collect();
        found.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
        found
    }

    /// Discard everything
    pub fn clear(&mut self) {
        let bounds = self.bounds();
        self.nodes.clear();
        self.nodes.push(Node::leaf(bounds, None, 0));
        self.free_nodes.clear();
        self.locations.clear();
    }

    /// Recovery path: rebuild from authoritative positions
    ///
    /// Returns how many entries were rejected as out of bounds.
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (EntityHandle, Vec2)>) -> usize {
        self.clear();
        let mut rejected = 0;
        for (handle, pos) in entries {
            if self.insert(handle, pos).is_err() {
                rejected += 1;
            }
        }
        rejected
    }

    /// Rebuild from the store's `Transform` column
    pub fn rebuild_from_store(&mut self, store: &EntityStore) -> usize {
        let entries: Vec<(EntityHandle, Vec2)> = store
            .query_live::<Transform>()
            .map(|(handle, transform)| (handle, transform.position))
            .collect();
        self.rebuild(entries)
    }

    /// Check the tree's internal invariants
    pub fn validate(&self) -> Result<(), SpatialError> {
        let fail = |msg: String| Err(SpatialError::Inconsistency(msg));

        let mut seen = 0usize;
        let mut stack = vec![ROOT];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            match node.children {
                Some(children) => {
                    if !node.entries.is_empty() {
                        return fail(format!("internal node {} holds entries", node_id));
                    }
                    let mut sum = 0;
                    for child in children {
                        let child_node = &self.nodes[child as usize];
                        if child_node.parent != Some(node_id) || child_node.depth != node.depth + 1 {
                            return fail(format!("node {} has a mislinked child {}", node_id, child));
                        }
                        sum += child_node.count;
                        stack.push(child);
                    }
                    if sum != node.count {
                        return fail(format!(
                            "node {} count {} disagrees with children total {}",
                            node_id, node.count, sum
                        ));
                    }
                }
                None => {
                    if node.entries.len() != node.count {
                        return fail(format!(
                            "leaf {} count {} but holds {} entries",
                            node_id,
                            node.count,
                            node.entries.len()
                        ));
                    }
                    for (handle, pos) in &node.entries {
                        if !node.bounds.contains(*pos) {
                            return fail(format!("{} at ({}, {}) outside leaf {}", handle, pos.x, pos.y, node_id));
                        }
                        if self.locations.get(handle) != Some(&node_id) {
                            return fail(format!("{} is not mapped to leaf {}", handle, node_id));
                        }
                    }
                    seen += node.entries.len();
                }
            }
        }

        if seen != self.locations.len() {
            return fail(format!(
                "tree holds {} entries but {} are mapped",
                seen,
                self.locations.len()
            ));
        }
        Ok(())
    }

    /// Check the tree against the store's committed positions
    pub fn validate_against(&self, store: &EntityStore) -> Result<(), SpatialError> {
        self.validate()?;

        let expected = store.count::<Transform>();
        if expected != self.len() {
            return Err(SpatialError::Inconsistency(format!(
                "index holds {} entities, store has {} transforms",
                self.len(),
                expected
            )));
        }
        for (&handle, &leaf) in &self.locations {
            let Ok(transform) = store.get::<Transform>(handle) else {
                return Err(SpatialError::Inconsistency(format!("{} indexed but not in store", handle)));
            };
            let indexed = self.nodes[leaf as usize]
                .entries
                .iter()
                .find(|(h, _)| *h == handle)
                .map(|(_, pos)| *pos);
            if indexed != Some(transform.position) {
                return Err(SpatialError::Inconsistency(format!("{} indexed at a stale position", handle)));
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> SpatialStats {
        let mut stats = SpatialStats {
            entries: self.len(),
            ..SpatialStats::default()
        };
        let mut stack = vec![ROOT];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            stats.nodes += 1;
            stats.max_depth = stats.max_depth.max(node.depth);
            match node.children {
                Some(children) => stack.extend(children),
                None => stats.leaves += 1,
            }
        }
        stats
    }

    fn alloc_node(&mut self, node: Node) -> u32 {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn adjust_counts(&mut self, from: u32, increment: bool) {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let node = &mut self.nodes[id as usize];
            if increment {
                node.count += 1;
            } else {
                node.count -= 1;
            }
            cursor = node.parent;
        }
    }

    fn split(&mut self, node_id: u32) {
        let (quadrants, depth) = {
            let node = &self.nodes[node_id as usize];
            (node.bounds.quadrants(), node.depth + 1)
        };
        let children = quadrants.map(|bounds| self.alloc_node(Node::leaf(bounds, Some(node_id), depth)));

        let entries = std::mem::take(&mut self.nodes[node_id as usize].entries);
        self.nodes[node_id as usize].children = Some(children);
        for (handle, pos) in entries {
            let child = children[self.nodes[node_id as usize].quadrant_of(pos)];
            let child_node = &mut self.nodes[child as usize];
            child_node.entries.push((handle, pos));
            child_node.count += 1;
            self.locations.insert(handle, child);
        }

        for child in children {
            let child_node = &self.nodes[child as usize];
            if child_node.entries.len() > self.leaf_capacity && child_node.depth < self.max_depth {
                self.split(child);
            }
        }
    }

    /// Collapse the highest ancestor of `leaf` whose occupancy is below the low-water mark
    fn merge_upward(&mut self, leaf: u32) {
        let mut target = None;
        let mut cursor = self.nodes[leaf as usize].parent;
        while let Some(id) = cursor {
            let node = &self.nodes[id as usize];
            if node.count >= self.merge_threshold {
                // Counts only grow toward the root
                break;
            }
            target = Some(id);
            cursor = node.parent;
        }
        if let Some(id) = target {
            self.collapse(id);
        }
    }

    fn collapse(&mut self, node_id: u32) {
        let Some(children) = self.nodes[node_id as usize].children.take() else {
            return;
        };
        let mut gathered = Vec::with_capacity(self.nodes[node_id as usize].count);
        let mut stack: Vec<u32> = children.to_vec();
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id as usize];
            gathered.append(&mut node.entries);
            if let Some(grandchildren) = node.children.take() {
                stack.extend(grandchildren);
            }
            node.count = 0;
            self.free_nodes.push(id);
        }
        for (handle, _) in &gathered {
            self.locations.insert(*handle, node_id);
        }
        self.nodes[node_id as usize].entries = gathered;
    }
}

/// Iterator returned by `SpatialIndex::query_range`
pub struct QueryRange<'a> {
    index: &'a SpatialIndex,
    bounds: Aabb,
    stack: Vec<u32>,
    entries: std::slice::Iter<'a, (EntityHandle, Vec2)>,
}

impl Iterator for QueryRange<'_> {
    type Item = EntityHandle;

    fn next(&mut self) -> Option<EntityHandle> {
        loop {
            for &(handle, pos) in self.entries.by_ref() {
                if self.bounds.contains(pos) {
                    return Some(handle);
                }
            }

            let node = &self.index.nodes[self.stack.pop()? as usize];
            match node.children {
                Some(children) => {
                    for child in children {
                        let child_node = &self.index.nodes[child as usize];
                        if child_node.count > 0 && child_node.bounds.intersects(&self.bounds) {
                            self.stack.push(child);
                        }
                    }
                }
                None => self.entries = node.entries.iter(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(leaf_capacity: usize, max_depth: u32, merge_threshold: usize) -> SpatialConfig {
        SpatialConfig {
            leaf_capacity,
            max_depth,
            merge_threshold,
            consistency_check_interval: 0,
        }
    }

    fn index() -> SpatialIndex {
        SpatialIndex::new(Aabb::from_origin_size(0.0, 0.0, 100.0, 100.0), &config(2, 6, 2))
    }

    fn h(i: u32) -> EntityHandle {
        EntityHandle::new(i, 0)
    }

    #[test]
    fn test_insert_splits_and_queries() {
        let mut idx = index();
        idx.insert(h(0), Vec2::new(10.0, 10.0)).unwrap();
        idx.insert(h(1), Vec2::new(90.0, 10.0)).unwrap();
        idx.insert(h(2), Vec2::new(10.0, 90.0)).unwrap();
        idx.insert(h(3), Vec2::new(90.0, 90.0)).unwrap();

        assert!(idx.stats().nodes > 1);
        idx.validate().unwrap();

        let mut found: Vec<_> = idx.query_range(Aabb::from_origin_size(0.0, 0.0, 50.0, 100.0)).collect();
        found.sort();
        assert_eq!(found, vec![h(0), h(2)]);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut idx = index();
        let err = idx.insert(h(0), Vec2::new(150.0, 10.0)).unwrap_err();
        assert!(matches!(err, SpatialError::OutOfBounds { .. }));
        assert!(idx.is_empty());
    }

    #[test]
    fn test_boundary_points_are_indexed() {
        let mut idx = index();
        idx.insert(h(0), Vec2::new(100.0, 100.0)).unwrap();
        idx.insert(h(1), Vec2::new(50.0, 50.0)).unwrap();
        idx.insert(h(2), Vec2::new(0.0, 0.0)).unwrap();
        idx.validate().unwrap();
        assert_eq!(idx.query_range(Aabb::from_origin_size(50.0, 50.0, 0.0, 0.0)).count(), 1);
        assert_eq!(idx.query_range(idx.bounds()).count(), 3);
    }

    #[test]
    fn test_update_in_place_and_across_leaves() {
        let mut idx = index();
        for i in 0..6 {
            idx.insert(h(i), Vec2::new(10.0 + i as f32, 10.0)).unwrap();
        }
        idx.update(h(0), Vec2::new(10.5, 10.5)).unwrap();
        assert_eq!(idx.position(h(0)), Some(Vec2::new(10.5, 10.5)));

        idx.update(h(0), Vec2::new(80.0, 80.0)).unwrap();
        idx.validate().unwrap();
        let found: Vec<_> = idx.query_range(Aabb::from_origin_size(70.0, 70.0, 20.0, 20.0)).collect();
        assert_eq!(found, vec![h(0)]);
    }

    #[test]
    fn test_remove_merges_subtrees() {
        let mut idx = index();
        for i in 0..16 {
            idx.insert(h(i), Vec2::new((i * 6) as f32, (i * 6) as f32)).unwrap();
        }
        let split_nodes = idx.stats().nodes;
        assert!(split_nodes > 1);

        for i in 0..15 {
            assert!(idx.remove(h(i)));
            idx.validate().unwrap();
        }
        assert!(!idx.remove(h(0)));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.stats().nodes, 1);
    }

    #[test]
    fn test_max_depth_caps_splitting() {
        let mut idx = SpatialIndex::new(Aabb::from_origin_size(0.0, 0.0, 100.0, 100.0), &config(1, 2, 0));
        for i in 0..10 {
            idx.insert(h(i), Vec2::new(1.0, 1.0)).unwrap();
        }
        idx.validate().unwrap();
        assert_eq!(idx.stats().max_depth, 2);
        assert_eq!(idx.query_range(Aabb::from_origin_size(0.0, 0.0, 2.0, 2.0)).count(), 10);
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let mut idx = index();
        idx.insert(h(0), Vec2::new(50.0, 50.0)).unwrap();
        idx.insert(h(1), Vec2::new(52.0, 50.0)).unwrap();
        idx.insert(h(2), Vec2::new(60.0, 50.0)).unwrap();
        idx.insert(h(3), Vec2::new(5.0, 5.0)).unwrap();

        let nearest = idx.query_nearest(Vec2::new(51.0, 50.0), 2);
        let handles: Vec<_> = nearest.iter().map(|(h, _)| *h).collect();
        assert_eq!(handles, vec![h(0), h(1)]);
        assert!((nearest[0].1 - 1.0).abs() < 1e-5);

        let filtered = idx.query_nearest_where(Vec2::new(51.0, 50.0), 1, 100.0, |e| e == h(3));
        assert_eq!(filtered[0].0, h(3));

        let none = idx.query_nearest_where(Vec2::new(51.0, 50.0), 1, 5.0, |e| e == h(3));
        assert!(none.is_empty());
    }

    #[test]
    fn test_rebuild_recovers() {
        let mut idx = index();
        idx.insert(h(0), Vec2::new(1.0, 1.0)).unwrap();
        let rejected = idx.rebuild(vec![(h(5), Vec2::new(20.0, 20.0)), (h(6), Vec2::new(-1.0, 0.0))]);
        assert_eq!(rejected, 1);
        assert!(!idx.contains(h(0)));
        assert!(idx.contains(h(5)));
        idx.validate().unwrap();
    }
}
