//! Entity store - generational arena plus dense component columns
//!
//! Entities are `(index, generation)` handles into a slot arena. Components
//! live in one column per type, indexed by entity index. Destroying an entity
//! only queues it; the slot is freed (and its generation bumped) during the
//! deletion step, so stale handles can never alias a new entity.

use std::collections::VecDeque;

use crate::core::error::InvalidHandle;
use crate::core::types::EntityHandle;
use crate::ecs::components::{
    Agent, Building, Health, Mobile, Navigation, ResourceNode, Selection, Transform,
};
use crate::ecs::deletion::DeletionQueue;
use crate::simulation::system::DataKind;

/// Data that can be stored per entity in the `EntityStore`
pub trait Component: Sized + 'static {
    /// Ownership key used by the scheduler
    const KIND: DataKind;

    fn column(columns: &Columns) -> &ComponentColumn<Self>;
    fn column_mut(columns: &mut Columns) -> &mut ComponentColumn<Self>;
}

/// Dense storage for one component type, with write tracking
#[derive(Debug)]
pub struct ComponentColumn<T> {
    data: Vec<Option<T>>,
    changed: Vec<u32>,
    changed_flags: Vec<bool>,
    count: usize,
}

impl<T> Default for ComponentColumn<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            changed: Vec::new(),
            changed_flags: Vec::new(),
            count: 0,
        }
    }
}

impl<T> ComponentColumn<T> {
    fn ensure(&mut self, index: usize) {
        if index >= self.data.len() {
            self.data.resize_with(index + 1, || None);
            self.changed_flags.resize(index + 1, false);
        }
    }

    #[inline]
    fn mark(&mut self, index: usize) {
        if !self.changed_flags[index] {
            self.changed_flags[index] = true;
            self.changed.push(index as u32);
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)?.as_ref()
    }

    /// Mutable access; counts as a write even if nothing changes
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.data.get(index)?.is_none() {
            return None;
        }
        self.mark(index);
        self.data[index].as_mut()
    }

    pub fn insert(&mut self, index: usize, value: T) -> Option<T> {
        self.ensure(index);
        self.mark(index);
        let previous = self.data[index].replace(value);
        if previous.is_none() {
            self.count += 1;
        }
        previous
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let removed = self.data.get_mut(index)?.take()?;
        self.mark(index);
        self.count -= 1;
        Some(removed)
    }

    /// Indices written since the last drain, in first-write order
    pub fn drain_changed(&mut self) -> Vec<u32> {
        for &index in &self.changed {
            self.changed_flags[index as usize] = false;
        }
        std::mem::take(&mut self.changed)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }
}

/// One column per component type
#[derive(Debug, Default)]
pub struct Columns {
    transforms: ComponentColumn<Transform>,
    mobiles: ComponentColumn<Mobile>,
    navigations: ComponentColumn<Navigation>,
    selections: ComponentColumn<Selection>,
    healths: ComponentColumn<Health>,
    agents: ComponentColumn<Agent>,
    resource_nodes: ComponentColumn<ResourceNode>,
    buildings: ComponentColumn<Building>,
}

impl Columns {
    fn remove_all(&mut self, index: usize) {
        self.transforms.remove(index);
        self.mobiles.remove(index);
        self.navigations.remove(index);
        self.selections.remove(index);
        self.healths.remove(index);
        self.agents.remove(index);
        self.resource_nodes.remove(index);
        self.buildings.remove(index);
    }
}

macro_rules! impl_component {
    ($ty:ty, $field:ident, $kind:expr) => {
        impl Component for $ty {
            const KIND: DataKind = $kind;

            fn column(columns: &Columns) -> &ComponentColumn<Self> {
                &columns.$field
            }

            fn column_mut(columns: &mut Columns) -> &mut ComponentColumn<Self> {
                &mut columns.$field
            }
        }
    };
}

impl_component!(Transform, transforms, DataKind::Transform);
impl_component!(Mobile, mobiles, DataKind::Mobile);
impl_component!(Navigation, navigations, DataKind::Navigation);
impl_component!(Selection, selections, DataKind::Selection);
impl_component!(Health, healths, DataKind::Health);
impl_component!(Agent, agents, DataKind::Agent);
impl_component!(ResourceNode, resource_nodes, DataKind::ResourceNode);
impl_component!(Building, buildings, DataKind::Building);

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    generation: u32,
    occupied: bool,
    /// Destroy requested, waiting for its deletion turn
    doomed: bool,
}

/// Owner of entity identity and component data
#[derive(Debug, Default)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    columns: Columns,
    deletions: DeletionQueue,
    live: usize,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity, recycling freed slots first-in first-out
    pub fn create(&mut self) -> EntityHandle {
        self.live += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.occupied = true;
            slot.doomed = false;
            return EntityHandle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            occupied: true,
            doomed: false,
        });
        EntityHandle::new(index, 0)
    }

    /// Queue an entity for destruction
    ///
    /// Stale or already-queued handles are a no-op. Only an index that was
    /// never allocated is rejected.
    pub fn destroy(&mut self, handle: EntityHandle) -> Result<(), InvalidHandle> {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return Err(InvalidHandle(handle));
        };
        if !slot.occupied || slot.generation != handle.generation || slot.doomed {
            return Ok(());
        }
        slot.doomed = true;
        self.deletions.push(handle);
        Ok(())
    }

    /// Run one deletion turn: reclaim at most `limit` queued entities
    ///
    /// Each reclaimed entity loses all components and its slot generation is
    /// bumped in the same step. Returns the handles that were reclaimed.
    pub fn reclaim(&mut self, limit: usize) -> Vec<EntityHandle> {
        let batch = self.deletions.drain(limit);
        let mut reclaimed = Vec::with_capacity(batch.len());
        for handle in batch {
            if !self.is_alive(handle) {
                continue;
            }
            let index = handle.index as usize;
            self.columns.remove_all(index);
            let slot = &mut self.slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.occupied = false;
            slot.doomed = false;
            self.free.push_back(handle.index);
            self.live -= 1;
            reclaimed.push(handle);
        }
        reclaimed
    }

    #[inline]
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.occupied && slot.generation == handle.generation)
    }

    /// Alive but queued for destruction
    pub fn is_doomed(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.occupied && slot.doomed && slot.generation == handle.generation)
    }

    /// Handle of the entity currently occupying `index`
    pub fn handle_at(&self, index: u32) -> Option<EntityHandle> {
        let slot = self.slots.get(index as usize)?;
        slot.occupied.then(|| EntityHandle::new(index, slot.generation))
    }

    #[inline]
    fn resolve(&self, handle: EntityHandle) -> Result<usize, InvalidHandle> {
        if self.is_alive(handle) {
            Ok(handle.index as usize)
        } else {
            Err(InvalidHandle(handle))
        }
    }

    pub fn get<T: Component>(&self, handle: EntityHandle) -> Result<&T, InvalidHandle> {
        let index = self.resolve(handle)?;
        T::column(&self.columns).get(index).ok_or(InvalidHandle(handle))
    }

    pub fn get_mut<T: Component>(&mut self, handle: EntityHandle) -> Result<&mut T, InvalidHandle> {
        let index = self.resolve(handle)?;
        T::column_mut(&mut self.columns)
            .get_mut(index)
            .ok_or(InvalidHandle(handle))
    }

    /// Attach a component, returning any value it replaced
    pub fn insert<T: Component>(&mut self, handle: EntityHandle, value: T) -> Result<Option<T>, InvalidHandle> {
        let index = self.resolve(handle)?;
        Ok(T::column_mut(&mut self.columns).insert(index, value))
    }

    pub fn remove<T: Component>(&mut self, handle: EntityHandle) -> Result<Option<T>, InvalidHandle> {
        let index = self.resolve(handle)?;
        Ok(T::column_mut(&mut self.columns).remove(index))
    }

    pub fn has<T: Component>(&self, handle: EntityHandle) -> bool {
        self.get::<T>(handle).is_ok()
    }

    /// Active (alive, not doomed) entities carrying `T`
    pub fn query<T: Component>(&self) -> impl Iterator<Item = (EntityHandle, &T)> {
        T::column(&self.columns).iter().filter_map(move |(index, value)| {
            let slot = self.slots[index];
            (slot.occupied && !slot.doomed)
                .then(|| (EntityHandle::new(index as u32, slot.generation), value))
        })
    }

    /// Every live entity carrying `T`, including ones queued for destruction
    pub fn query_live<T: Component>(&self) -> impl Iterator<Item = (EntityHandle, &T)> {
        T::column(&self.columns).iter().filter_map(move |(index, value)| {
            let slot = self.slots[index];
            slot.occupied
                .then(|| (EntityHandle::new(index as u32, slot.generation), value))
        })
    }

    /// Snapshot of active handles carrying `T`, for loops that mutate the store
    pub fn handles_with<T: Component>(&self) -> Vec<EntityHandle> {
        self.query::<T>().map(|(handle, _)| handle).collect()
    }

    /// All active entities
    pub fn active(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            (slot.occupied && !slot.doomed).then(|| EntityHandle::new(index as u32, slot.generation))
        })
    }

    /// Indices whose `T` was written since the last drain
    pub fn drain_changed<T: Component>(&mut self) -> Vec<u32> {
        T::column_mut(&mut self.columns).drain_changed()
    }

    pub fn count<T: Component>(&self) -> usize {
        T::column(&self.columns).len()
    }

    /// Live entities, including ones queued for destruction
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn pending_deletions(&self) -> usize {
        self.deletions.len()
    }
}
