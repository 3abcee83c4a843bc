//! Player and tooling intents
//!
//! Intents may be sent from any thread. They are drained once at the start of
//! a tick, so anything queued while tick N runs takes effect from tick N+1.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::core::types::{Aabb, Cell, CellRect, EntityHandle, Vec2};
use crate::ecs::components::BuildingKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpawnKind {
    /// Mobile worker driven by the AI state machine
    Worker { home: Option<Vec2> },
    ResourceNode { amount: u32 },
    /// Construction site; the economy System finishes it over time
    Structure { kind: BuildingKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub kind: SpawnKind,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    /// Replace the current selection with selectable entities inside `bounds`
    Select(Aabb),
    /// Send units to `destination`; an empty list moves the current selection
    Move { handles: Vec<EntityHandle>, destination: Vec2 },
    Build { kind: BuildingKind, cell: Cell },
    Spawn(SpawnRequest),
    Destroy(EntityHandle),
    TerrainChanged { region: CellRect, cost: u8 },
}

/// Cloneable, thread-safe handle for submitting intents
#[derive(Debug, Clone)]
pub struct IntentSender {
    sender: Sender<Intent>,
}

impl IntentSender {
    /// Queue an intent; returns false once the simulation has been dropped
    pub fn send(&self, intent: Intent) -> bool {
        self.sender.send(intent).is_ok()
    }
}

#[derive(Debug)]
pub struct IntentQueue {
    sender: Sender<Intent>,
    receiver: Receiver<Intent>,
}

impl IntentQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> IntentSender {
        IntentSender {
            sender: self.sender.clone(),
        }
    }

    /// Everything queued so far, in send order
    pub fn drain(&self) -> Vec<Intent> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for IntentQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = IntentQueue::new();
        let sender = queue.sender();
        sender.send(Intent::Destroy(EntityHandle::new(1, 0)));
        sender.send(Intent::Destroy(EntityHandle::new(2, 0)));
        assert_eq!(queue.len(), 2);
        let drained = queue.drain();
        assert_eq!(drained[1], Intent::Destroy(EntityHandle::new(2, 0)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_send_from_other_thread() {
        let queue = IntentQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || {
            sender.send(Intent::Select(Aabb::from_origin_size(0.0, 0.0, 10.0, 10.0)));
        })
        .join()
        .unwrap();
        assert_eq!(queue.drain().len(), 1);
    }
}
