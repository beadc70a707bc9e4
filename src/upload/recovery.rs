//! Recovery cache - storage snapshots addressed by upload slot.
//!
//! When a buffer is uploaded for the first time, a snapshot of its storage is
//! recorded at the upload's slot. A later, unallocated buffer uploading at the
//! same slot adopts that storage instead of allocating again.

use std::sync::Arc;

use crate::gpu::{BindingTarget, BufferId};
use crate::resource::{BufferCategory, SharedAllocation};

/// Immutable record of a buffer's storage at the moment it was allocated.
///
/// Holding a snapshot keeps the storage alive on the device.
#[derive(Debug, Clone)]
pub struct Snapshot {
    slot: usize,
    handle: BufferId,
    target: BindingTarget,
    capacity: usize,
    allocation: Arc<SharedAllocation>,
}

impl Snapshot {
    /// Capture `allocation` as recorded at `slot`.
    pub fn capture(slot: usize, allocation: &Arc<SharedAllocation>) -> Self {
        Self {
            slot,
            handle: allocation.handle(),
            target: allocation.target(),
            capacity: allocation.capacity(),
            allocation: Arc::clone(allocation),
        }
    }

    /// Slot the snapshot was taken at.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Device buffer id.
    pub fn handle(&self) -> BufferId {
        self.handle
    }

    /// Binding target.
    pub fn target(&self) -> BindingTarget {
        self.target
    }

    /// Category served by the binding target.
    pub fn category(&self) -> BufferCategory {
        BufferCategory::from_target(self.target)
    }

    /// Storage size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The storage itself.
    pub fn allocation(&self) -> &Arc<SharedAllocation> {
        &self.allocation
    }
}

/// Append-only list of snapshots indexed by slot.
///
/// Entries never move. An entry can be vacated with
/// [`invalidate`](Self::invalidate) to give its storage back to the device.
/// Not synchronized; [`UploadSession`](crate::UploadSession) keeps it behind a mutex.
#[derive(Debug, Default)]
pub struct RecoveryCache {
    entries: Vec<Option<Snapshot>>,
}

impl RecoveryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot at the end. Returns its index.
    pub fn append(&mut self, snapshot: Snapshot) -> usize {
        self.entries.push(Some(snapshot));
        self.entries.len() - 1
    }

    /// Snapshot at `index`, `None` when out of range or vacated.
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Store `snapshot` at `slot`, padding with vacant entries as needed.
    ///
    /// Occupied entries are never overwritten; returns `false` in that case.
    pub fn record(&mut self, slot: usize, snapshot: Snapshot) -> bool {
        if slot >= self.entries.len() {
            self.entries.resize_with(slot, || None);
            self.append(snapshot);
            return true;
        }
        match &mut self.entries[slot] {
            Some(_) => false,
            vacant => {
                *vacant = Some(snapshot);
                true
            }
        }
    }

    /// Vacate `index`, returning the snapshot that was there.
    pub fn invalidate(&mut self, index: usize) -> Option<Snapshot> {
        self.entries.get_mut(index).and_then(Option::take)
    }

    /// Vacate every entry and forget all slots.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of slots, vacant ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Bytes of device storage kept alive by the cache.
    pub fn retained_bytes(&self) -> usize {
        self.entries.iter().flatten().map(Snapshot::capacity).sum()
    }

    /// Occupied snapshots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter().flatten()
    }
}
