//! Handle-indexed arena that owns listener and poller records.
//!
//! Records live in a slot vector; a handle encodes the slot index plus the
//! owning instance, so lookup is a bounds check and an index. Freed slots
//! are recycled oldest-first, which keeps a just-released handle from being
//! handed out again immediately while late notifications may still name it.

use std::collections::VecDeque;

use ntevent_types::{ListenerHandle, PollerHandle, MAX_INDEX};

/// A typed handle that can address a slot in a [`HandleMap`].
pub(crate) trait SlotHandle: Copy {
    /// Builds the handle for `index` within `instance`.
    fn from_slot(instance: u8, index: u32) -> Self;

    /// True if the handle carries this handle type's kind tag.
    fn is_valid(self) -> bool;

    /// The instance encoded in the handle.
    fn instance(self) -> u8;

    /// The slot index encoded in the handle.
    fn index(self) -> u32;
}

impl SlotHandle for ListenerHandle {
    fn from_slot(instance: u8, index: u32) -> Self {
        ListenerHandle::new(instance, index)
    }

    fn is_valid(self) -> bool {
        ListenerHandle::is_valid(self)
    }

    fn instance(self) -> u8 {
        ListenerHandle::instance(self)
    }

    fn index(self) -> u32 {
        ListenerHandle::index(self)
    }
}

impl SlotHandle for PollerHandle {
    fn from_slot(instance: u8, index: u32) -> Self {
        PollerHandle::new(instance, index)
    }

    fn is_valid(self) -> bool {
        PollerHandle::is_valid(self)
    }

    fn instance(self) -> u8 {
        PollerHandle::instance(self)
    }

    fn index(self) -> u32 {
        PollerHandle::index(self)
    }
}

/// Arena mapping handles of type `H` to owned records of type `T`.
///
/// Lookups with an unknown, removed, wrong-kind or foreign-instance handle
/// return `None`.
pub(crate) struct HandleMap<H, T> {
    instance: u8,
    slots: Vec<Option<(H, T)>>,
    free: VecDeque<u32>,
    len: usize,
}

impl<H: SlotHandle, T> HandleMap<H, T> {
    /// Creates an empty map for the given instance.
    pub fn new(instance: u8) -> Self {
        Self {
            instance,
            slots: Vec::new(),
            free: VecDeque::new(),
            len: 0,
        }
    }

    /// Allocates a handle and stores the record built by `make`.
    ///
    /// `make` receives the new handle so records can carry their own
    /// identity. Returns `None` when the handle index space is exhausted.
    pub fn add(&mut self, make: impl FnOnce(H) -> T) -> Option<H> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                let next = u32::try_from(self.slots.len()).ok()?;
                if next > MAX_INDEX {
                    return None;
                }
                self.slots.push(None);
                next
            }
        };
        let handle = H::from_slot(self.instance, index);
        self.slots[index as usize] = Some((handle, make(handle)));
        self.len += 1;
        Some(handle)
    }

    fn slot_index(&self, handle: H) -> Option<usize> {
        if !handle.is_valid() || handle.instance() != self.instance {
            return None;
        }
        let index = handle.index() as usize;
        (index < self.slots.len()).then_some(index)
    }

    /// Returns the record for `handle`.
    pub fn get(&self, handle: H) -> Option<&T> {
        let index = self.slot_index(handle)?;
        self.slots[index].as_ref().map(|(_, record)| record)
    }

    /// Returns the record for `handle` mutably.
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let index = self.slot_index(handle)?;
        self.slots[index].as_mut().map(|(_, record)| record)
    }

    /// True if `handle` names a live record.
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Detaches the record from lookup and returns ownership of it.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let index = self.slot_index(handle)?;
        let (_, record) = self.slots[index].take()?;
        self.free.push_back(index as u32);
        self.len -= 1;
        Some(record)
    }

    /// Iterates live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(handle, record)| (*handle, record)))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }
}
