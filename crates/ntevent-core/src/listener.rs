//! Poller and listener records, and the category index over listeners.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use ntevent_types::{Category, Event, EventData, EventFlags, ListenerHandle, PollerHandle};

use crate::signal::Signal;

/// Per-event admission predicate attached to a listener source.
///
/// Called with the source's own mask and the candidate event; returning
/// `false` drops the event before any reader can observe it. Runs under the
/// storage lock and must not call back into the storage.
pub type VetoFn = Box<dyn FnMut(EventFlags, &mut Event) -> bool + Send>;

/// One subscription contribution to a listener.
pub(crate) struct Source {
    pub(crate) mask: EventFlags,
    pub(crate) veto: Option<VetoFn>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("mask", &self.mask)
            .field("veto", &self.veto.is_some())
            .finish()
    }
}

/// A consumer mailbox.
#[derive(Debug)]
pub(crate) struct Poller {
    pub(crate) handle: PollerHandle,
    pub(crate) queue: Vec<Event>,
    pub(crate) signal: Arc<Signal>,
}

impl Poller {
    pub(crate) fn new(handle: PollerHandle) -> Self {
        Self {
            handle,
            queue: Vec::new(),
            signal: Arc::new(Signal::new()),
        }
    }

    /// Swaps out the whole queue; later events start a fresh one.
    pub(crate) fn take_queue(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.queue)
    }
}

/// A registered subscription bound to exactly one poller.
#[derive(Debug)]
pub(crate) struct Listener {
    pub(crate) handle: ListenerHandle,
    pub(crate) poller: PollerHandle,
    pub(crate) mask: EventFlags,
    pub(crate) sources: Vec<Source>,
    pub(crate) signal: Arc<Signal>,
}

impl Listener {
    pub(crate) fn new(handle: ListenerHandle, poller: PollerHandle) -> Self {
        Self {
            handle,
            poller,
            mask: EventFlags::NONE,
            sources: Vec::new(),
            signal: Arc::new(Signal::new()),
        }
    }

    /// Appends a source and returns the bits it newly added to the
    /// aggregate mask.
    pub(crate) fn add_source(&mut self, mask: EventFlags, veto: Option<VetoFn>) -> EventFlags {
        self.sources.push(Source { mask, veto });
        let delta = mask & !self.mask;
        self.mask |= mask;
        delta
    }

    /// Queues one event per item for every source matching `flags`.
    ///
    /// Each candidate passes through its source's veto predicate, if any,
    /// before it is appended. Returns the number of events kept.
    pub(crate) fn deliver<P>(
        &mut self,
        flags: EventFlags,
        items: &[P],
        queue: &mut Vec<Event>,
        make: impl Fn(&P) -> EventData,
    ) -> usize {
        if !flags.intersects(self.mask) {
            return 0;
        }
        let mut kept = 0;
        for source in &mut self.sources {
            if !flags.intersects(source.mask) {
                continue;
            }
            for item in items {
                let mut event = Event {
                    listener: self.handle,
                    flags,
                    data: make(item),
                };
                let admit = match source.veto.as_mut() {
                    Some(veto) => veto(source.mask, &mut event),
                    None => true,
                };
                if admit {
                    queue.push(event);
                    kept += 1;
                }
            }
        }
        kept
    }
}

/// The four category index sets.
///
/// A listener is a member of a category iff its aggregate mask intersects
/// the category's flag range. Membership grows with the mask and shrinks
/// only when the listener is removed.
#[derive(Debug, Default)]
pub(crate) struct CategorySets {
    sets: [HashSet<ListenerHandle>; 4],
}

impl CategorySets {
    /// Adds `listener` to every category `delta` newly covers.
    pub(crate) fn grow(&mut self, listener: ListenerHandle, delta: EventFlags) {
        for category in delta.categories() {
            self.sets[category.index()].insert(listener);
        }
    }

    /// Removes `listener` from every category its final mask covered.
    pub(crate) fn remove(&mut self, listener: ListenerHandle, mask: EventFlags) {
        for category in mask.categories() {
            self.sets[category.index()].remove(&listener);
        }
    }

    pub(crate) fn members(&self, category: Category) -> &HashSet<ListenerHandle> {
        &self.sets[category.index()]
    }

    pub(crate) fn len(&self, category: Category) -> usize {
        self.sets[category.index()].len()
    }
}
