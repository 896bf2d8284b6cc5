//! Listener registry and event dispatch core.
//!
//! The pub/sub store decides *that* something changed (a connection
//! opened, a topic was published, a value was set, a message was logged)
//! and calls into [`ListenerStorage`]. The storage decides *who* hears
//! about it and queues an [`Event`] for each matching listener.
//!
//! # Delivery styles
//!
//! | Style | Registration | Consumption |
//! |-------|--------------|-------------|
//! | Pull  | [`ListenerStorage::add_listener`] on a poller | [`ListenerStorage::read_listener_queue`] |
//! | Push  | [`ListenerStorage::add_callback_listener`] | callback on the delivery thread |
//!
//! # Masks and sources
//!
//! The mask passed to [`ListenerStorage::add_listener`] becomes the
//! listener's first source. Each [`ListenerStorage::activate`] call
//! contributes another: a mask plus an optional [`VetoFn`]. The
//! listener's aggregate mask is the union of its sources and decides which
//! category sets it belongs to; the individual source masks decide which
//! notifications actually queue events.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ntevent_core::{EventFlags, ListenerStorage};
//!
//! let storage = ListenerStorage::new(0)?;
//! let poller = storage.create_listener_poller();
//! let listener = storage.add_listener(poller, EventFlags::VALUE_ALL);
//!
//! storage.notify_value(&[], EventFlags::VALUE_LOCAL, topic, entry, &value);
//! for event in storage.read_listener_queue(poller) {
//!     // ...
//! }
//! ```

mod config;
mod delivery;
mod error;
mod listener;
mod registry;
mod signal;
mod storage;

pub use config::StorageConfig;
pub use delivery::{DeliveryStatus, ListenerCallback};
pub use error::DeliveryError;
pub use listener::VetoFn;
pub use storage::{ListenerStorage, RemovedListener, StorageStats};

pub use ntevent_types::{
    Category, ConnectionInfo, Event, EventData, EventFlags, Handle, HandleError, HandleKind,
    ListenerHandle, LogLevel, LogMessage, PollerHandle, TopicInfo, Value, ValueEventData,
    MAX_INSTANCE,
};
