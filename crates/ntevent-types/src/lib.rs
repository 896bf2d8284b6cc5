//! Shared types for the ntevent listener core.
//!
//! This crate defines everything that crosses the boundary between the
//! pub/sub store and the listener core: resource handles, event flag
//! masks and their categories, log levels, and the event records a
//! consumer drains from a poller.
//!
//! It carries no behavior beyond encoding and accessors, so the store,
//! the transport and the listener core can all depend on it without
//! depending on each other.

mod event;
mod flags;
mod handle;

pub use event::{ConnectionInfo, Event, EventData, LogMessage, TopicInfo, Value, ValueEventData};
pub use flags::{Category, EventFlags};
pub use handle::{
    check_instance, Handle, HandleError, HandleKind, ListenerHandle, PollerHandle, MAX_INDEX,
    MAX_INSTANCE,
};

/// Log severity levels carried in [`LogMessage::level`].
///
/// Higher numbers are more severe; the `DEBUG1`..`DEBUG4` levels are
/// progressively more verbose than `DEBUG`.
#[derive(Debug, Clone, Copy)]
pub struct LogLevel;

impl LogLevel {
    pub const CRITICAL: u32 = 50;
    pub const ERROR: u32 = 40;
    pub const WARNING: u32 = 30;
    pub const INFO: u32 = 20;
    pub const DEBUG: u32 = 10;
    pub const DEBUG1: u32 = 9;
    pub const DEBUG2: u32 = 8;
    pub const DEBUG3: u32 = 7;
    pub const DEBUG4: u32 = 6;

    /// Returns the string label for a numeric level.
    ///
    /// Levels between the named ones map to the nearest lower name.
    pub fn label(level: u32) -> &'static str {
        match level {
            l if l >= Self::CRITICAL => "CRITICAL",
            l if l >= Self::ERROR => "ERROR",
            l if l >= Self::WARNING => "WARNING",
            l if l >= Self::INFO => "INFO",
            l if l >= Self::DEBUG => "DEBUG",
            Self::DEBUG1 => "DEBUG1",
            Self::DEBUG2 => "DEBUG2",
            Self::DEBUG3 => "DEBUG3",
            _ => "DEBUG4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_labels() {
        assert_eq!(LogLevel::label(LogLevel::CRITICAL), "CRITICAL");
        assert_eq!(LogLevel::label(45), "ERROR");
        assert_eq!(LogLevel::label(LogLevel::INFO), "INFO");
        assert_eq!(LogLevel::label(LogLevel::DEBUG2), "DEBUG2");
        assert_eq!(LogLevel::label(0), "DEBUG4");
    }
}
