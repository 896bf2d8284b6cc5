//! Error types for the listener core.

/// Errors that can occur while bringing up the delivery thread.
///
/// These never reach callers of the storage API directly; a failed lazy
/// start is reported as an invalid listener handle and logged.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The operating system refused to spawn the delivery thread.
    #[error("failed to spawn listener delivery thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The storage is shutting down and will not start a new thread.
    #[error("listener delivery thread already stopped")]
    Stopped,

    /// No poller slot was available for the delivery thread.
    #[error("no poller handle available for the delivery thread")]
    PollerUnavailable,
}
