//! Soak harness for the listener storage.
//!
//! Drives concurrent notifiers against poller and callback listeners and
//! reports whether every listener observed exactly the events it should
//! have. The `ntevent-soak` binary wraps [`run_soak`] with configuration
//! loading, logging setup, and Ctrl+C cancellation.

pub mod config;
mod harness;

pub use harness::{run_soak, SoakReport};
