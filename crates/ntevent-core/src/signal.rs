//! Auto-reset waitable signal.
//!
//! Every poller and listener owns one. Notification sets it; a waiter
//! consumes it. Destroying a signal wakes every waiter and makes all later
//! waits return `false` immediately.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct SignalState {
    set: bool,
    destroyed: bool,
}

/// A settable, waitable flag shared between notifiers and waiters.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Signal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the signal, waking a waiter.
    pub fn set(&self) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.set = true;
        self.cond.notify_all();
    }

    /// Marks the signal destroyed and wakes every waiter.
    pub fn destroy(&self) {
        let mut state = self.lock();
        state.destroyed = true;
        state.set = false;
        self.cond.notify_all();
    }

    /// Blocks until the signal is set, consuming it.
    ///
    /// `None` waits forever. Returns `true` if the signal was consumed and
    /// `false` on timeout or destruction.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        let pending = |s: &mut SignalState| !s.set && !s.destroyed;
        let mut state = match timeout {
            None => self.cond.wait_while(guard, pending).unwrap_or_else(|e| e.into_inner()),
            Some(timeout) => {
                self.cond
                    .wait_timeout_while(guard, timeout, pending)
                    .unwrap_or_else(|e| e.into_inner())
                    .0
            }
        };
        if state.destroyed || !state.set {
            return false;
        }
        state.set = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_then_wait_consumes() {
        let signal = Signal::new();
        signal.set();
        signal.set();
        assert!(signal.wait(Some(Duration::from_millis(10))));
        assert!(
            !signal.wait(Some(Duration::from_millis(10))),
            "repeated sets collapse into one wake"
        );
    }

    #[test]
    fn wait_times_out_when_unset() {
        let signal = Signal::new();
        assert!(!signal.wait(Some(Duration::from_millis(20))));
    }

    #[test]
    fn set_from_another_thread_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        let setter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.set();
            })
        };
        assert!(signal.wait(Some(Duration::from_secs(5))));
        setter.join().unwrap();
    }

    #[test]
    fn destroy_wakes_waiter_with_false() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait(None))
        };
        thread::sleep(Duration::from_millis(20));
        signal.destroy();
        assert!(!waiter.join().unwrap());

        signal.set();
        assert!(
            !signal.wait(Some(Duration::from_millis(5))),
            "destroyed signals ignore set"
        );
    }
}
