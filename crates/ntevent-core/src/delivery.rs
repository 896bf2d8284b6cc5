//! Callback delivery thread.
//!
//! Push-style listeners are bound to one internal poller that this thread
//! drains. Each pass swaps out the poller's queue and invokes the callback
//! registered for every event's listener, looking the callback up under the
//! storage lock and calling it with the lock released.
//!
//! ```text
//!              ┌──────────── doorbell (poller signal) ────────────┐
//!              │                                                  │
//!   notify ────┤  stop request ──┐                                ▼
//!              │  flush request ─┴──► set doorbell ──► wait ─► drain ─► dispatch ─┐
//!              │                                        ▲                         │
//!              └────────────────────────────────────────┴── complete flush ◄──────┘
//! ```
//!
//! ## Flush handshake
//! A flush caller takes a ticket and rings the doorbell. The thread
//! snapshots the latest ticket before it drains; once dispatch for that
//! pass finishes, every ticket up to the snapshot is complete. A pass that
//! finds nothing queued still completes its tickets.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use ntevent_types::{Event, ListenerHandle, PollerHandle};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::signal::Signal;

/// Callback invoked on the delivery thread for each event of a push-style
/// listener.
pub type ListenerCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// What the delivery loop needs from the storage.
pub(crate) trait DeliverySource: Send + Sync + 'static {
    /// Swaps out and returns the queue of `poller`.
    fn drain(&self, poller: PollerHandle) -> Vec<Event>;

    /// Looks up the callback registered for `listener`.
    fn callback(&self, listener: ListenerHandle) -> Option<ListenerCallback>;
}

/// Lifecycle of the delivery thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// No push-style listener has been added yet.
    NotStarted,
    /// The thread is running.
    Running,
    /// The storage was torn down; the thread will not restart.
    Stopped,
}

pub(crate) enum DeliveryState {
    NotStarted,
    Running(DeliveryThread),
    Stopped,
}

impl DeliveryState {
    pub(crate) fn status(&self) -> DeliveryStatus {
        match self {
            Self::NotStarted => DeliveryStatus::NotStarted,
            Self::Running(_) => DeliveryStatus::Running,
            Self::Stopped => DeliveryStatus::Stopped,
        }
    }

    pub(crate) fn running(&self) -> Option<&DeliveryThread> {
        match self {
            Self::Running(thread) => Some(thread),
            _ => None,
        }
    }

    pub(crate) fn running_mut(&mut self) -> Option<&mut DeliveryThread> {
        match self {
            Self::Running(thread) => Some(thread),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct FlushState {
    requested: u64,
    completed: u64,
    stopped: bool,
}

/// State shared between the delivery thread and storage callers.
pub(crate) struct DeliveryControl {
    doorbell: Arc<Signal>,
    stop: AtomicBool,
    flush: Mutex<FlushState>,
    flushed: Condvar,
}

impl DeliveryControl {
    pub(crate) fn new(doorbell: Arc<Signal>) -> Self {
        Self {
            doorbell,
            stop: AtomicBool::new(false),
            flush: Mutex::new(FlushState::default()),
            flushed: Condvar::new(),
        }
    }

    fn lock_flush(&self) -> MutexGuard<'_, FlushState> {
        self.flush.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.doorbell.set();
    }

    /// Takes a flush ticket and wakes the thread.
    pub(crate) fn request_flush(&self) -> u64 {
        let ticket = {
            let mut state = self.lock_flush();
            state.requested += 1;
            state.requested
        };
        self.doorbell.set();
        ticket
    }

    fn begin_pass(&self) -> u64 {
        self.lock_flush().requested
    }

    fn complete_pass(&self, target: u64) {
        let mut state = self.lock_flush();
        if target > state.completed {
            state.completed = target;
            self.flushed.notify_all();
        }
    }

    fn mark_stopped(&self) {
        self.lock_flush().stopped = true;
        self.flushed.notify_all();
    }

    /// Blocks until `ticket` is complete. Returns `false` on timeout or if
    /// the thread stopped first.
    pub(crate) fn wait_flushed(&self, ticket: u64, timeout: Duration) -> bool {
        let guard = self.lock_flush();
        let (state, _) = self
            .flushed
            .wait_timeout_while(guard, timeout, |s| s.completed < ticket && !s.stopped)
            .unwrap_or_else(|e| e.into_inner());
        state.completed >= ticket
    }
}

/// A running delivery thread and its callback table.
pub(crate) struct DeliveryThread {
    pub(crate) poller: PollerHandle,
    pub(crate) callbacks: HashMap<ListenerHandle, ListenerCallback>,
    pub(crate) control: Arc<DeliveryControl>,
    join: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl DeliveryThread {
    /// Spawns the thread draining `poller`, woken through `doorbell`.
    pub(crate) fn start<S: DeliverySource>(
        name: &str,
        source: Arc<S>,
        poller: PollerHandle,
        doorbell: Arc<Signal>,
    ) -> Result<Self, DeliveryError> {
        let control = Arc::new(DeliveryControl::new(doorbell));
        let thread_control = Arc::clone(&control);
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(source, poller, thread_control))?;
        let thread_id = join.thread().id();

        tracing::info!(%poller, thread = name, "listener delivery thread started");

        Ok(Self {
            poller,
            callbacks: HashMap::new(),
            control,
            join: Some(join),
            thread_id,
        })
    }

    /// Requests stop and joins the thread.
    ///
    /// When called from the delivery thread itself (the last storage owner
    /// was dropped inside a callback) the thread is detached instead; it
    /// exits after the current callback returns.
    pub(crate) fn shutdown(mut self) {
        self.control.request_stop();
        let Some(join) = self.join.take() else {
            return;
        };
        if thread::current().id() == self.thread_id {
            tracing::debug!("delivery thread dropped its own storage; detaching");
            return;
        }
        if join.join().is_err() {
            tracing::error!("listener delivery thread panicked");
        }
    }
}

fn run<S: DeliverySource>(source: Arc<S>, poller: PollerHandle, control: Arc<DeliveryControl>) {
    loop {
        if !control.doorbell.wait(None) || control.stop_requested() {
            break;
        }
        let target = control.begin_pass();
        let events = source.drain(poller);
        for event in &events {
            let Some(callback) = source.callback(event.listener) else {
                continue;
            };
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let message = panic
                    .downcast_ref::<&'static str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(listener = %event.listener, %message, "listener callback panicked");
            }
        }
        control.complete_pass(target);
    }
    control.mark_stopped();
    tracing::info!(%poller, "listener delivery thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntevent_types::{EventData, EventFlags, LogMessage};
    use std::sync::atomic::AtomicUsize;

    /// Minimal source: one queue, one callback for every listener.
    struct FakeSource {
        queue: Mutex<Vec<Event>>,
        callback: ListenerCallback,
    }

    impl DeliverySource for FakeSource {
        fn drain(&self, _poller: PollerHandle) -> Vec<Event> {
            std::mem::take(&mut *self.queue.lock().unwrap())
        }

        fn callback(&self, _listener: ListenerHandle) -> Option<ListenerCallback> {
            Some(Arc::clone(&self.callback))
        }
    }

    fn log_event(message: &str) -> Event {
        Event {
            listener: ListenerHandle::new(0, 0),
            flags: EventFlags::LOG_MESSAGE,
            data: EventData::Log(LogMessage {
                level: 20,
                filename: String::new(),
                line: 0,
                message: message.to_string(),
            }),
        }
    }

    fn start(callback: ListenerCallback) -> (Arc<FakeSource>, Arc<Signal>, DeliveryThread) {
        let source = Arc::new(FakeSource {
            queue: Mutex::new(Vec::new()),
            callback,
        });
        let doorbell = Arc::new(Signal::new());
        let thread = DeliveryThread::start(
            "delivery-test",
            Arc::clone(&source),
            PollerHandle::new(0, 0),
            Arc::clone(&doorbell),
        )
        .expect("thread should spawn");
        (source, doorbell, thread)
    }

    #[test]
    fn flush_with_nothing_queued_completes() {
        let (_source, _doorbell, thread) = start(Arc::new(|_: &Event| {}));
        let ticket = thread.control.request_flush();
        assert!(thread.control.wait_flushed(ticket, Duration::from_secs(5)));
        thread.shutdown();
    }

    #[test]
    fn queued_events_are_dispatched_before_flush_returns() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let (source, doorbell, thread) = start(Arc::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.queue.lock().unwrap().extend([log_event("a"), log_event("b")]);
        doorbell.set();

        let ticket = thread.control.request_flush();
        assert!(thread.control.wait_flushed(ticket, Duration::from_secs(5)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        thread.shutdown();
    }

    #[test]
    fn panicking_callback_does_not_stop_dispatch() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let (source, _doorbell, thread) = start(Arc::new(move |ev: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if ev.log_message().is_some_and(|m| m.message == "boom") {
                panic!("boom");
            }
        }));

        source
            .queue
            .lock()
            .unwrap()
            .extend([log_event("boom"), log_event("after")]);
        let ticket = thread.control.request_flush();
        assert!(thread.control.wait_flushed(ticket, Duration::from_secs(5)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        thread.shutdown();
    }

    #[test]
    fn flush_after_stop_returns_false() {
        let (_source, _doorbell, thread) = start(Arc::new(|_: &Event| {}));
        let control = Arc::clone(&thread.control);
        thread.shutdown();
        let ticket = control.request_flush();
        assert!(!control.wait_flushed(ticket, Duration::from_millis(50)));
    }
}
