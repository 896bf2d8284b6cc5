//! Concurrent notify workload against a single listener storage.
//!
//! Each producer thread sends a start log, `events_per_producer` value
//! changes on its own topic, and a finish log. Three listeners observe the
//! traffic:
//!
//! - a poller listener taking every value and log event,
//! - a poller listener whose veto admits only even values,
//! - a callback listener counting value events on the delivery thread.
//!
//! A consumer thread drains the poller while producers run. Afterwards the
//! harness flushes callback delivery and compares every count against what
//! the workload should have produced.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ntevent_core::{
    Event, EventFlags, Handle, HandleError, HandleKind, ListenerHandle, ListenerStorage, LogLevel,
    PollerHandle, StorageStats, Value,
};
use serde::Serialize;

use crate::config::Config;

const CONSUMER_POLL: Duration = Duration::from_millis(50);

/// Outcome of one soak run.
#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub producers: usize,
    pub events_per_producer: u64,
    pub expected_polled: u64,
    pub polled: u64,
    pub expected_filtered: u64,
    pub filtered: u64,
    pub expected_callbacks: u64,
    pub callbacks: u64,
    /// Whether callback delivery drained within the flush timeout.
    pub flushed: bool,
    /// Whether producers were stopped early.
    pub cancelled: bool,
    pub elapsed_ms: u64,
    /// Storage counters taken after the flush.
    pub stats: StorageStats,
}

impl SoakReport {
    /// True when the run finished and every listener saw exactly what it
    /// should have.
    pub fn is_consistent(&self) -> bool {
        !self.cancelled
            && self.flushed
            && self.polled == self.expected_polled
            && self.filtered == self.expected_filtered
            && self.callbacks == self.expected_callbacks
    }
}

fn even_values_only(_: EventFlags, event: &mut Event) -> bool {
    matches!(
        event.value_data().map(|d| &d.value),
        Some(Value::Integer(n)) if n % 2 == 0
    )
}

/// Runs the workload described by `config`, blocking until it completes.
///
/// Setting `cancel` stops producers before their next notification; the
/// report is then marked cancelled.
///
/// # Errors
///
/// Returns `HandleError` if `soak.instance` is not a valid instance id.
pub fn run_soak(config: &Config, cancel: &AtomicBool) -> Result<SoakReport, HandleError> {
    let soak = &config.soak;
    let started = Instant::now();
    let storage = ListenerStorage::with_config(soak.instance, config.storage.clone())?;

    let poller = storage.create_listener_poller();
    let all = storage.add_listener(poller, EventFlags::VALUE_ALL | EventFlags::LOG_MESSAGE);
    let even = storage.add_listener(poller, EventFlags::NONE);
    storage.activate(even, EventFlags::VALUE_ALL, Some(Box::new(even_values_only)));

    let callback_count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&callback_count);
    let pushed = storage.add_callback_listener(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    if pushed.is_valid() {
        storage.activate(pushed, EventFlags::VALUE_ALL, None);
    } else {
        tracing::warn!("callback listener unavailable; callback counts will be zero");
    }

    tracing::info!(
        producers = soak.producers,
        events_per_producer = soak.events_per_producer,
        "starting soak run"
    );

    let finished = AtomicUsize::new(0);
    let (polled, filtered) = thread::scope(|s| {
        for producer in 0..soak.producers {
            let storage = &storage;
            let finished = &finished;
            s.spawn(move || {
                produce(storage, producer, soak.events_per_producer, cancel);
                finished.fetch_add(1, Ordering::AcqRel);
            });
        }
        let consumer = s.spawn(|| consume(&storage, poller, (all, even), &finished, soak.producers));
        consumer.join().unwrap_or_else(|_| {
            tracing::error!("soak consumer panicked");
            (0, 0)
        })
    });

    let flushed = storage.wait_for_listener_queue(Duration::from_millis(soak.flush_timeout_ms));
    if !flushed {
        tracing::warn!(timeout_ms = soak.flush_timeout_ms, "callback delivery did not drain in time");
    }

    let producers = soak.producers as u64;
    let per = soak.events_per_producer;
    let report = SoakReport {
        producers: soak.producers,
        events_per_producer: per,
        expected_polled: producers * (per + 2),
        polled,
        expected_filtered: producers * per.div_ceil(2),
        filtered,
        expected_callbacks: if pushed.is_valid() { producers * per } else { 0 },
        callbacks: callback_count.load(Ordering::Relaxed),
        flushed,
        cancelled: cancel.load(Ordering::Relaxed),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        stats: storage.stats(),
    };

    tracing::info!(
        polled = report.polled,
        filtered = report.filtered,
        callbacks = report.callbacks,
        elapsed_ms = report.elapsed_ms,
        consistent = report.is_consistent(),
        "soak run finished"
    );
    Ok(report)
}

fn produce(storage: &ListenerStorage, producer: usize, count: u64, cancel: &AtomicBool) {
    let topic = Handle::new(HandleKind::Topic, storage.instance(), producer as u32);
    storage.notify_log(
        &[],
        EventFlags::LOG_MESSAGE,
        LogLevel::INFO,
        file!(),
        line!(),
        &format!("producer {producer} started"),
    );
    for n in 0..count {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(producer, sent = n, "producer cancelled");
            break;
        }
        storage.notify_value(
            &[],
            EventFlags::VALUE_REMOTE,
            topic,
            Handle::INVALID,
            &Value::Integer(n as i64),
        );
    }
    storage.notify_log(
        &[],
        EventFlags::LOG_MESSAGE,
        LogLevel::INFO,
        file!(),
        line!(),
        &format!("producer {producer} finished"),
    );
}

/// Drains `poller` until every producer has finished, counting events per
/// listener.
fn consume(
    storage: &ListenerStorage,
    poller: PollerHandle,
    (all, even): (ListenerHandle, ListenerHandle),
    finished: &AtomicUsize,
    producers: usize,
) -> (u64, u64) {
    let mut polled = 0;
    let mut filtered = 0;
    loop {
        let done = finished.load(Ordering::Acquire) == producers;
        for event in storage.read_listener_queue(poller) {
            if event.listener == all {
                polled += 1;
            } else if event.listener == even {
                filtered += 1;
            }
        }
        if done {
            return (polled, filtered);
        }
        storage.wait_for_poller(poller, CONSUMER_POLL);
    }
}
