//! Concurrent producers, blocking waits, re-entrant callbacks and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ntevent_core::{
    DeliveryStatus, EventFlags, Handle, HandleKind, ListenerStorage, LogLevel, Value,
};

const PRODUCERS: usize = 4;
const PER_PRODUCER: i64 = 250;

fn topic(index: u32) -> Handle {
    Handle::new(HandleKind::Topic, 0, index)
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
    let storage = ListenerStorage::new(0).unwrap();
    let poller = storage.create_listener_poller();
    assert!(storage.add_listener(poller, EventFlags::VALUE_ALL).is_valid());

    thread::scope(|s| {
        for producer in 0..PRODUCERS {
            let storage = &storage;
            s.spawn(move || {
                for n in 0..PER_PRODUCER {
                    storage.notify_value(
                        &[],
                        EventFlags::VALUE_REMOTE,
                        topic(producer as u32),
                        Handle::INVALID,
                        &Value::Integer(n),
                    );
                }
            });
        }
    });

    let events = storage.read_listener_queue(poller);
    assert_eq!(events.len(), PRODUCERS * PER_PRODUCER as usize);

    let mut last = vec![-1i64; PRODUCERS];
    for event in &events {
        let data = event.value_data().unwrap();
        let producer = data.topic.index() as usize;
        let Value::Integer(n) = data.value else {
            panic!("unexpected payload");
        };
        assert_eq!(n, last[producer] + 1, "producer {producer} out of order");
        last[producer] = n;
    }
}

#[test]
fn churn_during_notify_leaves_consistent_state() {
    let storage = ListenerStorage::new(0).unwrap();
    let poller = storage.create_listener_poller();
    let stable = storage.add_listener(poller, EventFlags::TOPIC | EventFlags::VALUE_ALL);

    thread::scope(|s| {
        let storage = &storage;
        s.spawn(move || {
            for _ in 0..200 {
                let l = storage.add_listener(poller, EventFlags::VALUE_ALL);
                assert_eq!(storage.remove_listener(l).len(), 1);
            }
        });
        for _ in 0..2 {
            s.spawn(move || {
                for n in 0..200 {
                    storage.notify_value(
                        &[],
                        EventFlags::VALUE_LOCAL,
                        topic(0),
                        Handle::INVALID,
                        &Value::Integer(n),
                    );
                }
            });
        }
    });

    let stats = storage.stats();
    assert_eq!(stats.listeners, 1);
    assert_eq!(stats.value_listeners, 1);
    assert_eq!(stats.topic_listeners, 1);

    let stable_events = storage
        .read_listener_queue(poller)
        .into_iter()
        .filter(|e| e.listener == stable)
        .count();
    assert_eq!(stable_events, 400);
}

#[test]
fn poller_waiter_wakes_on_notify() {
    let storage = ListenerStorage::new(0).unwrap();
    let poller = storage.create_listener_poller();
    assert!(storage.add_listener(poller, EventFlags::LOG_MESSAGE).is_valid());

    thread::scope(|s| {
        let waiter = s.spawn(|| storage.wait_for_poller(poller, Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        storage.notify_log(&[], EventFlags::LOG_MESSAGE, LogLevel::INFO, "x.rs", 1, "hello");
        assert!(waiter.join().unwrap());
    });
    assert_eq!(storage.read_listener_queue(poller).len(), 1);
}

#[test]
fn destroying_poller_wakes_blocked_waiter() {
    let storage = ListenerStorage::new(0).unwrap();
    let poller = storage.create_listener_poller();
    let listener = storage.add_listener(poller, EventFlags::NONE);

    thread::scope(|s| {
        let started = Instant::now();
        let poller_waiter = s.spawn(|| storage.wait_for_poller(poller, Duration::from_secs(10)));
        let listener_waiter =
            s.spawn(|| storage.wait_for_listener(listener, Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(storage.destroy_listener_poller(poller).len(), 1);
        assert!(!poller_waiter.join().unwrap());
        assert!(!listener_waiter.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    });
}

#[test]
fn waits_on_unknown_handles_return_false() {
    let storage = ListenerStorage::new(0).unwrap();
    let poller = storage.create_listener_poller();
    let listener = storage.add_listener(poller, EventFlags::NONE);
    storage.destroy_listener_poller(poller);

    assert!(!storage.wait_for_poller(poller, Duration::from_millis(10)));
    assert!(!storage.wait_for_listener(listener, Duration::from_millis(10)));
}

#[test]
fn callback_may_reenter_storage() {
    let storage = Arc::new(ListenerStorage::new(0).unwrap());
    let poller = storage.create_listener_poller();
    let sink = storage.add_listener(poller, EventFlags::TOPIC);

    let weak = Arc::downgrade(&storage);
    let callback_self = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&callback_self);
    let listener = storage.add_callback_listener(move |_| {
        let Some(storage) = weak.upgrade() else {
            return;
        };
        assert_eq!(storage.stats().delivery, DeliveryStatus::Running);
        storage.activate(sink, EventFlags::LOG_MESSAGE, None);
        if let Some(me) = *slot.lock().unwrap() {
            storage.remove_listener(me);
        }
    });
    *callback_self.lock().unwrap() = Some(listener);
    storage.activate(listener, EventFlags::VALUE_ALL, None);

    storage.notify_value(&[], EventFlags::VALUE_LOCAL, topic(0), Handle::INVALID, &Value::Double(1.5));
    assert!(storage.wait_for_listener_queue(Duration::from_secs(5)));

    let stats = storage.stats();
    assert_eq!(stats.callbacks, 0, "callback removed itself");
    assert_eq!(stats.log_listeners, 1, "callback activated the sink");
}

#[test]
fn panicking_callback_keeps_thread_alive() {
    let storage = ListenerStorage::new(0).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let listener = storage.add_callback_listener(move |event| {
        counter.fetch_add(1, Ordering::SeqCst);
        if event.log_message().is_some_and(|m| m.line == 1) {
            panic!("listener failure");
        }
    });
    storage.activate(listener, EventFlags::LOG_MESSAGE, None);

    storage.notify_log(&[], EventFlags::LOG_MESSAGE, LogLevel::ERROR, "p.rs", 1, "first");
    storage.notify_log(&[], EventFlags::LOG_MESSAGE, LogLevel::ERROR, "p.rs", 2, "second");
    assert!(storage.wait_for_listener_queue(Duration::from_secs(5)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(storage.stats().delivery, DeliveryStatus::Running);
}

#[test]
fn drop_joins_running_delivery_thread() {
    let storage = ListenerStorage::new(0).unwrap();
    let listener = storage.add_callback_listener(|_| {});
    storage.activate(listener, EventFlags::CONNECTION, None);
    let started = Instant::now();
    drop(storage);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn dropping_last_owner_inside_callback_does_not_deadlock() {
    let storage = Arc::new(ListenerStorage::new(0).unwrap());
    let keeper: Arc<Mutex<Option<Arc<ListenerStorage>>>> = Arc::new(Mutex::new(None));
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let go_rx = Mutex::new(go_rx);
    let done_tx = Mutex::new(done_tx);

    let held = Arc::clone(&keeper);
    let listener = storage.add_callback_listener(move |_| {
        let _ = go_rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
        let last = held.lock().unwrap().take();
        drop(last);
        let _ = done_tx.lock().unwrap().send(());
    });
    storage.activate(listener, EventFlags::VALUE_ALL, None);
    *keeper.lock().unwrap() = Some(Arc::clone(&storage));

    storage.notify_value(&[], EventFlags::VALUE_LOCAL, topic(0), Handle::INVALID, &Value::Boolean(true));
    drop(storage);
    go_tx.send(()).unwrap();

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback should finish after dropping the storage");
}

#[test]
fn delivery_poller_refuses_pull_operations() {
    let storage = ListenerStorage::new(0).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let listener = storage.add_callback_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    storage.activate(listener, EventFlags::VALUE_ALL, None);
    let delivery_poller = ntevent_core::PollerHandle::new(0, 0);

    let started = Instant::now();
    assert!(!storage.wait_for_poller(delivery_poller, Duration::from_secs(10)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!storage.add_listener(delivery_poller, EventFlags::VALUE_ALL).is_valid());

    storage.notify_value(&[], EventFlags::VALUE_LOCAL, topic(0), Handle::INVALID, &Value::Integer(1));
    assert!(storage.read_listener_queue(delivery_poller).is_empty());
    assert!(storage.wait_for_listener_queue(Duration::from_secs(5)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(storage.stats().listeners, 1);
}
