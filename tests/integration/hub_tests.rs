//! Broadcast hub tests under concurrent use.
//!
//! Tests verify:
//! - Fan-out of one event to several subscribers with identical payloads
//! - Unsubscribing while another thread is publishing
//! - Per-subscriber ordering across publishing threads
//! - No subscriber outlives a concurrent close

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use serde_json::json;

use portfolio_server::BroadcastHub;

#[test]
fn test_three_subscribers_receive_identical_event() {
    let hub = BroadcastHub::new();
    let mut subs = vec![hub.subscribe(), hub.subscribe(), hub.subscribe()];

    let payload = json!({"kind": "snap", "name": "x.jpg", "url": "/uploads/x.jpg", "thumb": "/uploads/thumbs/x.jpg"});
    assert_eq!(hub.publish("processed", payload.clone()), 3);

    for sub in subs.iter_mut() {
        let event = sub.try_recv().unwrap();
        assert_eq!(event.name, "processed");
        assert_eq!(event.data, payload);
        assert!(sub.try_recv().is_none());
    }
}

#[test]
fn test_unsubscribe_during_publish() {
    const EVENTS: usize = 2000;

    let hub = BroadcastHub::new();
    let mut keep_a = hub.subscribe();
    let leaving = hub.subscribe();
    let mut keep_b = hub.subscribe();

    let barrier = Arc::new(Barrier::new(2));
    let publisher = {
        let hub = hub.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..EVENTS {
                hub.publish("tick", json!(i));
            }
        })
    };

    barrier.wait();
    drop(leaving);
    publisher.join().unwrap();

    assert_eq!(hub.subscriber_count(), 2);
    for sub in [&mut keep_a, &mut keep_b] {
        let seen: Vec<usize> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.data.as_u64().unwrap() as usize)
            .collect();
        assert_eq!(seen, (0..EVENTS).collect::<Vec<_>>());
    }
}

#[test]
fn test_concurrent_subscribe_and_publish() {
    let hub = BroadcastHub::new();
    let mut observer = hub.subscribe();

    let churners: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let mut sub = hub.subscribe();
                    sub.unsubscribe();
                }
            })
        })
        .collect();

    for i in 0..500 {
        hub.publish("tick", json!(i));
    }
    for handle in churners {
        handle.join().unwrap();
    }

    assert_eq!(hub.subscriber_count(), 1);
    let seen = std::iter::from_fn(|| observer.try_recv()).count();
    assert_eq!(seen, 500);
}

#[tokio::test]
async fn test_subscribers_wait_for_events() {
    let hub = BroadcastHub::new();
    let mut subs: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

    let waiters: Vec<_> = subs
        .drain(..)
        .map(|mut sub| tokio::spawn(async move { sub.recv().await.map(|e| e.data) }))
        .collect();

    tokio::task::yield_now().await;
    hub.publish("processed", json!({"name": "late.png"}));

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Some(json!({"name": "late.png"})));
    }
}

#[tokio::test]
async fn test_close_racing_subscribers_leaves_none_registered() {
    let hub = BroadcastHub::new();
    let barrier = Arc::new(Barrier::new(5));

    let subscribers: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..250).map(|_| hub.subscribe()).collect::<Vec<_>>()
            })
        })
        .collect();

    barrier.wait();
    hub.close();

    let mut subs = Vec::new();
    for handle in subscribers {
        subs.extend(handle.join().unwrap());
    }

    assert!(hub.is_closed());
    assert_eq!(hub.subscriber_count(), 0);
    for sub in subs.iter_mut() {
        let ended = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await;
        assert!(matches!(ended, Ok(None)), "subscriber {} still open", sub.id());
    }
}
