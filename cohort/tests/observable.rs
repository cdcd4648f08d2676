mod common;

use common::MockActivity;

use cohort::activity::ActivityBuilder;
use cohort::combinator::{LoopCtl, loop_promise, map};
use cohort::party::Party;
use cohort::promise::Poll;
use cohort::sync::Observable;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn next_resolves_to_a_different_value() {
    let observable = Observable::new(0);
    let activity = MockActivity::new("watcher");

    let mut next = observable.next(0);
    assert!(activity.poll(&mut next).is_pending());
    assert_eq!(observable.waiting(), 1);

    observable.set(1);
    assert_eq!(activity.take_wakeups(), 1);
    assert_eq!(observable.waiting(), 0);
    assert_eq!(activity.poll(&mut next), Poll::Ready(1));
}

#[test]
fn next_is_ready_when_the_value_already_moved() {
    let observable = Observable::new("b");
    let activity = MockActivity::new("late");

    let mut next = observable.next("a");
    assert_eq!(activity.poll(&mut next), Poll::Ready("b"));
    assert_eq!(observable.waiting(), 0);
}

#[test]
fn setting_the_same_value_keeps_waiting() {
    let observable = Observable::new(5);
    let activity = MockActivity::new("patient");

    let mut next = observable.next(5);
    assert!(activity.poll(&mut next).is_pending());

    observable.set(5);
    assert_eq!(activity.take_wakeups(), 1);
    assert!(activity.poll(&mut next).is_pending());
    assert_eq!(observable.waiting(), 1);

    observable.set(6);
    assert_eq!(activity.poll(&mut next), Poll::Ready(6));
}

#[test]
fn next_when_waits_for_the_predicate() {
    let observable = Observable::new(0u32);
    let activity = MockActivity::new("threshold");

    let mut big = observable.next_when(|v| *v >= 10);
    for value in [3, 7, 9] {
        assert!(activity.poll(&mut big).is_pending());
        observable.set(value);
    }

    observable.set(12);
    assert_eq!(activity.poll(&mut big), Poll::Ready(12));
    assert_eq!(observable.get(), 12);
}

#[test]
fn dropped_observer_is_forgotten() {
    let observable = Observable::new(());
    let activity = MockActivity::new("gone");

    let mut never_changes = observable.next_when(|_| false);
    assert!(activity.poll(&mut never_changes).is_pending());
    assert_eq!(observable.waiting(), 1);

    drop(never_changes);
    assert_eq!(observable.waiting(), 0);

    observable.set(());
    assert_eq!(activity.wakeups(), 0);
}

#[test]
fn rapid_updates_end_with_the_sentinel() {
    common::init_tracing();

    const UPDATES: u64 = 100_000;
    const SENTINEL: u64 = u64::MAX;

    let observable = Observable::new(0u64);
    let last_seen = Arc::new(AtomicU64::new(0));
    let (tx, rx) = mpsc::channel();

    let watched = observable.clone();
    let seen = last_seen.clone();
    let _activity = ActivityBuilder::new().name("observer").spawn(
        move || {
            loop_promise(move || {
                let seen = seen.clone();
                map(watched.next(seen.load(Ordering::SeqCst)), move |value| {
                    assert!(value > seen.load(Ordering::SeqCst), "values only move forward");
                    seen.store(value, Ordering::SeqCst);
                    if value == SENTINEL {
                        LoopCtl::Break(value)
                    } else {
                        LoopCtl::Continue
                    }
                })
            })
        },
        move |result| tx.send(result).unwrap(),
    );

    let setter = observable.clone();
    thread::spawn(move || {
        for value in 1..=UPDATES {
            setter.set(value);
        }
        setter.set(SENTINEL);
    })
    .join()
    .unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(30)).unwrap(), Ok(SENTINEL));
    assert_eq!(last_seen.load(Ordering::SeqCst), SENTINEL);
}

#[test]
fn concurrent_setters_resolve_every_waiter_once_with_the_sentinel() {
    common::init_tracing();

    const SETTERS: u64 = 4;
    const UPDATES_PER_SETTER: u64 = 25_000;
    const WATCHERS: usize = 4;
    const SENTINEL: u64 = u64::MAX;

    let observable = Observable::new(0u64);
    let (tx, rx) = mpsc::channel();

    let mut activities = Vec::new();
    for i in 0..WATCHERS {
        let watched = observable.clone();
        let tx = tx.clone();
        activities.push(ActivityBuilder::new().name(format!("sentinel-{i}")).spawn(
            move || watched.next_when(|v| *v == SENTINEL),
            move |result| tx.send((format!("sentinel-{i}"), result.unwrap())).unwrap(),
        ));
    }

    let party = Party::new("chains");
    for i in 0..WATCHERS {
        let watched = observable.clone();
        let tx = tx.clone();
        let last = Arc::new(AtomicU64::new(0));
        party.spawn(
            format!("chain-{i}"),
            move || {
                loop_promise(move || {
                    let last = last.clone();
                    map(watched.next(last.load(Ordering::SeqCst)), move |value| {
                        last.store(value, Ordering::SeqCst);
                        if value == SENTINEL {
                            LoopCtl::Break(value)
                        } else {
                            LoopCtl::Continue
                        }
                    })
                })
            },
            move |value| tx.send((format!("chain-{i}"), value)).unwrap(),
        );
    }
    drop(tx);

    assert_eq!(observable.waiting(), 2 * WATCHERS);

    let setters: Vec<_> = (0..SETTERS)
        .map(|s| {
            let setter = observable.clone();
            thread::spawn(move || {
                for n in 0..UPDATES_PER_SETTER {
                    setter.set(s * UPDATES_PER_SETTER + n + 1);
                }
            })
        })
        .collect();

    for setter in setters {
        setter.join().unwrap();
    }
    observable.set(SENTINEL);

    let mut resolved: HashMap<String, usize> = HashMap::new();
    for _ in 0..2 * WATCHERS {
        let (name, value) = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("a waiter never resolved");
        assert_eq!(value, SENTINEL, "{name} resolved early");
        *resolved.entry(name).or_default() += 1;
    }

    assert_eq!(resolved.len(), 2 * WATCHERS);
    assert!(resolved.values().all(|&count| count == 1));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(observable.waiting(), 0);
    assert_eq!(party.participants(), 0);

    drop(activities);
}
