mod common;

use common::MockActivity;

use cohort::activity::ActivityBuilder;
use cohort::combinator::map;
use cohort::engine::EventEngine;
use cohort::promise::Poll;
use cohort::sync::InterActivityMutex;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn conditional_waiter_gets_the_value_it_waited_for() {
    common::init_tracing();

    let mutex = InterActivityMutex::new(0);
    let waiting = MockActivity::new("waiting");
    let writer = MockActivity::new("writer");

    let mut answer = mutex.acquire_when(|v| *v == 42);
    assert!(waiting.poll(&mut answer).is_pending());
    assert!(!mutex.is_locked());

    let mut write = mutex.acquire();
    let Poll::Ready(mut lock) = writer.poll(&mut write) else {
        panic!("uncontended acquire must be ready");
    };
    *lock = 42;
    drop(lock);

    assert_eq!(waiting.take_wakeups(), 1);
    assert!(mutex.is_locked(), "lock is handed over, not released");

    let Poll::Ready(lock) = waiting.poll(&mut answer) else {
        panic!("woken waiter must hold the lock");
    };
    assert_eq!(*lock, 42);

    drop(lock);
    assert!(!mutex.is_locked());
}

#[test]
fn second_acquirer_waits_for_the_first_lock_to_drop() {
    let mutex = InterActivityMutex::new(42);
    let first = MockActivity::new("a1");
    let second = MockActivity::new("a2");

    let mut a1 = mutex.acquire();
    let mut a2 = mutex.acquire();

    let Poll::Ready(mut l1) = first.poll(&mut a1) else {
        panic!("uncontended acquire must be ready");
    };
    assert_eq!(*l1, 42);

    assert!(second.poll(&mut a2).is_pending());
    *l1 = 43;
    assert!(second.poll(&mut a2).is_pending());
    assert_eq!(second.take_wakeups(), 0);

    drop(l1);
    assert_eq!(second.take_wakeups(), 1);

    let Poll::Ready(l2) = second.poll(&mut a2) else {
        panic!("woken waiter must hold the lock");
    };
    assert_eq!(*l2, 43);
}

#[test]
fn unlock_hands_over_to_a_queued_waiter() {
    let mutex = InterActivityMutex::new(String::new());
    let first = MockActivity::new("first");
    let second = MockActivity::new("second");

    let Poll::Ready(mut held) = first.poll(&mut mutex.acquire()) else {
        panic!("uncontended acquire must be ready");
    };

    let mut queued = mutex.acquire();
    assert!(second.poll(&mut queued).is_pending());
    assert!(second.poll(&mut queued).is_pending());

    held.push_str("first");
    drop(held);
    assert_eq!(second.take_wakeups(), 1);

    let Poll::Ready(mut lock) = second.poll(&mut queued) else {
        panic!("woken waiter must hold the lock");
    };
    lock.push_str(",second");
    assert_eq!(*lock, "first,second");
}

#[test]
fn predicates_pick_their_own_values() {
    let mutex = InterActivityMutex::new(0u32);
    let ones = MockActivity::new("ones");
    let twos = MockActivity::new("twos");
    let setter = MockActivity::new("setter");

    let mut wants_one = mutex.acquire_when(|v| *v == 1);
    let mut wants_two = mutex.acquire_when(|v| *v == 2);
    assert!(ones.poll(&mut wants_one).is_pending());
    assert!(twos.poll(&mut wants_two).is_pending());

    let Poll::Ready(mut lock) = setter.poll(&mut mutex.acquire()) else {
        panic!("parked waiters do not hold the lock");
    };
    *lock = 2;
    drop(lock);

    assert_eq!(ones.take_wakeups(), 0);
    assert_eq!(twos.take_wakeups(), 1);

    let Poll::Ready(mut lock) = twos.poll(&mut wants_two) else {
        panic!("value matches the second predicate");
    };
    *lock = 1;
    drop(lock);

    assert_eq!(ones.take_wakeups(), 1);
    let Poll::Ready(lock) = ones.poll(&mut wants_one) else {
        panic!("value matches the first predicate");
    };
    assert_eq!(*lock, 1);
}

#[test]
fn dropped_request_is_skipped() {
    let mutex = InterActivityMutex::new(());
    let holder = MockActivity::new("holder");
    let quitter = MockActivity::new("quitter");

    let Poll::Ready(held) = holder.poll(&mut mutex.acquire()) else {
        panic!("uncontended acquire must be ready");
    };

    let mut request = mutex.acquire();
    assert!(quitter.poll(&mut request).is_pending());
    drop(request);

    drop(held);
    assert_eq!(quitter.wakeups(), 0);
    assert!(!mutex.is_locked());
}

#[test]
fn request_dropped_after_handover_releases_the_lock() {
    let mutex = InterActivityMutex::new(());
    let holder = MockActivity::new("holder");
    let late = MockActivity::new("late");
    let third = MockActivity::new("third");

    let Poll::Ready(held) = holder.poll(&mut mutex.acquire()) else {
        panic!("uncontended acquire must be ready");
    };

    let mut request = mutex.acquire();
    assert!(late.poll(&mut request).is_pending());

    drop(held);
    assert_eq!(late.take_wakeups(), 1);
    assert!(mutex.is_locked());

    drop(request);
    assert!(!mutex.is_locked());
    assert!(third.poll(&mut mutex.acquire()).is_ready());
}

#[test]
fn concurrent_increments_are_not_lost() {
    common::init_tracing();

    const THREADS: usize = 4;
    const PER_THREAD: usize = 250;

    let engine = EventEngine::new().unwrap();
    let mutex = InterActivityMutex::new(0usize);
    let (tx, rx) = mpsc::channel();

    let threads: Vec<_> = (0..THREADS)
        .map(|t| {
            let mutex = mutex.clone();
            let tx = tx.clone();
            let scheduler = engine.scheduler();

            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| {
                        let mutex = mutex.clone();
                        let tx = tx.clone();
                        ActivityBuilder::new()
                            .name(format!("inc-{t}-{i}"))
                            .scheduler(scheduler.clone())
                            .spawn(
                                move || map(mutex.acquire(), |mut lock| *lock += 1),
                                move |result| tx.send(result).unwrap(),
                            )
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let activities: Vec<_> = threads
        .into_iter()
        .flat_map(|thread| thread.join().unwrap())
        .collect();

    for _ in 0..THREADS * PER_THREAD {
        rx.recv_timeout(Duration::from_secs(10))
            .unwrap()
            .expect("increment completes");
    }

    let reader = MockActivity::new("reader");
    let Poll::Ready(lock) = reader.poll(&mut mutex.acquire()) else {
        panic!("every increment released the lock");
    };
    assert_eq!(*lock, THREADS * PER_THREAD);

    drop(activities);
}
