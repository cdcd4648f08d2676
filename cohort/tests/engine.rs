mod common;

use cohort::Error;
use cohort::activity::{ActivityBuilder, CallbackScheduler};
use cohort::combinator::map;
use cohort::engine::{EngineBuilder, EventEngine};
use cohort::party::Party;
use cohort::promise::Promise;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn run_executes_on_the_engine_thread() {
    common::init_tracing();

    let engine = EngineBuilder::new().thread_name("engine-test").build().unwrap();
    let (tx, rx) = mpsc::channel();

    engine
        .handle()
        .run(move || tx.send(thread::current().name().map(str::to_string)).unwrap())
        .unwrap();

    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("engine-test"));
}

#[test]
fn timers_fire_in_deadline_order() {
    let engine = EventEngine::new().unwrap();
    let handle = engine.handle();
    let (tx, rx) = mpsc::channel();

    for (label, delay) in [("c", 30), ("a", 5), ("b", 15)] {
        let tx = tx.clone();
        handle
            .run_after(Duration::from_millis(delay), move || tx.send(label).unwrap())
            .unwrap();
    }

    let order: Vec<_> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn cancelled_timer_never_fires() {
    let engine = EventEngine::new().unwrap();
    let handle = engine.handle();
    let fired = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let flag = fired.clone();
    let timer = handle
        .run_after(Duration::from_millis(10), move || flag.store(true, Ordering::SeqCst))
        .unwrap();
    timer.cancel();
    assert!(timer.is_cancelled());

    handle
        .run_after(Duration::from_millis(30), move || tx.send(()).unwrap())
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert!(!fired.load(Ordering::SeqCst));
}

#[test]
fn shut_down_engine_refuses_work() {
    let engine = EventEngine::new().unwrap();
    let handle = engine.handle();
    engine.shutdown();

    assert_eq!(handle.run(|| {}), Err(Error::EngineShutdown));
    assert!(matches!(
        handle.run_after(Duration::from_millis(1), || {}),
        Err(Error::EngineShutdown)
    ));

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    handle.schedule(Box::new(move || flag.store(true, Ordering::SeqCst)));
    assert!(ran.load(Ordering::SeqCst), "scheduled work runs inline after shutdown");
}

#[test]
fn sleep_wakes_its_activity() {
    common::init_tracing();

    let engine = EventEngine::new().unwrap();
    let handle = engine.handle();
    let (tx, rx) = mpsc::channel();

    let started = Instant::now();
    let _activity = ActivityBuilder::new()
        .name("sleeper")
        .scheduler(engine.scheduler())
        .spawn(move || handle.sleep(Duration::from_millis(20)), move |r| {
            tx.send(r).unwrap()
        });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(()));
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn elapsed_sleep_is_ready_without_an_activity() {
    let engine = EventEngine::new().unwrap();
    let mut sleep = engine.handle().sleep(Duration::ZERO);

    assert!(sleep.deadline() <= Instant::now());
    assert!(sleep.poll().is_ready());
}

#[test]
fn dropping_a_sleep_releases_its_activity() {
    let engine = EventEngine::new().unwrap();
    let activity = common::MockActivity::new("short-lived");

    let mut sleep = engine.handle().sleep(Duration::from_secs(60));
    assert!(activity.poll(&mut sleep).is_pending());
    assert_eq!(Arc::strong_count(&activity), 2);

    drop(sleep);
    assert_eq!(Arc::strong_count(&activity), 1);
    assert_eq!(activity.wakeups(), 0);
}

#[test]
fn sleep_after_shutdown_holds_no_waker() {
    let engine = EventEngine::new().unwrap();
    let handle = engine.handle();
    engine.shutdown();

    let activity = common::MockActivity::new("stranded");
    let mut sleep = handle.sleep(Duration::from_secs(60));
    assert!(activity.poll(&mut sleep).is_pending());
    assert_eq!(Arc::strong_count(&activity), 1);

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let destroyed = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(destroyed.clone());
    let party = Party::new("stranded");
    party.spawn(
        "sleeper",
        move || map(handle.sleep(Duration::from_secs(60)), move |()| drop(flag)),
        |()| {},
    );
    assert_eq!(party.participants(), 1);

    drop(party);
    assert!(destroyed.load(Ordering::SeqCst), "party torn down with its last handle");
}
