use cohort::activity::{Waker, with_current};
use cohort::party::Party;
use cohort::promise::{Poll, immediate};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use parking_lot::Mutex;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];
const WAKEUPS_PER_THREAD: u64 = 1_000;

/// Spawns a participant that never completes and counts its polls,
/// publishing a fresh non-owning waker on each one.
fn spawn_counter(party: &Party) -> (Arc<Mutex<Waker>>, Arc<AtomicU64>) {
    let waker = Arc::new(Mutex::new(Waker::unwakeable()));
    let polls = Arc::new(AtomicU64::new(0));

    let (slot, counter) = (waker.clone(), polls.clone());
    party.spawn(
        "counter",
        move || {
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
                *slot.lock() = with_current(|activity| activity.make_non_owning_waker());
                Poll::<()>::Pending
            }
        },
        |()| {},
    );

    (waker, polls)
}

fn bench_spawn(c: &mut Criterion) {
    let party = Party::new("bench-spawn");

    c.bench_function("spawn_ready_participant", |b| {
        b.iter(|| {
            party.spawn("ready", || immediate(black_box(1u64)), |value| {
                black_box(value);
            });
        });
    });
}

fn bench_wakeup(c: &mut Criterion) {
    let party = Party::new("bench-wakeup");
    let (waker, _polls) = spawn_counter(&party);

    c.bench_function("wakeup_repoll", |b| {
        b.iter(|| {
            let mut waker = waker.lock().clone();
            waker.wakeup();
        });
    });
}

fn bench_contended_wakeups(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_wakeups");

    for &threads in THREAD_COUNTS {
        group.throughput(Throughput::Elements(threads as u64 * WAKEUPS_PER_THREAD));

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let party = Party::new("bench-contended");
            let (waker, polls) = spawn_counter(&party);

            b.iter(|| {
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let waker = waker.clone();
                        thread::spawn(move || {
                            for _ in 0..WAKEUPS_PER_THREAD {
                                let mut waker = waker.lock().clone();
                                waker.wakeup();
                            }
                        })
                    })
                    .collect();

                for worker in workers {
                    let _ = worker.join();
                }
            });

            black_box(polls.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn, bench_wakeup, bench_contended_wakeups);
criterion_main!(benches);
