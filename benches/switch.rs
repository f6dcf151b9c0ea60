//! Round-trip latency of a single `yield_now` suspend/resume pair.
//!
//! Shaped after `fiber_switch` in the pack's stackful-fiber benchmark: one
//! resumable unit, a tight loop of suspend-then-resume, timed with
//! `Criterion::bench_function`.

use criterion::{criterion_group, criterion_main, Criterion};
use mnrt::Scheduler;

fn yield_round_trip(c: &mut Criterion) {
    let scheduler = Scheduler::new(1).unwrap();
    scheduler.start().unwrap();

    c.bench_function("yield_now round trip", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            let handle = scheduler.spawn(move || {
                for _ in 0..iters {
                    mnrt::yield_now();
                }
            });
            while !handle.is_finished() {
                std::thread::yield_now();
            }
            start.elapsed()
        });
    });

    scheduler.stop();
}

criterion_group!(benches, yield_round_trip);
criterion_main!(benches);
