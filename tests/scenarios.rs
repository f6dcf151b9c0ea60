//! End-to-end scenarios exercising the public API against a real scheduler
//! and real worker OS threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mnrt::Scheduler;

/// Every scenario below runs with logging available: pass `RUST_LOG=trace`
/// to see every ready-queue push/pop and state transition. `try_init` since
/// every `#[test]` fn in this binary calls it and only the first may win.
fn init_logging() {
    let _ = env_logger::try_init();
}

fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

#[test]
fn hello_join() {
    init_logging();
    let log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::new(1).unwrap();

    let log_a = log.clone();
    let a = scheduler.spawn(move || {
        log_a.lock().unwrap().push(1);
    });

    let log_b = log.clone();
    let b = scheduler.spawn(move || {
        mnrt::join(&a);
        log_b.lock().unwrap().push(2);
    });

    scheduler.start().unwrap();
    assert!(wait_until(|| b.is_finished(), Duration::from_secs(2)));
    scheduler.stop();

    assert_eq!(*log.lock().unwrap(), vec![1, 2]);
}

#[test]
fn round_robin_single_worker() {
    init_logging();
    let log = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Scheduler::new(1).unwrap();

    let mut handles = Vec::new();
    for id in 1..=3 {
        let log = log.clone();
        handles.push(scheduler.spawn(move || {
            for _ in 0..3 {
                log.lock().unwrap().push(id);
                mnrt::yield_now();
            }
        }));
    }

    scheduler.start().unwrap();
    assert!(wait_until(
        || handles.iter().all(|h| h.is_finished()),
        Duration::from_secs(2)
    ));
    scheduler.stop();

    assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
}

#[test]
fn multi_worker_parallelism() {
    init_logging();
    const TASKS: usize = 100;
    const INCREMENTS: usize = 100;

    let counter = Arc::new(Mutex::new(0_u64));
    let scheduler = Scheduler::new(4).unwrap();

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let counter = counter.clone();
        handles.push(scheduler.spawn(move || {
            for _ in 0..INCREMENTS {
                *counter.lock().unwrap() += 1;
                mnrt::yield_now();
            }
        }));
    }

    scheduler.start().unwrap();
    assert!(wait_until(
        || handles.iter().all(|h| h.is_finished()),
        Duration::from_secs(5)
    ));
    scheduler.stop();

    assert_eq!(*counter.lock().unwrap(), (TASKS * INCREMENTS) as u64);
}

#[test]
fn sleep_wakes_up_after_the_requested_duration() {
    init_logging();
    let recorded = Arc::new(Mutex::new(None));
    let scheduler = Scheduler::new(1).unwrap();

    let recorded_in_task = recorded.clone();
    let a = scheduler.spawn(move || {
        mnrt::sleep(Duration::from_millis(50));
        *recorded_in_task.lock().unwrap() = Some(Instant::now());
    });

    let t1 = Instant::now();
    scheduler.start().unwrap();
    assert!(wait_until(|| a.is_finished(), Duration::from_secs(2)));
    scheduler.stop();

    let t2 = recorded.lock().unwrap().expect("task recorded a wake time");
    assert!(t2.duration_since(t1) >= Duration::from_millis(50));
}

#[test]
fn stop_is_idempotent() {
    init_logging();
    let scheduler = Scheduler::new(4).unwrap();
    scheduler.stop();
    scheduler.stop();
    drop(scheduler);
}

#[test]
fn large_fan_out() {
    init_logging();
    const TASKS: usize = 10_000;

    let finished = Arc::new(AtomicUsize::new(0));
    let scheduler = Scheduler::new(2).unwrap();

    for _ in 0..TASKS {
        let finished = finished.clone();
        scheduler.spawn(move || {
            mnrt::yield_now();
            finished.fetch_add(1, Ordering::Relaxed);
        });
    }

    scheduler.start().unwrap();
    assert!(wait_until(
        || finished.load(Ordering::Relaxed) == TASKS,
        Duration::from_secs(30)
    ));
    scheduler.stop();
}
