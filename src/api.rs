//! Cooperative primitives: `spawn`, `yield_now`, `join`, `sleep`, `current`.
//!
//! Free functions operating on whatever scheduler owns the calling task,
//! resolved via the same thread-local lookup as `current()` itself — per
//! spec.md §4.6's contract that every cooperative primitive's first act is
//! reading the current task and current worker id from thread-local
//! storage. There is no free-standing `spawn` outside of a task: seed the
//! first tasks with [`crate::Scheduler::spawn`] on a handle you already
//! hold, then use this module's `spawn` for nested spawns from inside a
//! running task.

use std::time::Duration;

use crate::scheduler;
use crate::task::TaskHandle;

/// Spawn a new task on the same scheduler as the calling task.
///
/// # Panics
///
/// Panics (debug builds: via `debug_assert!`) if called outside any task —
/// per spec.md §7, this is a contract violation, not a recoverable error.
/// Callers outside of any task should use [`crate::Scheduler::spawn`] on an
/// explicit handle instead.
pub fn spawn(entry: impl FnOnce() + Send + 'static) -> TaskHandle {
    let task = scheduler::current_task();
    debug_assert!(
        task.is_some(),
        "mnrt::spawn called outside any task; use Scheduler::spawn instead"
    );
    let task = task.expect("mnrt::spawn called outside any task; use Scheduler::spawn instead");
    let sched = task
        .scheduler()
        .expect("scheduler dropped while one of its tasks was still running");
    sched.spawn(entry)
}

/// Voluntarily give up the CPU. No-op if called outside any task.
///
/// Per spec.md §4.6: the calling task is re-enqueued and a switch is
/// performed to the dispatch context; on resume it is RUNNING again, not
/// necessarily on the same worker it yielded from.
pub fn yield_now() {
    let Some(task) = scheduler::current_task() else {
        return;
    };
    let worker_id = scheduler::current_worker_id()
        .expect("current task set without a current worker id");
    let sched = task
        .scheduler()
        .expect("scheduler dropped while its task was still running");

    sched.yield_current(worker_id, &task);
}

/// Block until `target` has finished.
///
/// Returns immediately, with no context switch, if `target` is already
/// FINISHED. At most one task may be concurrently joined on a given target;
/// a second concurrent joiner is a contract violation (spec.md §4.6)
/// enforced with `debug_assert!` inside the scheduler.
///
/// # Panics
///
/// Panics (debug builds) if called outside any task.
pub fn join(target: &TaskHandle) {
    let task = scheduler::current_task();
    debug_assert!(task.is_some(), "join called outside any task");
    let Some(task) = task else {
        return;
    };
    let worker_id = scheduler::current_worker_id()
        .expect("current task set without a current worker id");
    let sched = task
        .scheduler()
        .expect("scheduler dropped while its task was still running");

    if sched.block_current_for_join(worker_id, &task, &target.task) {
        sched.switch_to_dispatch(worker_id, &task);
    }
}

/// Suspend the calling task for at least `duration`.
///
/// Called from outside any task, this delegates to a plain blocking
/// `std::thread::sleep` and returns. Called from within a task, it is a
/// normal suspension point: the task is marked BLOCKED, the wait itself
/// happens without holding the scheduler mutex, and on wake the task is
/// re-enqueued and switched back in — it does not resume running the
/// instant `duration` elapses, only after a subsequent re-dispatch (spec.md
/// §4.6: "no hard real-time bound").
pub fn sleep(duration: Duration) {
    let Some(task) = scheduler::current_task() else {
        std::thread::sleep(duration);
        return;
    };
    let worker_id = scheduler::current_worker_id()
        .expect("current task set without a current worker id");
    let sched = task
        .scheduler()
        .expect("scheduler dropped while its task was still running");

    sched.sleep_current(worker_id, &task, duration);
}

/// The task currently running on this OS thread, or `None` outside any task.
pub fn current() -> Option<TaskHandle> {
    scheduler::current_task().map(|task| TaskHandle { task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use std::sync::{Arc, Mutex};

    #[test]
    fn current_is_none_outside_any_task() {
        assert!(current().is_none());
    }

    #[test]
    fn yield_now_is_a_no_op_outside_any_task() {
        yield_now();
    }

    #[test]
    fn hello_join() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new(1).unwrap();

        let log_a = log.clone();
        let a = scheduler.spawn(move || {
            log_a.lock().unwrap().push(1);
        });

        let log_b = log.clone();
        scheduler.spawn(move || {
            join(&a);
            log_b.lock().unwrap().push(2);
        });

        scheduler.start().unwrap();
        // Give the single worker time to drain both tasks.
        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }
}
