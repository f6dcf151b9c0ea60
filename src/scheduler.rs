//! Ready-queue and worker-loop coordination.
//!
//! Generalizes the teacher's `Scheduler` (`tasks: TaskList`, `current_task:
//! Option<TaskId>`, `ready_queue: VecDeque<TaskId>`, all behind a single
//! `spin::Mutex<Option<Scheduler>>` driven by disabling interrupts) into `N`
//! `std::thread` workers coordinated by `std::sync::{Mutex, Condvar}` —
//! "hold the scheduler mutex" is the hosted analog of "disable interrupts
//! around the critical section". Resolves the open issue in spec.md §9: the
//! scheduler reaches each worker loop through its thread spawn closure, not
//! through a local that is never assigned.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::arch::{self, TaskContext};
use crate::error::{Error, MAX_WORKERS};
use crate::queue;
use crate::stack::DEFAULT_STACK_SIZE;
use crate::task::{Task, TaskHandle, TaskId, TaskState};

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
    static CURRENT_WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// The task currently executing on this OS thread, or `None` outside any task.
///
/// The hosted equivalent of spec.md §4.2's `self()`.
pub(crate) fn current_task() -> Option<Arc<Task>> {
    CURRENT_TASK.with(|cell| cell.borrow().clone())
}

pub(crate) fn set_current_task(task: Option<Arc<Task>>) {
    CURRENT_TASK.with(|cell| *cell.borrow_mut() = task);
}

/// The stable id of the worker OS thread this code is running on, or `None`
/// if this is not a worker thread.
pub(crate) fn current_worker_id() -> Option<usize> {
    CURRENT_WORKER_ID.with(Cell::get)
}

fn set_current_worker_id(id: usize) {
    CURRENT_WORKER_ID.with(|cell| cell.set(Some(id)));
}

/// Tunable knobs for a [`Scheduler`], per spec.md §4.5/§3.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub num_workers: usize,
    /// Stack size given to every task spawned on this scheduler.
    ///
    /// No guard page is installed (secure isolation between tasks is an
    /// explicit non-goal): a task that overruns this much stack invokes
    /// undefined behavior rather than a clean fault.
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: 1,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// A worker's saved dispatch context, boxed so its address is stable
/// regardless of where the surrounding `Vec` gets reallocated to.
struct DispatchSlot(UnsafeCell<TaskContext>);

// Safety: a dispatch slot is only ever touched by the single worker thread
// it belongs to, during that worker's own context switches.
unsafe impl Sync for DispatchSlot {}

impl DispatchSlot {
    fn new() -> Self {
        Self(UnsafeCell::new(TaskContext::default()))
    }

    fn ptr(&self) -> *mut TaskContext {
        self.0.get()
    }
}

struct Inner {
    ready_queue: VecDeque<Arc<Task>>,
    running: bool,
    /// `current[worker_id]` is the task that worker is currently running.
    current: Vec<Option<Arc<Task>>>,
}

/// Owns the ready queue, the worker pool, and the per-worker dispatch
/// contexts that tasks switch back into when they suspend.
///
/// Corresponds to spec.md §3's "Scheduler" data model and §4.5's
/// `create`/`start`/`stop`/`add_task` operations.
pub struct Scheduler {
    inner: Mutex<Inner>,
    condvar: Condvar,
    dispatch: Vec<DispatchSlot>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
    stack_size: usize,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Convenience constructor: `num_workers` workers, default stack size.
    pub fn new(num_workers: usize) -> Result<Arc<Scheduler>, Error> {
        Self::with_config(Config {
            num_workers,
            ..Config::default()
        })
    }

    /// Validates `1 <= num_workers <= MAX_WORKERS` per spec.md §4.5.
    pub fn with_config(config: Config) -> Result<Arc<Scheduler>, Error> {
        if config.num_workers == 0 || config.num_workers > MAX_WORKERS {
            return Err(Error::InvalidWorkerCount {
                requested: config.num_workers,
                max: MAX_WORKERS,
            });
        }

        let dispatch = (0..config.num_workers).map(|_| DispatchSlot::new()).collect();
        let inner = Inner {
            ready_queue: VecDeque::new(),
            running: false,
            current: vec![None; config.num_workers],
        };

        Ok(Arc::new(Scheduler {
            inner: Mutex::new(inner),
            condvar: Condvar::new(),
            dispatch,
            workers: Mutex::new(Vec::new()),
            num_workers: config.num_workers,
            stack_size: config.stack_size,
            next_id: AtomicU64::new(1),
        }))
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Start, idempotent while already running — per spec.md §4.5.
    pub fn start(self: &Arc<Self>) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.running {
                return Ok(());
            }
            inner.running = true;
        }

        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.num_workers {
            let scheduler = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("mnrt-worker-{worker_id}"))
                .spawn(move || worker_loop(scheduler, worker_id))
                .map_err(Error::ThreadSpawn)?;
            workers.push(handle);
        }

        log::debug!("scheduler started with {} worker(s)", self.num_workers);
        Ok(())
    }

    /// Stop, idempotent while not running — per spec.md §4.5. Broadcasts
    /// (rather than the single-signal discipline every ready-queue push
    /// uses) so every waiting worker wakes and observes `running = false`.
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.running {
                return;
            }
            inner.running = false;
        }
        self.condvar.notify_all();

        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        log::debug!("scheduler stopped");
    }

    /// Create a new task and transition it NEW -> READY, per spec.md §4.5's
    /// `add_task`. Safe to call from outside any task.
    pub fn spawn(self: &Arc<Self>, entry: impl FnOnce() + Send + 'static) -> TaskHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = Task::new(self, id, entry, self.stack_size);
        log::debug!("{} created", task.id());

        {
            let mut inner = self.inner.lock().unwrap();
            task.set_state(TaskState::Ready);
            queue::push_locked(&mut inner.ready_queue, task.clone());
        }
        self.condvar.notify_one();

        TaskHandle { task }
    }

    fn dispatch_context_ptr(&self, worker_id: usize) -> *mut TaskContext {
        self.dispatch[worker_id].ptr()
    }

    /// Switch execution from `task` back to the dispatch context of the
    /// worker currently running it, per spec.md §4.6. The caller must have
    /// already released the scheduler mutex.
    pub(crate) fn switch_to_dispatch(&self, worker_id: usize, task: &Task) {
        let dispatch_ctx = self.dispatch_context_ptr(worker_id);
        // Safety: `task` is RUNNING on exactly this worker (I2), so its
        // context is not touched by anyone else; `dispatch_ctx` belongs
        // exclusively to this worker.
        unsafe {
            arch::switch_context(task.context_ptr(), dispatch_ctx as *const TaskContext);
        }
    }

    /// `yield`: mark the current task ready and switch away. Per spec.md
    /// §4.6, called only from within a task.
    ///
    /// The task is deliberately *not* pushed onto the ready queue here: that
    /// would make it poppable by another worker before `switch_to_dispatch`
    /// has actually saved its context, racing that save against whichever
    /// worker next resumes it. The re-enqueue happens from
    /// [`Self::finish_suspend`], run by the dispatching worker only after
    /// the switch away from this task has completed.
    pub(crate) fn yield_current(&self, worker_id: usize, task: &Arc<Task>) {
        {
            let mut inner = self.inner.lock().unwrap();
            task.set_state(TaskState::Ready);
            inner.current[worker_id] = None;
        }
        self.switch_to_dispatch(worker_id, task);
    }

    /// `join`: block the current task on `target` unless `target` is
    /// already FINISHED. Returns `false` (no switch performed, caller
    /// should return immediately) in that case, `true` if the caller must
    /// now switch to the dispatch context.
    pub(crate) fn block_current_for_join(
        &self,
        worker_id: usize,
        task: &Arc<Task>,
        target: &Arc<Task>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if target.state() == TaskState::Finished {
            return false;
        }
        debug_assert!(
            !target.joiner_is_some(),
            "join: {} already has a joiner ({})",
            target.id(),
            task.id()
        );
        task.set_state(TaskState::Blocked);
        target.set_joiner(task.clone());
        inner.current[worker_id] = None;
        true
    }

    /// `sleep`: block the current task until `duration` has elapsed, per
    /// spec.md §4.6's corrected contract. Only the state transition and the
    /// deadline bookkeeping happen here, on the task's own stack; the wait
    /// itself is performed by [`Self::finish_suspend`] after this task has
    /// switched away and its context has been safely saved, so that no
    /// other worker can observe this task as runnable (and race the
    /// context save) while it is still on its own stack. The owning worker
    /// remains responsible for the whole wait throughout, exactly as
    /// before — it has just moved to the other side of the switch.
    pub(crate) fn sleep_current(&self, worker_id: usize, task: &Arc<Task>, duration: Duration) {
        {
            let mut inner = self.inner.lock().unwrap();
            task.set_state(TaskState::Blocked);
            inner.current[worker_id] = None;
        }
        task.set_sleep_deadline(Instant::now() + duration);
        self.switch_to_dispatch(worker_id, task);
    }

    /// Wait out a sleeping task's remaining deadline and requeue it. Called
    /// only from [`Self::finish_suspend`], i.e. only once `task`'s context
    /// has already been saved by the switch that suspended it.
    fn wait_out_sleep(&self, task: &Arc<Task>, deadline: Instant) {
        let mut guard = self.inner.lock().unwrap();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (new_guard, timeout) = self.condvar.wait_timeout(guard, deadline - now).unwrap();
            guard = new_guard;
            if timeout.timed_out() {
                break;
            }
            // Spurious or unrelated wake-up: loop back and re-check the deadline.
        }

        task.set_state(TaskState::Ready);
        queue::push_locked(&mut guard.ready_queue, task.clone());
        drop(guard);
        self.condvar.notify_one();
    }

    /// Called by the entry trampoline once a task's entry function has
    /// returned. Marks the task FINISHED, wakes its joiner if any, and
    /// switches away without re-enqueuing — per spec.md §4.3 steps 3-7.
    pub(crate) fn finish_current(&self, worker_id: usize, task: &Arc<Task>) {
        {
            let mut inner = self.inner.lock().unwrap();
            task.set_state(TaskState::Finished);
            if let Some(joiner) = task.take_joiner() {
                joiner.set_state(TaskState::Ready);
                queue::push_locked(&mut inner.ready_queue, joiner);
            }
            inner.current[worker_id] = None;
        }
        self.condvar.notify_one();
        log::trace!("{} finished", task.id());
        self.switch_to_dispatch(worker_id, task);
    }

    /// Run by the dispatching worker immediately after a task switches back
    /// to the dispatch context, i.e. only once that task's `TaskContext` has
    /// actually been saved by the switch. This is the single place that may
    /// make a just-suspended task poppable by another worker again — doing
    /// so any earlier (while the task is still the one executing, before
    /// its context is saved) would let another worker race the save with a
    /// resume of a stale or half-written context.
    fn finish_suspend(&self, worker_id: usize, task: &Arc<Task>) {
        match task.state() {
            TaskState::Ready => {
                // Plain `yield`: now safe to requeue.
                {
                    let mut inner = self.inner.lock().unwrap();
                    queue::push_locked(&mut inner.ready_queue, task.clone());
                }
                self.condvar.notify_one();
            }
            TaskState::Blocked => {
                if let Some(deadline) = task.take_sleep_deadline() {
                    self.wait_out_sleep(task, deadline);
                }
                // Otherwise blocked on `join`: the target's `finish_current`
                // will requeue it once the target finishes.
            }
            TaskState::Finished => {
                // `finish_current` already handled the joiner wake-up;
                // a finished task itself is never requeued (I3).
            }
            other @ (TaskState::New | TaskState::Running) => {
                debug_assert!(
                    false,
                    "worker {worker_id} resumed dispatch with {} unexpectedly in state {other:?}",
                    task.id()
                );
            }
        }
    }

    fn next_ready_task(&self, worker_id: usize) -> Option<Arc<Task>> {
        let mut inner: MutexGuard<'_, Inner> = self.inner.lock().unwrap();
        loop {
            if !inner.running {
                return None;
            }
            if let Some(task) = queue::pop_locked(&mut inner.ready_queue) {
                task.set_state(TaskState::Running);
                inner.current[worker_id] = Some(task.clone());
                return Some(task);
            }
            inner = self.condvar.wait(inner).unwrap();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Spec.md §4.5: `destroy` implies a `stop`. `Mutex`/`Condvar`/the
        // ready queue release themselves when this struct's fields drop;
        // the only extra step `destroy` needs is making sure every worker
        // has exited first.
        self.stop();
    }
}

/// Per spec.md §4.4: record the worker's stable id, then repeatedly pop a
/// ready task, switch into it, and resume the loop when it suspends.
fn worker_loop(scheduler: Arc<Scheduler>, worker_id: usize) {
    set_current_worker_id(worker_id);
    log::debug!("worker {worker_id} starting");

    while let Some(task) = scheduler.next_ready_task(worker_id) {
        log::trace!("worker {worker_id} dispatching {}", task.id());
        set_current_task(Some(task.clone()));

        let task_ctx = task.context_ptr();
        let dispatch_ctx = scheduler.dispatch_context_ptr(worker_id);
        // Safety: this worker owns `dispatch_ctx` exclusively, and `task`
        // was just transitioned to RUNNING on this worker and nowhere else.
        unsafe {
            arch::switch_context(dispatch_ctx, task_ctx as *const TaskContext);
        }

        set_current_task(None);
        // `task` has just switched back to us: its context is now fully
        // saved (or it has finished and will never be resumed), so this is
        // the first safe point to make it runnable again.
        scheduler.finish_suspend(worker_id, &task);
    }

    log::debug!("worker {worker_id} stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        assert!(matches!(
            Scheduler::new(0),
            Err(Error::InvalidWorkerCount { requested: 0, .. })
        ));
    }

    #[test]
    fn rejects_too_many_workers() {
        assert!(Scheduler::new(MAX_WORKERS + 1).is_err());
        assert!(Scheduler::new(MAX_WORKERS).is_ok());
    }

    #[test]
    fn start_is_idempotent() {
        let scheduler = Scheduler::new(2).unwrap();
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        scheduler.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let scheduler = Scheduler::new(4).unwrap();
        scheduler.stop();
        scheduler.stop();
    }
}
