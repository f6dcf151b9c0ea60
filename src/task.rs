//! Task lifecycle: identity, state, and the entry trampoline.
//!
//! Generalizes the teacher's `src/task.rs` (`TaskId`, `TaskState`, a
//! `TaskList`-owned `Task` with an atomically-assigned id) from a
//! single-core, caller-owned value into an `Arc`-shared type safe to hand
//! across worker threads. See `DESIGN.md` for why `New` was added ahead of
//! `Ready` and why there is no explicit `destroy()`.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::arch::{self, TaskContext};
use crate::scheduler::{self, Scheduler};
use crate::stack::Stack;

/// Unique, monotonically increasing task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A task's position in its lifecycle, per spec.md §3.
///
/// `New -> Ready -> Running -> {Blocked -> Ready}* -> Finished`. Invariants
/// I1-I3 (ready-queue membership, at-most-one-worker's-current, a finished
/// task is in neither) are maintained by [`crate::scheduler`] and
/// [`crate::api`], the only code permitted to call [`Task::set_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Ready,
    Running,
    Blocked,
    Finished,
}

type Entry = Box<dyn FnOnce() + Send + 'static>;

/// One cooperatively-scheduled unit of execution.
///
/// `state`, `joiner` and `entry` are documented by spec.md §5 as protected
/// by the scheduler's mutex; they are stored in bare `Cell`/`RefCell`s
/// rather than behind a lock of their own, and `Task` is manually asserted
/// `Send + Sync` on the strength of that external invariant. `context` is
/// separately guaranteed single-writer by construction: only the worker
/// currently running this task (or initializing it, before it has ever
/// run) ever touches it.
pub struct Task {
    id: TaskId,
    scheduler: Weak<Scheduler>,
    state: Cell<TaskState>,
    /// The task blocked in `join` awaiting this one, if any.
    joiner: RefCell<Option<Arc<Task>>>,
    /// Set by `sleep_current` before switching away, consumed by the
    /// worker loop once this task's context has actually been saved — see
    /// `Scheduler::finish_suspend`.
    sleep_until: Cell<Option<Instant>>,
    entry: RefCell<Option<Entry>>,
    context: UnsafeCell<TaskContext>,
    // Kept alive for as long as the task exists; never read again after
    // `init_stack` except through the raw stack pointer embedded in `context`.
    _stack: Stack,
}

// Safety: see the struct doc above — every field is protected by either the
// owning scheduler's mutex or the single-writer-at-a-time context switch
// invariant.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    /// Create a new task in state `New`, wired to begin execution in
    /// [`trampoline`] the first time it is resumed.
    pub(crate) fn new(
        scheduler: &Arc<Scheduler>,
        id: TaskId,
        entry: impl FnOnce() + Send + 'static,
        stack_size: usize,
    ) -> Arc<Task> {
        let stack = Stack::new(stack_size);
        let context = arch::init_stack(stack.top(), trampoline as usize);

        Arc::new(Task {
            id,
            scheduler: Arc::downgrade(scheduler),
            state: Cell::new(TaskState::New),
            joiner: RefCell::new(None),
            sleep_until: Cell::new(None),
            entry: RefCell::new(Some(Box::new(entry))),
            context: UnsafeCell::new(context),
            _stack: stack,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.set(state);
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler.upgrade()
    }

    pub(crate) fn joiner_is_some(&self) -> bool {
        self.joiner.borrow().is_some()
    }

    pub(crate) fn set_joiner(&self, joiner: Arc<Task>) {
        *self.joiner.borrow_mut() = Some(joiner);
    }

    pub(crate) fn take_joiner(&self) -> Option<Arc<Task>> {
        self.joiner.borrow_mut().take()
    }

    pub(crate) fn set_sleep_deadline(&self, deadline: Instant) {
        self.sleep_until.set(Some(deadline));
    }

    pub(crate) fn take_sleep_deadline(&self) -> Option<Instant> {
        self.sleep_until.take()
    }

    fn take_entry(&self) -> Entry {
        self.entry
            .borrow_mut()
            .take()
            .expect("task entry consumed more than once")
    }

    /// Raw pointer to this task's saved context.
    ///
    /// # Safety
    ///
    /// Caller must uphold the single-writer-at-a-time invariant documented
    /// on the struct.
    pub(crate) fn context_ptr(&self) -> *mut TaskContext {
        self.context.get()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// A clonable, non-owning reference to a spawned task, returned by
/// [`crate::spawn`] and accepted by [`crate::join`].
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) task: Arc<Task>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn is_finished(&self) -> bool {
        self.task.state() == TaskState::Finished
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task.id).finish()
    }
}

/// The entry trampoline every freshly created task's first `ret` lands on.
///
/// Implements spec.md §4.3 step by step: fetch the current task, run its
/// entry closure, mark it `Finished` under the scheduler lock, wake its
/// joiner if any, then switch away one final time without re-enqueuing
/// this (now-finished) task.
extern "C" fn trampoline() -> ! {
    let task = scheduler::current_task().expect("trampoline entered without a current task");
    let worker_id =
        scheduler::current_worker_id().expect("trampoline entered without a worker id");

    log::trace!("{} starting", task.id());
    (task.take_entry())();
    log::trace!("{} entry returned, finishing", task.id());

    let sched = task
        .scheduler()
        .expect("scheduler dropped while one of its tasks was still running");
    sched.finish_current(worker_id, &task);

    // `finish_current` switches away to the worker's dispatch context and
    // never returns: this task is FINISHED and will never be resumed again.
    unreachable!("a FINISHED task was resumed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_displays_with_prefix() {
        assert_eq!(TaskId(7).to_string(), "task-7");
    }

    #[test]
    fn fresh_task_state_is_new() {
        let scheduler = Scheduler::new(1).unwrap();
        let task = Task::new(&scheduler, TaskId(1), || {}, crate::stack::DEFAULT_STACK_SIZE);
        assert_eq!(task.state(), TaskState::New);
        assert!(!task.joiner_is_some());
    }
}
