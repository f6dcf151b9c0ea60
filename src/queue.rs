//! FIFO ready queue.
//!
//! Generalizes the teacher's `Scheduler.ready_queue: VecDeque<TaskId>` (an
//! index into a separately-owned `TaskList`) into a queue that holds
//! `Arc<Task>` directly, removing the lookup indirection. Per spec.md
//! §4.1's design note, the queue's own mutex is only useful to a standalone
//! caller: inside [`crate::scheduler`] every push/pop happens while the
//! scheduler's own mutex is already held, via the `_locked` free functions
//! below operating on the bare `VecDeque` the scheduler's `Inner` owns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::task::Task;

/// Push `task` onto the tail of an already-locked queue.
///
/// Caller must ensure (per invariant I1) that `task` is not already present.
pub(crate) fn push_locked(queue: &mut VecDeque<Arc<Task>>, task: Arc<Task>) {
    log::trace!("{} pushed to ready queue", task.id());
    queue.push_back(task);
}

/// Pop the head of an already-locked queue, if any.
pub(crate) fn pop_locked(queue: &mut VecDeque<Arc<Task>>) -> Option<Arc<Task>> {
    let task = queue.pop_front();
    if let Some(task) = &task {
        log::trace!("{} popped from ready queue", task.id());
    }
    task
}

/// A standalone, self-locking FIFO of ready tasks.
///
/// Not used by [`crate::scheduler::Scheduler`] itself (which collapses this
/// queue's lock into its own mutex, as spec.md §4.1 explicitly permits), but
/// kept as a freestanding type for callers who want the ready-queue data
/// structure without the rest of the scheduler.
pub struct ReadyQueue {
    inner: Mutex<VecDeque<Arc<Task>>>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, task: Arc<Task>) {
        push_locked(&mut self.inner.lock().unwrap(), task);
    }

    pub fn pop(&self) -> Option<Arc<Task>> {
        pop_locked(&mut self.inner.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
