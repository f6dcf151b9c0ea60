//! Error types for the synchronous failure modes of [`crate::Scheduler`].
//!
//! Contract violations (joining a task with an existing joiner, using a
//! task after it has finished, calling a cooperative primitive outside of
//! any task) are programming bugs, not [`Error`] variants — they are
//! enforced with `debug_assert!` at the call site instead. See spec.md §7's
//! error taxonomy for the distinction this type follows.

use std::io;

/// Largest worker count [`crate::Scheduler::with_config`] will accept.
pub const MAX_WORKERS: usize = 64;

/// Failure modes reported synchronously from the scheduler's public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `num_workers` was zero or exceeded [`MAX_WORKERS`].
    #[error("invalid worker count {requested} (must be between 1 and {max})")]
    InvalidWorkerCount { requested: usize, max: usize },

    /// A task's stack could not be allocated.
    ///
    /// Unreachable with the current `Vec`-backed stack allocator (which
    /// aborts the process on OOM rather than returning), but kept so this
    /// type does not need to change shape if a fallible allocation
    /// strategy is introduced later.
    #[error("failed to allocate a {size}-byte task stack")]
    StackAllocation { size: usize },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] io::Error),
}
