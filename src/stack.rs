//! Task stack allocation.
//!
//! Mirrors the teacher's `Task::new`, which backs each task with a
//! `Box<[u8; TASK_STACK_SIZE]>` and computes the stack-top address as
//! `base + size`; here the backing allocation is a plain `Vec<u8>` (as used
//! by the pack's `stackfull-coroutine` reference) since the size is a
//! runtime [`crate::Config`] value rather than a compile-time constant.

/// Default stack size for a spawned task, matching spec.md §3.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// An owned task stack.
///
/// The backing buffer's heap address is stable for the lifetime of the
/// `Stack` regardless of where the `Stack` value itself is moved to (e.g.
/// into an `Arc<Task>`) — only resizing the `Vec` would invalidate pointers
/// derived from [`Stack::top`], and nothing here ever resizes it.
pub(crate) struct Stack {
    buf: Vec<u8>,
}

impl Stack {
    /// Allocate a zeroed stack of `size` bytes.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
        }
    }

    /// Address of the highest 16-byte-aligned location within the stack.
    ///
    /// Stacks grow down on every architecture this crate supports, so this
    /// is the address a freshly initialized context's stack pointer starts
    /// from.
    pub(crate) fn top(&self) -> usize {
        let end = self.buf.as_ptr() as usize + self.buf.len();
        end & !0xf
    }
}
