//! Capability interface for asynchronous, dispatcher-originated notices.
//!
//! The REPL implements this trait; the dispatcher holds an
//! `Arc<dyn ClientEvents>` rather than a map of named callbacks, so adding a
//! new notice is a compiler-checked method addition instead of a new string
//! key nobody can statically verify is handled.

use crate::state::{Breakpoint, ThreadInfo};

pub trait ClientEvents: Send + Sync {
    /// A new thread appeared.
    fn on_thread_create(&self, _thread: &ThreadInfo) {}

    /// A thread exited. `name` is its last known display name, if any.
    fn on_thread_kill(&self, _id: &str, _name: Option<&str>) {}

    /// A thread suspended (breakpoint hit, step completed, or explicit
    /// pause).
    fn on_thread_suspend(&self, _thread: &ThreadInfo) {}

    /// A breakpoint was added, whether by the user or by `start`'s
    /// temporary entry-line placement.
    fn on_breakpoint_create(&self, _bp: &Breakpoint) {}

    /// A breakpoint was removed, whether by the user or by the dispatcher's
    /// own temporary-breakpoint cleanup.
    fn on_breakpoint_remove(&self, _bp: &Breakpoint) {}

    /// The debuggee process exited (the socket was closed by the peer).
    fn on_debuggee_exit(&self) {}
}

/// A `ClientEvents` that does nothing, for tests and headless use.
pub struct NullEvents;

impl ClientEvents for NullEvents {}
