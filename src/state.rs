//! Debuggee state model (spec component E).
//!
//! Owns the thread table, breakpoint table, active-thread selection, and
//! per-thread frame stacks. The receive task is the sole writer of
//! inbound-derived state; user commands are the sole writer of
//! outbound-derived state. Both serialize through these per-table locks.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::error::Error;
use crate::protocol::{Cmd, INTERNAL_THREAD_NAMES};

pub const MAX_BREAKPOINTS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub filename: String,
    pub line: Option<u32>,
    pub scope: Option<String>,
    pub condition: Option<String>,
    pub expression: Option<String>,
    pub enabled: bool,
    pub temporary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub name: String,
    pub state: ThreadState,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    /// Topmost-first. Non-empty only while `state == Suspended`.
    pub frames: Vec<String>,
}

impl ThreadInfo {
    fn new(id: String, name: String) -> Self {
        ThreadInfo {
            id,
            name,
            state: ThreadState::Running,
            file: None,
            line: None,
            function: None,
            frames: Vec::new(),
        }
    }

    fn is_internal(&self) -> bool {
        INTERNAL_THREAD_NAMES.contains(&self.name.as_str())
    }
}

/// The shared, lock-protected debuggee model.
///
/// Breakpoints and threads are behind independent locks, per spec §5: each
/// table has a dedicated lock, held only across the mutation itself.
pub struct StateModel {
    breakpoints: Mutex<IndexMap<u32, Option<Breakpoint>>>,
    threads: Mutex<IndexMap<String, ThreadInfo>>,
    active_thread: Mutex<Option<String>>,
    pid: Mutex<Option<i32>>,
}

impl StateModel {
    pub fn new() -> Self {
        StateModel {
            breakpoints: Mutex::new(IndexMap::new()),
            threads: Mutex::new(IndexMap::new()),
            active_thread: Mutex::new(None),
            pid: Mutex::new(None),
        }
    }

    /// Record the debuggee's process id, learned from the main thread's id
    /// on the first successful thread listing after startup. A no-op once
    /// set; the pid does not change for the lifetime of a connection.
    pub fn set_pid_if_unset(&self, pid: i32) {
        let mut slot = self.pid.lock().unwrap();
        if slot.is_none() {
            *slot = Some(pid);
        }
    }

    pub fn pid(&self) -> Option<i32> {
        *self.pid.lock().unwrap()
    }

    // -- breakpoints ---------------------------------------------------

    /// Reserve the lowest free slot in `[0, MAX_BREAKPOINTS)` with a
    /// placeholder, so concurrent allocations never collide while the wire
    /// send for this one is still in flight.
    pub fn reserve_breakpoint_slot(&self) -> Result<u32, Error> {
        let mut table = self.breakpoints.lock().unwrap();
        for id in 0..MAX_BREAKPOINTS {
            if !table.contains_key(&id) {
                table.insert(id, None);
                return Ok(id);
            }
        }
        Err(Error::CapacityExceeded)
    }

    /// Fill in a slot reserved by [`reserve_breakpoint_slot`].
    pub fn fill_breakpoint(&self, bp: Breakpoint) {
        self.breakpoints.lock().unwrap().insert(bp.id, Some(bp));
    }

    /// Unconditionally erase a breakpoint, returning the removed record.
    pub fn remove_breakpoint(&self, id: u32) -> Result<Breakpoint, Error> {
        match self.breakpoints.lock().unwrap().shift_remove(&id) {
            Some(Some(bp)) => Ok(bp),
            _ => Err(Error::UnknownBreakpoint(id)),
        }
    }

    pub fn breakpoint(&self, id: u32) -> Option<Breakpoint> {
        self.breakpoints.lock().unwrap().get(&id).cloned().flatten()
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints
            .lock()
            .unwrap()
            .values()
            .filter_map(Clone::clone)
            .collect()
    }

    /// Find an enabled, temporary breakpoint matching `(filename, line)`, as
    /// observed at a `SET_BREAK` suspension. Used by the dispatcher to clean
    /// up one-shot breakpoints (e.g. the one `start` plants).
    pub fn find_temporary_match(&self, filename: &str, line: u32) -> Option<u32> {
        self.breakpoints
            .lock()
            .unwrap()
            .values()
            .filter_map(|slot| slot.as_ref())
            .find(|bp| {
                bp.enabled && bp.temporary && bp.filename == filename && bp.line == Some(line)
            })
            .map(|bp| bp.id)
    }

    // -- threads ---------------------------------------------------------

    /// Insert a newly created thread. If no thread is currently active,
    /// this one is adopted as active.
    pub fn thread_create(&self, id: &str, name: &str) {
        let mut threads = self.threads.lock().unwrap();
        threads
            .entry(id.to_string())
            .or_insert_with(|| ThreadInfo::new(id.to_string(), name.to_string()));
        let mut active = self.active_thread.lock().unwrap();
        if active.is_none() {
            *active = Some(id.to_string());
        }
    }

    /// Remove a thread. Returns its display name if it was known. If it was
    /// the active thread, picks another known thread (any) or clears the
    /// selection.
    pub fn thread_kill(&self, id: &str) -> Option<String> {
        let mut threads = self.threads.lock().unwrap();
        let removed = threads.shift_remove(id)?;
        let mut active = self.active_thread.lock().unwrap();
        if active.as_deref() == Some(id) {
            *active = threads.keys().next().cloned();
        }
        Some(removed.name)
    }

    /// Apply a `THREAD_SUSPEND` event: mark the thread suspended at the
    /// given location, replace its frame stack, and make it active.
    pub fn thread_suspend(
        &self,
        id: &str,
        file: String,
        line: u32,
        function: String,
        frames: Vec<String>,
    ) {
        let mut threads = self.threads.lock().unwrap();
        let entry = threads
            .entry(id.to_string())
            .or_insert_with(|| ThreadInfo::new(id.to_string(), String::new()));
        entry.state = ThreadState::Suspended;
        entry.file = Some(file);
        entry.line = Some(line);
        entry.function = Some(function);
        entry.frames = frames;
        drop(threads);
        *self.active_thread.lock().unwrap() = Some(id.to_string());
    }

    /// Mark a thread running again and clear its frame stack, as happens
    /// after any step/continue command is sent.
    pub fn thread_set_running(&self, id: &str) {
        let mut threads = self.threads.lock().unwrap();
        if let Some(t) = threads.get_mut(id) {
            t.state = ThreadState::Running;
            t.frames.clear();
        }
    }

    /// Refresh (or insert) a thread's display name, as returned by
    /// `LIST_THREADS`. Internal threads stay in the table but are filtered
    /// from [`Self::visible_threads`].
    pub fn refresh_thread_name(&self, id: &str, name: &str) {
        let mut threads = self.threads.lock().unwrap();
        threads
            .entry(id.to_string())
            .or_insert_with(|| ThreadInfo::new(id.to_string(), name.to_string()))
            .name = name.to_string();
    }

    pub fn active_thread_id(&self) -> Option<String> {
        self.active_thread.lock().unwrap().clone()
    }

    pub fn set_active_thread(&self, id: String) {
        *self.active_thread.lock().unwrap() = Some(id);
    }

    pub fn thread(&self, id: &str) -> Option<ThreadInfo> {
        self.threads.lock().unwrap().get(id).cloned()
    }

    /// All threads in listing order, internal housekeeping threads included,
    /// for protocol-level consumers.
    pub fn all_threads(&self) -> Vec<ThreadInfo> {
        self.threads.lock().unwrap().values().cloned().collect()
    }

    /// User-visible thread listing, internal threads filtered out, in
    /// display order (used for `thread <index>` ordinal resolution).
    pub fn visible_threads(&self) -> Vec<ThreadInfo> {
        self.threads
            .lock()
            .unwrap()
            .values()
            .filter(|t| !t.is_internal())
            .cloned()
            .collect()
    }

    /// Resolve a thread for a command accepting an optional thread name: if
    /// no name is given and there is no active thread, fail. Otherwise look
    /// the name up among known threads; if it does not match any, fall back
    /// to the active thread.
    pub fn resolve_thread(&self, name: Option<&str>) -> Result<String, Error> {
        let active = self.active_thread_id();
        if name.is_none() && active.is_none() {
            return Err(Error::NoThreadSelected);
        }
        if let Some(n) = name {
            let threads = self.threads.lock().unwrap();
            if let Some(t) = threads.values().find(|t| t.name == n) {
                return Ok(t.id.clone());
            }
        }
        active.ok_or(Error::NoThreadSelected)
    }
}

impl Default for StateModel {
    fn default() -> Self {
        Self::new()
    }
}

/// The command code carried as `stop_reason` when a suspension was caused
/// by hitting a breakpoint, as opposed to a step completing.
pub const STOP_REASON_SET_BREAK: Cmd = crate::protocol::CMD_SET_BREAK;
