//! Fixed wire-protocol constants: command codes and breakpoint addressing modes.
//!
//! The peer daemon defines these; this client only consumes the subset listed
//! in the verb table below. Values are drawn from the pydevd-family command
//! set (see examples/original_source/pydevc/client.py).

pub type Cmd = u32;

pub const CMD_RUN: Cmd = 101;
pub const CMD_LIST_THREADS: Cmd = 102;
pub const CMD_THREAD_CREATE: Cmd = 103;
pub const CMD_THREAD_KILL: Cmd = 104;
pub const CMD_THREAD_SUSPEND: Cmd = 105;
pub const CMD_THREAD_RUN: Cmd = 106;
pub const CMD_STEP_INTO: Cmd = 107;
pub const CMD_STEP_OVER: Cmd = 108;
pub const CMD_STEP_RETURN: Cmd = 109;
pub const CMD_SET_BREAK: Cmd = 111;
pub const CMD_REMOVE_BREAK: Cmd = 112;
pub const CMD_EVALUATE_EXPRESSION: Cmd = 113;
pub const CMD_SMART_STEP_INTO: Cmd = 128;
pub const CMD_VERSION: Cmd = 501;

/// Breakpoint addressing mode sent as the first payload field of
/// `CMD_SET_BREAK` / `CMD_REMOVE_BREAK`.
pub const BREAKPOINT_ADDR_MODE: &str = "python-line";

/// `init`'s `breakpoint_method` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointMode {
    /// Caller-assigned integer ids. Default — PyCharm-style tools don't keep
    /// their own ids, so this client defaults to its own bookkeeping instead.
    Id,
    /// Line-number-based addressing, available as an override.
    Line,
}

impl BreakpointMode {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            BreakpointMode::Id => "ID",
            BreakpointMode::Line => "LINE",
        }
    }
}

impl Default for BreakpointMode {
    fn default() -> Self {
        BreakpointMode::Id
    }
}

/// Operating-system kind sent during `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Windows,
    Unix,
}

impl OsKind {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            OsKind::Windows => "WINDOWS",
            OsKind::Unix => "UNIX",
        }
    }

    /// The kind of the platform this client is running on.
    pub fn current() -> Self {
        if cfg!(windows) {
            OsKind::Windows
        } else {
            OsKind::Unix
        }
    }
}

/// Thread names the daemon reserves for its own housekeeping. Filtered from
/// user-visible listings but left in the thread table and protocol traffic.
pub const INTERNAL_THREAD_NAMES: &[&str] =
    &["pydevd.Writer", "pydevd.CommandThread", "pydevd.Reader"];
