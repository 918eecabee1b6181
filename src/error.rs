//! Error taxonomy for the protocol client and REPL.
//!
//! Mirrors the exceptions the original client raised as bare `RuntimeError`/
//! `TimeoutError` instances, given distinct variants so callers can match on
//! them instead of string-sniffing a message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection to debugger timed out")]
    ConnectFailed,

    #[error("no reply from server received")]
    Timeout,

    #[error("breakpoint limit (1024) reached")]
    CapacityExceeded,

    #[error("no thread specified and no thread is currently active")]
    NoThreadSelected,

    #[error("cannot operate on a running thread, no active frame")]
    NoActiveFrame,

    #[error("{0}")]
    ArgumentError(String),

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("debugger is not running")]
    NotRunning,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown breakpoint id: {0}")]
    UnknownBreakpoint(u32),

    #[error("command is declared but not implemented")]
    Unimplemented,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
