//! A command-line console speaking the pydevd-family remote debugger wire
//! protocol: a framed TCP client, request/reply correlation, a debuggee
//! state model, and a REPL front-end.

pub mod cli;
pub mod client;
pub mod codec;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod grammar;
pub mod protocol;
pub mod repl;
pub mod source;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
