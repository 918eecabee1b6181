//! Command API (spec component F): the public operations a front-end (the
//! REPL, or any other driver) issues against a connected debuggee.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::codec::unquote_twice;
use crate::correlator::Correlator;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::events::ClientEvents;
use crate::protocol::{
    BreakpointMode, Cmd, OsKind, BREAKPOINT_ADDR_MODE, CMD_EVALUATE_EXPRESSION,
    CMD_LIST_THREADS, CMD_REMOVE_BREAK, CMD_RUN, CMD_SET_BREAK, CMD_SMART_STEP_INTO,
    CMD_STEP_INTO, CMD_STEP_OVER, CMD_STEP_RETURN, CMD_THREAD_RUN, CMD_VERSION,
};
use crate::state::{Breakpoint, StateModel, ThreadInfo};
use crate::transport::{Transport, TransportReader};

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const EVALUATE_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for a new breakpoint, before an id has been assigned.
#[derive(Debug, Clone)]
pub struct NewBreakpoint {
    pub filename: String,
    pub line: u32,
    pub condition: Option<String>,
    pub expression: Option<String>,
    pub temporary: bool,
}

pub struct Client {
    transport: Arc<Transport>,
    correlator: Arc<Correlator>,
    state: Arc<StateModel>,
    dispatcher: Arc<Dispatcher>,
    events: Arc<dyn ClientEvents>,
}

impl Client {
    /// Connect, wire up the background receive task, and return a ready
    /// client. `init` is sent separately by the caller (the REPL's startup
    /// sequence), matching the original's `preloop`/`start_debugger` split.
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        events: Arc<dyn ClientEvents>,
    ) -> Result<Self, Error> {
        let (transport, reader) = Transport::connect(addr, connect_timeout).await?;
        let transport = Arc::new(transport);
        let correlator = Arc::new(Correlator::new());
        let state = Arc::new(StateModel::new());
        let dispatcher = Arc::new(Dispatcher::new(
            correlator.clone(),
            state.clone(),
            events.clone(),
            transport.clone(),
        ));
        spawn_receive_loop(reader, dispatcher.clone());
        Ok(Client {
            transport,
            correlator,
            state,
            dispatcher,
            events,
        })
    }

    pub fn state(&self) -> &Arc<StateModel> {
        &self.state
    }

    async fn request_with_timeout(
        &self,
        cmd: Cmd,
        args: &[String],
        timeout: Duration,
    ) -> Result<crate::codec::Frame, Error> {
        let id = self.correlator.next_id();
        self.transport.send(cmd, id, args).await?;
        self.correlator.wait_for_reply(id, timeout).await
    }

    async fn request(&self, cmd: Cmd, args: &[String]) -> Result<crate::codec::Frame, Error> {
        self.request_with_timeout(cmd, args, DEFAULT_REPLY_TIMEOUT).await
    }

    async fn request_no_reply(&self, cmd: Cmd, args: &[String]) -> Result<(), Error> {
        let id = self.correlator.next_id();
        self.transport.send(cmd, id, args).await
    }

    /// Send the protocol handshake: announces this client's own version,
    /// the OS kind, and the breakpoint addressing mode; returns the peer's
    /// reported version string.
    pub async fn init(&self) -> Result<String, Error> {
        let args = vec![
            env!("CARGO_PKG_VERSION").to_string(),
            OsKind::current().as_wire_str().to_string(),
            BreakpointMode::default().as_wire_str().to_string(),
        ];
        let frame = self.request(CMD_VERSION, &args).await?;
        let version = frame
            .args
            .first()
            .map(|s| unquote_twice(s))
            .unwrap_or_default();
        info!(version, "debugger handshake complete");
        Ok(version)
    }

    /// Start running a new program under the debugger. Per the protocol
    /// sequencing, a thread listing is fetched first — this is how the pid
    /// embedded in the main thread's id is learned — and only then is `RUN`
    /// sent. Any breakpoint the caller wants planted before the program
    /// runs (e.g. a temporary one at the first executable line) must already
    /// be set before calling this.
    pub async fn start_debugger(&self) -> Result<(), Error> {
        self.list_threads().await?;
        self.request_no_reply(CMD_RUN, &[]).await
    }

    /// Kill the debuggee. The protocol has no `exit` verb this peer honors,
    /// so this sends no wire message and fires no thread event: it only
    /// delivers SIGTERM to the process, whose pid was learned from the main
    /// thread's id the first time a thread listing came back after startup.
    pub async fn kill_debugger(&self) -> Result<(), Error> {
        let pid = self.state.pid().ok_or(Error::NotRunning)?;
        send_sigterm(pid)
    }

    /// Add a breakpoint and return its assigned id. Wire field order is
    /// `id, mode, filename, line, function, condition, expression` — the
    /// breakpoint id leads, ahead of the addressing mode, matching the peer's
    /// `CMD_SET_BREAK` layout.
    pub async fn add_breakpoint(&self, bp: NewBreakpoint) -> Result<u32, Error> {
        let id = self.state.reserve_breakpoint_slot()?;
        let args = vec![
            id.to_string(),
            BREAKPOINT_ADDR_MODE.to_string(),
            bp.filename.clone(),
            bp.line.to_string(),
            String::new(),
            bp.condition.clone().unwrap_or_default(),
            bp.expression.clone().unwrap_or_default(),
        ];
        let result = self.request_no_reply(CMD_SET_BREAK, &args).await;
        if result.is_err() {
            let _ = self.state.remove_breakpoint(id);
            result?;
        }
        let created = Breakpoint {
            id,
            filename: bp.filename,
            line: Some(bp.line),
            scope: None,
            condition: bp.condition,
            expression: bp.expression,
            enabled: true,
            temporary: bp.temporary,
        };
        self.state.fill_breakpoint(created.clone());
        self.events.on_breakpoint_create(&created);
        Ok(id)
    }

    /// Remove a previously added breakpoint, both locally and on the wire.
    /// Wire field order is `mode, filename, id` — no line number, matching
    /// `CMD_REMOVE_BREAK`'s layout (the id alone identifies the breakpoint
    /// to remove).
    pub async fn remove_breakpoint(&self, id: u32) -> Result<(), Error> {
        let bp = self.state.remove_breakpoint(id)?;
        let args = vec![
            BREAKPOINT_ADDR_MODE.to_string(),
            bp.filename.clone(),
            id.to_string(),
        ];
        let result = self.request_no_reply(CMD_REMOVE_BREAK, &args).await;
        self.events.on_breakpoint_remove(&bp);
        result
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.state.breakpoints()
    }

    /// Refresh and return the user-visible thread table. Also learns the
    /// debuggee's pid from the first thread id seen, if not already known.
    pub async fn list_threads(&self) -> Result<Vec<ThreadInfo>, Error> {
        let frame = self.request(CMD_LIST_THREADS, &[]).await?;
        let mut first_id: Option<String> = None;
        for raw in &frame.args {
            if raw.is_empty() {
                continue;
            }
            if let Some((id, name)) = crate::dispatcher::parse_thread_attrs(raw) {
                first_id.get_or_insert_with(|| id.clone());
                self.state.refresh_thread_name(&id, &name);
            }
        }
        if let Some(pid) = first_id.as_deref().and_then(pid_from_thread_id) {
            self.state.set_pid_if_unset(pid);
        }
        Ok(self.state.visible_threads())
    }

    async fn thread_command(&self, cmd: Cmd, thread: Option<&str>) -> Result<String, Error> {
        let id = self.state.resolve_thread(thread)?;
        self.request_no_reply(cmd, &[id.clone()]).await?;
        Ok(id)
    }

    pub async fn continue_thread(&self, thread: Option<&str>) -> Result<(), Error> {
        self.thread_command(CMD_THREAD_RUN, thread).await.map(|_| ())
    }

    pub async fn step_into(&self, thread: Option<&str>) -> Result<(), Error> {
        self.thread_command(CMD_STEP_INTO, thread).await.map(|_| ())
    }

    pub async fn step_over(&self, thread: Option<&str>) -> Result<(), Error> {
        self.thread_command(CMD_STEP_OVER, thread).await.map(|_| ())
    }

    pub async fn step_return(&self, thread: Option<&str>) -> Result<(), Error> {
        self.thread_command(CMD_STEP_RETURN, thread).await.map(|_| ())
    }

    pub async fn smart_step_into(&self, thread: Option<&str>) -> Result<(), Error> {
        self.thread_command(CMD_SMART_STEP_INTO, thread)
            .await
            .map(|_| ())
    }

    /// Evaluate an expression in the topmost frame of the resolved thread.
    /// Requires the thread to be suspended with at least one frame.
    pub async fn evaluate(&self, thread: Option<&str>, expression: &str) -> Result<String, Error> {
        let thread_id = self.state.resolve_thread(thread)?;
        let frame_id = self
            .state
            .thread(&thread_id)
            .and_then(|t| t.frames.first().cloned())
            .ok_or(Error::NoActiveFrame)?;
        let args = vec![
            thread_id,
            frame_id,
            String::new(),
            expression.to_string(),
            "1".to_string(),
        ];
        let frame = self
            .request_with_timeout(CMD_EVALUATE_EXPRESSION, &args, EVALUATE_REPLY_TIMEOUT)
            .await?;
        frame
            .args
            .first()
            .and_then(|s| crate::dispatcher::parse_value_payload(s))
            .ok_or_else(|| Error::Protocol("malformed evaluate reply".into()))
    }

    pub fn active_thread(&self) -> Option<String> {
        self.state.active_thread_id()
    }

    pub fn set_active_thread(&self, id: String) {
        self.state.set_active_thread(id);
    }
}

/// Extract the OS process id from a thread id of the form `pid_<pid>_tid_<n>`.
/// The daemon assigns thread ids this way so the client can signal the
/// owning process without a dedicated protocol verb.
fn pid_from_thread_id(thread_id: &str) -> Option<i32> {
    let rest = thread_id.strip_prefix("pid_")?;
    let (pid, _) = rest.split_once("_tid_")?;
    pid.parse().ok()
}

#[cfg(unix)]
fn send_sigterm(pid: i32) -> Result<(), Error> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|err| Error::Protocol(format!("failed to signal pid {pid}: {err}")))
}

#[cfg(not(unix))]
fn send_sigterm(_pid: i32) -> Result<(), Error> {
    Err(Error::Protocol("process signalling is unix-only".into()))
}

fn spawn_receive_loop(reader: TransportReader, dispatcher: Arc<Dispatcher>) {
    tokio::spawn(async move {
        let for_closure = dispatcher.clone();
        let handler: Arc<dyn Fn(crate::codec::Frame) + Send + Sync> =
            Arc::new(move |frame| for_closure.handle_frame(frame));
        reader.run(handler).await;
        dispatcher.notify_server_exit();
    });
}
