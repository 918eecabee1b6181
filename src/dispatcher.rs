//! Dispatcher (spec component C).
//!
//! Routes every frame the transport hands it by id parity: odd ids are
//! replies to requests this client issued and go straight to the
//! correlator; even ids are server-originated events and get decoded here
//! into state-model updates and [`crate::events::ClientEvents`] calls.
//!
//! Suspension at a breakpoint this client planted as temporary triggers the
//! same removal path the public `remove_breakpoint` command uses, so the
//! wire-level `CMD_REMOVE_BREAK` is sent exactly once regardless of which
//! caller triggered it.

use std::sync::Arc;

use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader as XmlReader;
use tracing::{debug, warn};

use crate::codec::{unquote_twice, Frame};
use crate::correlator::Correlator;
use crate::events::ClientEvents;
use crate::protocol::{CMD_REMOVE_BREAK, CMD_THREAD_CREATE, CMD_THREAD_KILL, CMD_THREAD_SUSPEND};
use crate::state::{StateModel, STOP_REASON_SET_BREAK};
use crate::transport::Transport;

pub struct Dispatcher {
    correlator: Arc<Correlator>,
    state: Arc<StateModel>,
    events: Arc<dyn ClientEvents>,
    transport: Arc<Transport>,
}

impl Dispatcher {
    pub fn new(
        correlator: Arc<Correlator>,
        state: Arc<StateModel>,
        events: Arc<dyn ClientEvents>,
        transport: Arc<Transport>,
    ) -> Self {
        Dispatcher {
            correlator,
            state,
            events,
            transport,
        }
    }

    /// Handle one decoded frame. Cheap enough to run synchronously from the
    /// transport's read loop except where it needs to send a follow-up
    /// frame (temporary-breakpoint cleanup), which it spawns.
    pub fn handle_frame(&self, frame: Frame) {
        if frame.id % 2 == 1 {
            self.correlator.deliver_reply(frame);
            return;
        }
        match frame.cmd {
            CMD_THREAD_CREATE => self.handle_thread_create(&frame),
            CMD_THREAD_KILL => self.handle_thread_kill(&frame),
            CMD_THREAD_SUSPEND => self.handle_thread_suspend(&frame),
            other => debug!(cmd = other, id = frame.id, "unhandled event frame"),
        }
    }

    /// Fire `EVENT_SERVER_EXIT`: called once the transport's receive task
    /// has ended, regardless of cause (clean close or read error).
    pub fn notify_server_exit(&self) {
        self.events.on_debuggee_exit();
    }

    fn handle_thread_create(&self, frame: &Frame) {
        let Some(payload) = frame.args.first() else {
            warn!("THREAD_CREATE with no payload");
            return;
        };
        let Some((id, name)) = parse_thread_attrs(payload) else {
            warn!(payload, "unparseable THREAD_CREATE payload");
            return;
        };
        self.state.thread_create(&id, &name);
        if let Some(thread) = self.state.thread(&id) {
            self.events.on_thread_create(&thread);
        }
    }

    fn handle_thread_kill(&self, frame: &Frame) {
        let Some(id) = frame.args.first() else {
            warn!("THREAD_KILL with no payload");
            return;
        };
        let name = self.state.thread_kill(id);
        match &name {
            Some(_) => self.events.on_thread_kill(id, name.as_deref()),
            None => debug!(id, "THREAD_KILL for unknown thread id"),
        }
    }

    fn handle_thread_suspend(&self, frame: &Frame) {
        let Some(payload) = frame.args.first() else {
            warn!("THREAD_SUSPEND with no payload");
            return;
        };
        let Some(suspend) = parse_suspend_payload(payload) else {
            warn!(payload, "unparseable THREAD_SUSPEND payload");
            return;
        };
        self.state.thread_suspend(
            &suspend.thread_id,
            suspend.file.clone(),
            suspend.line,
            suspend.function.clone(),
            suspend.frame_ids.clone(),
        );
        if let Some(thread) = self.state.thread(&suspend.thread_id) {
            self.events.on_thread_suspend(&thread);
        }
        if suspend.stop_reason == Some(STOP_REASON_SET_BREAK) {
            if let Some(bp_id) = self
                .state
                .find_temporary_match(&suspend.file, suspend.line)
            {
                let state = Arc::clone(&self.state);
                let correlator = Arc::clone(&self.correlator);
                let transport = Arc::clone(&self.transport);
                let events = Arc::clone(&self.events);
                tokio::spawn(cleanup_temporary_breakpoint(
                    state, correlator, transport, events, bp_id,
                ));
            }
        }
    }
}

/// Remove a spent temporary breakpoint, locally and on the wire. A free
/// function (not a `Dispatcher` method) so it can be spawned without
/// needing an `Arc<Dispatcher>` of its own.
async fn cleanup_temporary_breakpoint(
    state: Arc<StateModel>,
    correlator: Arc<Correlator>,
    transport: Arc<Transport>,
    events: Arc<dyn ClientEvents>,
    id: u32,
) {
    let Ok(bp) = state.remove_breakpoint(id) else {
        return;
    };
    let msg_id = correlator.next_id();
    let args = vec![
        crate::protocol::BREAKPOINT_ADDR_MODE.to_string(),
        bp.filename.clone(),
        id.to_string(),
    ];
    if let Err(err) = transport.send(CMD_REMOVE_BREAK, msg_id, &args).await {
        warn!(%err, id, "failed to remove spent temporary breakpoint");
    }
    events.on_breakpoint_remove(&bp);
}

fn xml_attr(e: &quick_xml::events::BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            Some(String::from_utf8_lossy(&a.value).into_owned())
        } else {
            None
        }
    })
}

/// Parse a `THREAD_CREATE` payload: `<xml><thread name="..." id="..." /></xml>`.
/// Also used to parse the individual `<thread>` entries inside a
/// `LIST_THREADS` reply.
pub(crate) fn parse_thread_attrs(payload: &str) -> Option<(String, String)> {
    let decoded = unquote_twice(payload);
    let mut reader = XmlReader::from_str(&decoded);
    loop {
        match reader.read_event().ok()? {
            XmlEvent::Empty(e) | XmlEvent::Start(e) if e.name().as_ref() == b"thread" => {
                let id = xml_attr(&e, "id")?;
                let name = xml_attr(&e, "name").unwrap_or_default();
                return Some((id, name));
            }
            XmlEvent::Eof => return None,
            _ => continue,
        }
    }
}

/// Parse an `EVALUATE_EXPRESSION` reply payload: `<xml><var value="..." .../></xml>`.
/// Only the `value` attribute of the first child element is consumed; the
/// element name itself varies (`var`, `value`) and is not checked.
pub(crate) fn parse_value_payload(payload: &str) -> Option<String> {
    let decoded = unquote_twice(payload);
    let mut reader = XmlReader::from_str(&decoded);
    let mut depth = 0;
    loop {
        match reader.read_event().ok()? {
            XmlEvent::Start(e) => {
                depth += 1;
                if depth == 2 {
                    return xml_attr(&e, "value").map(|v| unquote_twice(&v));
                }
            }
            XmlEvent::Empty(e) => {
                if depth == 1 {
                    return xml_attr(&e, "value").map(|v| unquote_twice(&v));
                }
            }
            XmlEvent::Eof => return None,
            _ => continue,
        }
    }
}

struct SuspendInfo {
    thread_id: String,
    stop_reason: Option<crate::protocol::Cmd>,
    file: String,
    line: u32,
    function: String,
    frame_ids: Vec<String>,
}

/// Parse a `THREAD_SUSPEND` payload:
/// `<xml><thread id="..." stop_reason="..."><frame id="0" name="<module>" file="a.py" line="3"/>...</thread></xml>`.
fn parse_suspend_payload(payload: &str) -> Option<SuspendInfo> {
    let decoded = unquote_twice(payload);
    let mut reader = XmlReader::from_str(&decoded);
    let mut thread_id = None;
    let mut stop_reason = None;
    let mut frame_ids = Vec::new();
    let mut top_file = None;
    let mut top_line = None;
    let mut top_function = None;
    loop {
        match reader.read_event().ok()? {
            XmlEvent::Start(e) | XmlEvent::Empty(e) => match e.name().as_ref() {
                b"thread" => {
                    thread_id = xml_attr(&e, "id");
                    stop_reason = xml_attr(&e, "stop_reason").and_then(|s| s.parse().ok());
                }
                b"frame" => {
                    let id = xml_attr(&e, "id")?;
                    if top_file.is_none() {
                        top_file = xml_attr(&e, "file").map(|s| unquote_twice(&s));
                        top_line = xml_attr(&e, "line").and_then(|s| s.parse().ok());
                        top_function = xml_attr(&e, "name");
                    }
                    frame_ids.push(id);
                }
                _ => {}
            },
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Some(SuspendInfo {
        thread_id: thread_id?,
        stop_reason,
        file: top_file?,
        line: top_line?,
        function: top_function.unwrap_or_default(),
        frame_ids,
    })
}
