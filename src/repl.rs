//! REPL coordinator (spec component G).
//!
//! Renders prompts and asynchronous event notices without interleaving. A
//! command expected to provoke an asynchronous suspend notice (start, the
//! step family, continue) blocks its own return on a short wall-clock
//! window; a suspend notice arriving inside that window prints only the
//! location, trusting the command loop's own next prompt to follow close
//! behind, while one arriving after the window has already elapsed prints
//! the location and a fresh prompt of its own, since the loop is otherwise
//! sitting idle on a prompt it already drew. This mirrors `repl.py`'s
//! `__prompt_sleep`, a *blocking* `time.sleep(0.1)` each of those `do_*`
//! handlers calls before returning, checked by `on_suspend` via a
//! `_prompt_sleeping` flag.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::client::{Client, NewBreakpoint};
use crate::error::Error;
use crate::events::ClientEvents;
use crate::grammar::{self, ArgSpec};
use crate::source::{first_executable_line, list_window, SourceInspector};
use crate::state::{Breakpoint, ThreadInfo};

const DEFAULT_LIST_CONTEXT: u32 = 7;
const SUSPEND_WINDOW: Duration = Duration::from_millis(100);
const PROMPT: &str = "(Pydev) ";

/// Holds the prompt-suppression window and REPL-local display options. A
/// plain field on the REPL rather than a global: each `Repl` instance owns
/// its own suppression state.
pub struct ReplState {
    suspend_window_active: AtomicBool,
    quit: AtomicBool,
    list_context: AtomicUsize,
}

impl ReplState {
    pub fn new() -> Arc<Self> {
        Arc::new(ReplState {
            suspend_window_active: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            list_context: AtomicUsize::new(DEFAULT_LIST_CONTEXT as usize),
        })
    }

    /// Hold the suspend window open for `SUSPEND_WINDOW`, blocking the
    /// caller for that long before returning. Called and awaited inline by
    /// `start`/`continue`/`step`/`next`/`return`, right before each of them
    /// returns — so the command loop cannot print its next prompt until the
    /// window has actually elapsed, the same way `repl.py`'s blocking
    /// `time.sleep` delays `cmdloop`'s next prompt print.
    pub async fn suspend_window(self: &Arc<Self>) {
        self.suspend_window_active.store(true, Ordering::SeqCst);
        tokio::time::sleep(SUSPEND_WINDOW).await;
        self.suspend_window_active.store(false, Ordering::SeqCst);
    }

    fn suspend_window_is_active(&self) -> bool {
        self.suspend_window_active.load(Ordering::SeqCst)
    }

    fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    fn should_quit(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    fn list_context(&self) -> u32 {
        self.list_context.load(Ordering::SeqCst) as u32
    }

    fn set_list_context(&self, n: u32) {
        self.list_context.store(n as usize, Ordering::SeqCst);
    }
}

/// Bridges dispatcher-originated notices into the REPL's suppressable
/// output stream.
pub struct ReplEvents {
    state: Arc<ReplState>,
}

impl ReplEvents {
    pub fn new(state: Arc<ReplState>) -> Self {
        ReplEvents { state }
    }
}

impl ClientEvents for ReplEvents {
    fn on_thread_create(&self, thread: &ThreadInfo) {
        println!("New thread {} ({})", thread.name, thread.id);
    }

    fn on_thread_kill(&self, id: &str, name: Option<&str>) {
        match name {
            Some(name) => println!("Thread {name} ({id}) exited"),
            None => println!("Thread {id} exited"),
        }
    }

    /// Matches `repl.py`'s `on_suspend`: inside the suspend window, print
    /// only the location (the command loop's own next prompt follows close
    /// behind once the command that opened the window returns); once the
    /// window has elapsed, the loop is already sitting idle on a prompt it
    /// drew earlier, so print a fresh one along with the message.
    fn on_thread_suspend(&self, thread: &ThreadInfo) {
        let location = match (&thread.file, thread.line) {
            (Some(file), Some(line)) => format!(" at {file}:{line}"),
            _ => String::new(),
        };
        let message = format!("Thread {} suspended{location}", thread.name);
        if self.state.suspend_window_is_active() {
            println!("{message}");
        } else {
            println!("\n{message}\n{PROMPT}");
        }
    }

    fn on_breakpoint_create(&self, bp: &Breakpoint) {
        if !bp.temporary {
            println!(
                "Breakpoint {} set at line {} of file {}",
                bp.id,
                bp.line.map_or_else(|| "?".to_string(), |l| l.to_string()),
                bp.filename
            );
        }
    }

    fn on_breakpoint_remove(&self, bp: &Breakpoint) {
        if !bp.temporary {
            println!("Deleted breakpoint {}", bp.id);
        }
    }

    fn on_debuggee_exit(&self) {
        println!("Debuggee exited.");
        self.state.request_quit();
    }
}

struct Verb {
    name: &'static str,
    aliases: &'static [&'static str],
    summary: &'static str,
    usage: &'static str,
}

const VERBS: &[Verb] = &[
    Verb { name: "break", aliases: &["b"], summary: "set a breakpoint", usage: "break FILE:LINE[, CONDITION]" },
    Verb { name: "delete", aliases: &["d"], summary: "remove one or more breakpoints", usage: "delete ID [ID...]" },
    Verb { name: "continue", aliases: &["c", "cont"], summary: "resume the active (or named) thread", usage: "continue [THREAD]" },
    Verb { name: "step", aliases: &["s"], summary: "step into the next line", usage: "step [THREAD]" },
    Verb { name: "next", aliases: &["n"], summary: "step over the next line", usage: "next [THREAD]" },
    Verb { name: "return", aliases: &["r"], summary: "step out of the current frame", usage: "return [THREAD]" },
    Verb { name: "smart-step", aliases: &[], summary: "smart step into", usage: "smart-step [THREAD]" },
    Verb { name: "list", aliases: &["l"], summary: "show source around the current line", usage: "list [THREAD]" },
    Verb { name: "thread", aliases: &["t"], summary: "show or select the active thread", usage: "thread [INDEX]" },
    Verb { name: "threads", aliases: &[], summary: "list all known threads", usage: "threads" },
    Verb { name: "eval", aliases: &["e"], summary: "evaluate an expression in the active frame", usage: "eval EXPRESSION" },
    Verb { name: "start", aliases: &[], summary: "start the debuggee", usage: "start" },
    Verb { name: "kill", aliases: &["k"], summary: "terminate the debuggee", usage: "kill" },
    Verb { name: "set", aliases: &[], summary: "set a console option", usage: "set OPTION VALUE" },
    Verb { name: "help", aliases: &["h", "?"], summary: "show this help, or usage for one command", usage: "help [COMMAND]" },
    Verb { name: "quit", aliases: &["q"], summary: "exit the console", usage: "quit" },
    Verb { name: "EOF", aliases: &[], summary: "exit the console (synthesized on stdin EOF)", usage: "EOF" },
    Verb { name: "enable", aliases: &[], summary: "(not implemented)", usage: "enable ID" },
    Verb { name: "disable", aliases: &[], summary: "(not implemented)", usage: "disable ID" },
    Verb { name: "jump", aliases: &[], summary: "(not implemented)", usage: "jump LINE" },
    Verb { name: "up", aliases: &[], summary: "(not implemented)", usage: "up" },
    Verb { name: "down", aliases: &[], summary: "(not implemented)", usage: "down" },
    Verb { name: "exec", aliases: &[], summary: "(not implemented)", usage: "exec STATEMENT" },
];

fn resolve_verb(word: &str) -> Option<&'static Verb> {
    VERBS
        .iter()
        .find(|v| v.name == word || v.aliases.contains(&word))
}

pub struct ReplOptions {
    pub file: Option<String>,
    pub autostart: bool,
    pub break_at_start: bool,
}

pub struct Repl {
    client: Arc<Client>,
    state: Arc<ReplState>,
    source: Box<dyn SourceInspector>,
    options: ReplOptions,
}

impl Repl {
    pub fn new(
        client: Arc<Client>,
        state: Arc<ReplState>,
        source: Box<dyn SourceInspector>,
        options: ReplOptions,
    ) -> Self {
        Repl {
            client,
            state,
            source,
            options,
        }
    }

    /// Connect's handshake, optional autostart, and the interactive loop.
    pub async fn run(&self) -> Result<(), Error> {
        let version = self.client.init().await?;
        println!("PyDev v{version}");
        if self.options.autostart {
            self.start_debugger().await?;
        }
        self.cmdloop().await
    }

    async fn start_debugger(&self) -> Result<(), Error> {
        if self.options.break_at_start {
            if let Some(file) = &self.options.file {
                let lines = self.source.read_lines(file)?;
                if let Some(line) = first_executable_line(&lines) {
                    self.client
                        .add_breakpoint(NewBreakpoint {
                            filename: file.clone(),
                            line,
                            condition: None,
                            expression: None,
                            temporary: true,
                        })
                        .await?;
                }
            }
        }
        self.client.start_debugger().await?;
        self.state.suspend_window().await;
        Ok(())
    }

    /// Polls stdin with a short timeout instead of blocking on it outright,
    /// so a quit flag raised by the receive task's server-exit notice (which
    /// can land while nobody is typing) is noticed promptly rather than only
    /// after the next line comes in.
    async fn cmdloop(&self) -> Result<(), Error> {
        const INPUT_POLL: Duration = Duration::from_millis(100);
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        'outer: loop {
            if self.state.should_quit() {
                break;
            }
            print!("(Pydev) ");
            tokio::io::stdout().flush().await.ok();
            let line = loop {
                if self.state.should_quit() {
                    break 'outer;
                }
                match tokio::time::timeout(INPUT_POLL, stdin.next_line()).await {
                    Ok(Ok(Some(line))) => break line,
                    Ok(Ok(None)) => break "EOF".to_string(),
                    Ok(Err(_)) => break 'outer,
                    Err(_) => continue,
                }
            };
            if let Err(err) = self.dispatch(line.trim()).await {
                println!("*** {err}");
            }
            if self.state.should_quit() {
                break;
            }
        }
        Ok(())
    }

    async fn dispatch(&self, line: &str) -> Result<(), Error> {
        if line.is_empty() {
            return Ok(());
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim_start()),
            None => (line, ""),
        };
        let Some(verb) = resolve_verb(word) else {
            return Err(Error::ArgumentError(format!("unknown command: {word}")));
        };
        match verb.name {
            "break" => self.do_break(rest).await,
            "delete" => self.do_delete(rest).await,
            "continue" => self.do_continue(rest).await,
            "step" => self.do_step(rest).await,
            "next" => self.do_next(rest).await,
            "return" => self.do_return(rest).await,
            "smart-step" => self.do_smart_step(rest).await,
            "list" => self.do_list(rest).await,
            "thread" => self.do_thread(rest).await,
            "threads" => self.do_threads().await,
            "eval" => self.do_eval(rest).await,
            "start" => self.start_debugger().await,
            "kill" => self.client.kill_debugger().await,
            "set" => self.do_set(rest),
            "help" => self.do_help(rest),
            "quit" | "EOF" => {
                self.state.request_quit();
                Ok(())
            }
            _ => Err(Error::Unimplemented),
        }
    }

    async fn do_break(&self, rest: &str) -> Result<(), Error> {
        let spec = grammar::parse_breakpoint(rest)?;
        let line = match spec.line {
            Some(line) => line,
            None => {
                return Err(Error::ArgumentError(
                    "function-name breakpoints require source resolution not available here"
                        .into(),
                ))
            }
        };
        self.client
            .add_breakpoint(NewBreakpoint {
                filename: spec.filename,
                line,
                condition: spec.condition,
                expression: None,
                temporary: false,
            })
            .await?;
        Ok(())
    }

    async fn do_delete(&self, rest: &str) -> Result<(), Error> {
        let fields = grammar::split_args(rest, ArgSpec::new(1, 0, true))?;
        let Some(Some(ids)) = fields.into_iter().next() else {
            return Err(Error::ArgumentError("delete requires at least one id".into()));
        };
        for token in ids.split_whitespace() {
            match token.parse::<u32>() {
                Ok(id) => {
                    if let Err(err) = self.client.remove_breakpoint(id).await {
                        println!("*** could not delete {id}: {err}");
                    }
                }
                Err(_) => println!("*** not a breakpoint id: {token}"),
            }
        }
        Ok(())
    }

    async fn do_continue(&self, rest: &str) -> Result<(), Error> {
        self.client.continue_thread(thread_arg(rest)).await?;
        self.state.suspend_window().await;
        Ok(())
    }

    async fn do_step(&self, rest: &str) -> Result<(), Error> {
        self.client.step_into(thread_arg(rest)).await?;
        self.state.suspend_window().await;
        Ok(())
    }

    async fn do_next(&self, rest: &str) -> Result<(), Error> {
        self.client.step_over(thread_arg(rest)).await?;
        self.state.suspend_window().await;
        Ok(())
    }

    async fn do_return(&self, rest: &str) -> Result<(), Error> {
        self.client.step_return(thread_arg(rest)).await?;
        self.state.suspend_window().await;
        Ok(())
    }

    async fn do_smart_step(&self, rest: &str) -> Result<(), Error> {
        self.client.smart_step_into(thread_arg(rest)).await
    }

    async fn do_list(&self, rest: &str) -> Result<(), Error> {
        let thread_id = self.client.state().resolve_thread(thread_arg(rest))?;
        let thread = self
            .client
            .state()
            .thread(&thread_id)
            .ok_or(Error::NoActiveFrame)?;
        let (file, line) = match (thread.file, thread.line) {
            (Some(file), Some(line)) => (file, line),
            _ => return Err(Error::NoActiveFrame),
        };
        let lines = self.source.read_lines(&file)?;
        for (n, text) in list_window(&lines, line, self.state.list_context()) {
            let marker = if n == line { "->" } else { "  " };
            println!("{marker} {n:>4}  {text}");
        }
        Ok(())
    }

    async fn do_thread(&self, rest: &str) -> Result<(), Error> {
        if rest.is_empty() {
            return self.do_threads().await;
        }
        let index: usize = rest
            .parse()
            .map_err(|_| Error::ArgumentError(format!("not a thread index: {rest}")))?;
        let threads = self.client.state().visible_threads();
        let thread = threads
            .get(index)
            .ok_or_else(|| Error::ArgumentError(format!("no thread at index {index}")))?;
        self.client.set_active_thread(thread.id.clone());
        println!("Active thread: {} ({})", thread.name, thread.id);
        Ok(())
    }

    async fn do_threads(&self) -> Result<(), Error> {
        let threads = self.client.list_threads().await?;
        let active = self.client.active_thread();
        for (i, t) in threads.iter().enumerate() {
            let marker = if Some(&t.id) == active.as_ref() { "*" } else { " " };
            println!("{marker} [{i}] {} ({})", t.name, t.id);
        }
        Ok(())
    }

    async fn do_eval(&self, rest: &str) -> Result<(), Error> {
        if rest.is_empty() {
            return Err(Error::ArgumentError("eval requires an expression".into()));
        }
        let result = self.client.evaluate(None, rest).await?;
        println!("{result}");
        Ok(())
    }

    fn do_set(&self, rest: &str) -> Result<(), Error> {
        let fields = grammar::split_args(rest, ArgSpec::new(2, 0, false))?;
        let option = fields[0].clone().unwrap_or_default();
        let value = fields[1].clone().unwrap_or_default();
        match option.as_str() {
            "list-context" => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| Error::ArgumentError(format!("not a number: {value}")))?;
                self.state.set_list_context(n);
                Ok(())
            }
            other => Err(Error::UnknownOption(other.to_string())),
        }
    }

    fn do_help(&self, rest: &str) -> Result<(), Error> {
        if rest.is_empty() {
            let mut names: Vec<&str> = VERBS.iter().map(|v| v.name).collect();
            names.sort_unstable();
            for name in names {
                let verb = resolve_verb(name).unwrap();
                println!("{:<12} {}", verb.name, verb.summary);
            }
            return Ok(());
        }
        match resolve_verb(rest) {
            Some(verb) => {
                println!("{}", verb.usage);
                Ok(())
            }
            None => Err(Error::ArgumentError(format!("no such command: {rest}"))),
        }
    }
}

fn thread_arg(rest: &str) -> Option<&str> {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error as PydevcError;
    use tokio::io::AsyncReadExt;

    struct NoopSource;

    impl SourceInspector for NoopSource {
        fn read_lines(&self, _path: &str) -> Result<Vec<String>, PydevcError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn resolve_verb_matches_aliases() {
        assert_eq!(resolve_verb("c").unwrap().name, "continue");
        assert_eq!(resolve_verb("continue").unwrap().name, "continue");
        assert!(resolve_verb("nonsense").is_none());
    }

    #[tokio::test]
    async fn suspend_window_is_active_for_its_full_duration() {
        let state = ReplState::new();
        assert!(!state.suspend_window_is_active());
        let started = tokio::time::Instant::now();
        state.suspend_window().await;
        assert!(started.elapsed() >= SUSPEND_WINDOW);
        assert!(!state.suspend_window_is_active());
    }

    /// Drives a real `do_continue` through a connected (fake) debuggee and
    /// checks that it does not return until the suspend window has actually
    /// elapsed — the property that keeps `cmdloop` from reprinting its
    /// prompt while a suspend notice might still be about to arrive.
    #[tokio::test]
    async fn do_continue_blocks_until_the_suspend_window_elapses() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            loop {
                if sock.read(&mut buf).await.unwrap_or(0) == 0 {
                    break;
                }
            }
        });
        let state = ReplState::new();
        let events = Arc::new(ReplEvents::new(state.clone()));
        let client = Arc::new(
            Client::connect(&addr.to_string(), Duration::from_secs(1), events)
                .await
                .unwrap(),
        );
        client.state().thread_create("t1", "MainThread");
        let repl = Repl::new(
            client,
            state.clone(),
            Box::new(NoopSource),
            ReplOptions {
                file: None,
                autostart: false,
                break_at_start: false,
            },
        );

        let started = tokio::time::Instant::now();
        repl.dispatch("continue").await.unwrap();
        assert!(started.elapsed() >= SUSPEND_WINDOW);
        assert!(!state.suspend_window_is_active());
    }
}
