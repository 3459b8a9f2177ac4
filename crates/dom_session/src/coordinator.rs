//! Execution coordinator: owns the script engine on a dedicated thread.
//!
//! Every evaluation, structured call and network delivery is queued onto
//! the `js-exec` thread, so guest code never runs concurrently with itself.
//! Callers await the reply and, when an evaluation outlives the configured
//! timeout, request termination through the engine's interrupt handle until
//! the terminal outcome arrives.

use crate::error::SessionError;
use crate::host::{HOST_PRELUDE, REGEN_PRELUDE};
use core::time::Duration;
use js::{HostBindings, HostContext, InterruptHandle, JSValue, JsEngine, ScriptError};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tokio::time::sleep;

/// Creates the engine on the execution thread.
pub type EngineFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn JsEngine>> + Send + Sync>;

/// Guest function receiving network replies; defined by the host prelude.
const DELIVER_FN: &str = "function (id, data, err) { return opossum.deliver(id, data, err); }";

/// Source lines wider than this are shown as a window around the failing column.
const WIDE_LINE: usize = 100;
/// Half the width of that window.
const WINDOW_HALF: usize = 50;
/// Context lines at least this wide are skipped.
const CONTEXT_LIMIT: usize = 120;

type Reply = oneshot::Sender<Result<JSValue, ScriptError>>;

/// Work item for the execution thread.
pub(crate) enum Job {
    Eval {
        source: String,
        bootstrap: bool,
        reply: Reply,
    },
    Call {
        function: String,
        args: Vec<JSValue>,
        reply: Reply,
    },
    Deliver {
        id: u64,
        body: String,
        error: String,
    },
    Shutdown,
}

/// Cloneable sender side of the execution thread's job queue.
#[derive(Clone)]
pub struct JobQueue {
    sender: UnboundedSender<Job>,
}

impl JobQueue {
    pub(crate) fn new() -> (Self, UnboundedReceiver<Job>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    fn submit(&self, job: Job) -> Result<(), SessionError> {
        self.sender.send(job).map_err(|_| SessionError::Closed)
    }

    /// Hand a network reply back to the guest callback registered under `id`.
    pub(crate) fn deliver(&self, id: u64, body: String, error: String) {
        if self.submit(Job::Deliver { id, body, error }).is_err() {
            debug!("xhr {id}: session closed before delivery");
        }
    }
}

/// Serializes script evaluation for one session.
pub struct Coordinator {
    queue: JobQueue,
    interrupt: Arc<dyn InterruptHandle>,
    timeout: Duration,
}

impl Coordinator {
    /// Spawn the execution thread and create the engine on it.
    ///
    /// `bindings` are installed on the first bootstrap evaluation only.
    ///
    /// # Errors
    /// Returns [`SessionError::Configuration`] if the thread or the engine
    /// cannot be created.
    pub(crate) async fn start(
        queue: JobQueue,
        jobs: UnboundedReceiver<Job>,
        factory: EngineFactory,
        context: HostContext,
        bindings: HostBindings,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        thread::Builder::new()
            .name(String::from("js-exec"))
            .spawn(move || {
                let engine = match factory() {
                    Ok(engine) => engine,
                    Err(err) => {
                        if ready_tx.send(Err(format!("{err:#}"))).is_err() {
                            trace!("js-exec: session gone before engine start");
                        }
                        return;
                    }
                };
                if ready_tx.send(Ok(engine.interrupt_handle())).is_err() {
                    return;
                }
                run_jobs(engine, jobs, &context, Some(bindings));
            })
            .map_err(|err| SessionError::Configuration(format!("spawn js-exec: {err}")))?;

        let interrupt = ready_rx
            .await
            .map_err(|_| SessionError::Configuration(String::from("js-exec exited during start")))?
            .map_err(|err| SessionError::Configuration(format!("create engine: {err}")))?;
        info!("execution thread started");
        Ok(Self {
            queue,
            interrupt,
            timeout,
        })
    }

    /// Evaluate `script` and return the text form of its completion value.
    ///
    /// A bootstrap evaluation runs the host and regeneration preludes first.
    ///
    /// # Errors
    /// [`SessionError::Execution`] when the script raised (the failing source
    /// line is logged), [`SessionError::Interrupted`] when it had to be halted.
    pub async fn exec(&self, script: &str, bootstrap: bool) -> Result<String, SessionError> {
        let script = strip_comment_wrapper(script);
        let source = if bootstrap {
            format!("{HOST_PRELUDE}{REGEN_PRELUDE}{script}")
        } else {
            script
        };
        let (reply, outcome) = oneshot::channel();
        self.queue.submit(Job::Eval {
            source: source.clone(),
            bootstrap,
            reply,
        })?;
        match self.await_outcome(outcome).await {
            Ok(value) => Ok(value.to_text()),
            Err(SessionError::Execution(script_error)) => {
                introspect_error(&script_error.to_string(), &source);
                Err(SessionError::Execution(script_error))
            }
            Err(other) => Err(other),
        }
    }

    /// Invoke a function expression with marshalled arguments.
    ///
    /// # Errors
    /// Same as [`Coordinator::exec`].
    pub async fn call(&self, function: &str, args: Vec<JSValue>) -> Result<JSValue, SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.queue.submit(Job::Call {
            function: function.to_owned(),
            args,
            reply,
        })?;
        self.await_outcome(outcome).await
    }

    async fn await_outcome(
        &self,
        mut outcome: oneshot::Receiver<Result<JSValue, ScriptError>>,
    ) -> Result<JSValue, SessionError> {
        loop {
            tokio::select! {
                received = &mut outcome => {
                    let result = received.map_err(|_| SessionError::Closed)?;
                    return result.map_err(|script_error| {
                        let session_error = SessionError::from(script_error);
                        if session_error.is_interrupt() {
                            warn!("execution halted: {session_error}");
                        }
                        session_error
                    });
                }
                () = sleep(self.timeout) => {
                    warn!("Interrupt JS after {:?}", self.timeout);
                    self.interrupt.interrupt();
                }
            }
        }
    }

    /// Per-call execution bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the execution thread to exit once the current job finishes.
    pub fn shutdown(&self) {
        self.interrupt.interrupt();
        if self.queue.submit(Job::Shutdown).is_err() {
            trace!("execution thread already stopped");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_jobs(
    mut engine: Box<dyn JsEngine>,
    mut jobs: UnboundedReceiver<Job>,
    context: &HostContext,
    mut bindings: Option<HostBindings>,
) {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Eval {
                source,
                bootstrap,
                reply,
            } => {
                let result = if bootstrap {
                    install_once(engine.as_mut(), context, &mut bindings)
                        .and_then(|()| engine.eval_script(&source, "domfs://bootstrap"))
                } else {
                    engine.eval_script(&source, "domfs://exec")
                };
                flush_microtasks(engine.as_mut());
                if reply.send(result).is_err() {
                    trace!("js-exec: eval caller went away");
                }
            }
            Job::Call {
                function,
                args,
                reply,
            } => {
                let result = engine.call_function(&function, args, "domfs://call");
                flush_microtasks(engine.as_mut());
                if reply.send(result).is_err() {
                    trace!("js-exec: call caller went away");
                }
            }
            Job::Deliver { id, body, error } => {
                trace!("xhr {id}: delivering {} bytes", body.len());
                let args = vec![
                    JSValue::Number(id as f64),
                    JSValue::String(body),
                    JSValue::String(error),
                ];
                if let Err(err) = engine.call_function(DELIVER_FN, args, "domfs://deliver") {
                    error!("recovered in xhr {id}: {err}");
                }
                flush_microtasks(engine.as_mut());
            }
            Job::Shutdown => break,
        }
    }
    info!("execution thread stopped");
}

fn install_once(
    engine: &mut dyn JsEngine,
    context: &HostContext,
    bindings: &mut Option<HostBindings>,
) -> Result<(), ScriptError> {
    let Some(pending) = bindings.take() else {
        return Ok(());
    };
    engine
        .install_bindings(context, &pending)
        .map_err(|err| ScriptError::Internal(format!("install host object: {err:#}")))?;
    debug!("host object registered for session {}", context.session_id);
    Ok(())
}

fn flush_microtasks(engine: &mut dyn JsEngine) {
    if let Err(err) = engine.run_jobs() {
        warn!("run jobs: {err:#}");
    }
}

/// Replace a leading `<!--` and a trailing `-->` with line comments.
pub(crate) fn strip_comment_wrapper(script: &str) -> String {
    let mut stripped = match script.trim_start().strip_prefix("<!--") {
        Some(rest) => format!("//{rest}"),
        None => script.to_owned(),
    };
    if let Some(rest) = stripped.trim_end().strip_suffix("-->") {
        stripped = format!("{rest}//");
    }
    stripped
}

/// Log the source around a `Line <row>:<col>` marker found in `message`.
///
/// Returns the logged lines.
pub(crate) fn introspect_error(message: &str, source: &str) -> Vec<String> {
    const MARKER: &str = "Line ";
    let Some(start) = message.find(MARKER) else {
        return Vec::new();
    };
    let position = message[start + MARKER.len()..]
        .split(' ')
        .next()
        .unwrap_or_default();
    let mut parts = position.split(':');
    let (Some(Ok(row)), Some(Ok(column))) = (
        parts.next().map(str::parse::<usize>),
        parts.next().map(str::parse::<usize>),
    ) else {
        return Vec::new();
    };

    let lines: Vec<&str> = source.split('\n').collect();
    let row = row.clamp(1, lines.len());
    let failing = lines[row - 1];
    let mut shown = Vec::new();

    if failing.chars().count() > WIDE_LINE {
        let chars: Vec<char> = failing.chars().collect();
        let to = column.saturating_add(WINDOW_HALF).min(chars.len());
        let from = column.saturating_sub(WINDOW_HALF).min(to);
        shown.push(format!("the line: {}", chars[from..to].iter().collect::<String>()));
    } else {
        if row >= 2 && lines[row - 2].len() < CONTEXT_LIMIT {
            shown.push(format!("{}: {}", row - 1, lines[row - 2]));
        }
        shown.push(format!("{row}: {failing}"));
        if row < lines.len() && lines[row].len() < CONTEXT_LIMIT {
            shown.push(format!("{}: {}", row + 1, lines[row]));
        }
    }
    for line in &shown {
        error!("{line}");
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_wrapper_becomes_line_comments() {
        assert_eq!(strip_comment_wrapper("  <!--\nrun();\n-->  \n"), "//\nrun();\n//");
        assert_eq!(strip_comment_wrapper("run();"), "run();");
        assert_eq!(strip_comment_wrapper("a = b-->c; x"), "a = b-->c; x");
    }

    #[test]
    fn narrow_lines_show_surrounding_context() {
        let source = "var a = 1;\nvar b = c;\nvar d = 2;";
        let shown = introspect_error("ReferenceError: c is not defined at Line 2:9", source);
        assert_eq!(shown, vec!["1: var a = 1;", "2: var b = c;", "3: var d = 2;"]);
    }

    #[test]
    fn overlong_context_lines_are_skipped() {
        let wide = "x".repeat(130);
        let source = format!("{wide}\nboom();");
        let shown = introspect_error("oops at Line 2:1", &source);
        assert_eq!(shown, vec!["2: boom();"]);
    }

    #[test]
    fn wide_lines_show_a_window_around_the_column() {
        let line = format!("{}BAD{}", "a".repeat(200), "b".repeat(200));
        let shown = introspect_error("SyntaxError at Line 1:201", &line);
        assert_eq!(shown.len(), 1);
        let window = shown[0].trim_start_matches("the line: ");
        assert_eq!(window.chars().count(), 100);
        assert!(window.contains("BAD"));
    }

    #[test]
    fn messages_without_marker_log_nothing() {
        assert!(introspect_error("engine: v8 failed", "x").is_empty());
    }
}
