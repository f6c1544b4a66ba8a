//! Conversion runner
//!
//! Runs one packaging command on a dedicated worker thread and relays its
//! output to the caller as [`RunEvent`]s over a channel. The worker owns the
//! child process; the caller only holds a [`SessionHandle`] through which it
//! drains events and requests cancellation.
//!
//! Every session ends with exactly one [`RunEvent::Done`], after which no
//! further events are sent.

use crate::command::CommandLine;
use crate::error::{PackError, Result, ResultExt};
use crate::progress::{ProgressEstimator, ATTACHED, LAUNCHED};
use anyhow::{anyhow, Context};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SUCCESS_MESSAGE: &str = "Packaging completed successfully!";
pub const CANCELLED_MESSAGE: &str = "cancelled";

const RULE_WIDTH: usize = 60;
const ABORT_POLL: Duration = Duration::from_millis(100);

/// Message sent from the worker to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// One line of merged stdout/stderr, or a banner line
    Log(String),

    /// Estimated completion, 0-100, never decreasing
    Progress(u8),

    /// Terminal event, sent exactly once
    Done { outcome: Outcome, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

/// Lifecycle of a packaging session as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl From<Outcome> for SessionState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Succeeded => SessionState::Succeeded,
            Outcome::Failed => SessionState::Failed,
            Outcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Flags shared between one worker and its handle
#[derive(Debug, Default)]
struct SessionFlags {
    cancelled: AtomicBool,
    /// Kill without waiting for the next line; set on shutdown only
    aborted: AtomicBool,
    finished: AtomicBool,
}

/// Entry point for starting packaging sessions
pub struct ConversionRunner;

impl ConversionRunner {
    /// Launch `command` in `working_dir` on a new worker thread.
    ///
    /// Each call gets its own cancellation flag and child process. Running
    /// one session at a time is up to the caller.
    pub fn start(command: CommandLine, working_dir: impl Into<PathBuf>) -> SessionHandle {
        let (tx, rx) = mpsc::channel();
        let flags = Arc::new(SessionFlags::default());

        let session = ConversionSession {
            command,
            working_dir: working_dir.into(),
            flags: Arc::clone(&flags),
            events: tx.clone(),
            progress: ProgressEstimator::new(),
        };

        let worker = thread::Builder::new()
            .name("pybundle-worker".to_string())
            .spawn(move || session.run());

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to spawn worker thread: {}", e);
                flags.finished.store(true, Ordering::SeqCst);
                let _ = tx.send(RunEvent::Done {
                    outcome: Outcome::Failed,
                    message: format!("Failed to start worker thread: {}", e),
                });
                None
            }
        };

        SessionHandle {
            flags,
            events: rx,
            state: SessionState::Running,
            worker,
        }
    }
}

/// Caller-side view of a running session
pub struct SessionHandle {
    flags: Arc<SessionFlags>,
    events: Receiver<RunEvent>,
    state: SessionState,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Request cancellation.
    ///
    /// Takes effect at the next output line. Returns `false` without doing
    /// anything once the session has finished.
    pub fn cancel(&self) -> bool {
        if self.state.is_terminal() || self.flags.finished.load(Ordering::SeqCst) {
            return false;
        }
        self.flags.cancelled.store(true, Ordering::SeqCst);
        info!("Cancellation requested");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stop the session now and wait for the worker to exit.
    ///
    /// Unlike [`cancel`](Self::cancel) this does not wait for the tool to
    /// print another line; the child is killed within one poll interval.
    pub fn shutdown(self) -> Vec<RunEvent> {
        if !self.flags.finished.load(Ordering::SeqCst) {
            info!("Shutting down packaging session");
            self.flags.cancelled.store(true, Ordering::SeqCst);
            self.flags.aborted.store(true, Ordering::SeqCst);
        }
        self.wait()
    }

    /// Whether the terminal event has been received
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(self.track(event)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next event; `None` after the terminal event
    pub fn recv(&mut self) -> Option<RunEvent> {
        self.events.recv().ok().map(|event| self.track(event))
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<RunEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(self.track(event)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// All events that are ready right now
    pub fn drain(&mut self) -> Vec<RunEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Block until the session ends, returning every remaining event
    pub fn wait(mut self) -> Vec<RunEvent> {
        let events: Vec<RunEvent> = std::iter::from_fn(|| self.recv()).collect();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
        events
    }

    fn track(&mut self, event: RunEvent) -> RunEvent {
        if let RunEvent::Done { outcome, .. } = &event {
            self.state = SessionState::from(*outcome);
        }
        event
    }
}

/// Worker-side state of one run
struct ConversionSession {
    command: CommandLine,
    working_dir: PathBuf,
    flags: Arc<SessionFlags>,
    events: Sender<RunEvent>,
    progress: ProgressEstimator,
}

impl ConversionSession {
    fn run(mut self) {
        let (outcome, message) = match self.execute() {
            Ok(result) => result,
            Err(e) => {
                let message = format!("{:#}", e);
                self.log(format!("\n❌ Error: {}", message));
                (Outcome::Failed, message)
            }
        };

        info!("Packaging session finished: {:?}", outcome);
        self.flags.finished.store(true, Ordering::SeqCst);
        self.emit(RunEvent::Done { outcome, message });
    }

    fn execute(&mut self) -> Result<(Outcome, String)> {
        self.log("═".repeat(RULE_WIDTH));
        self.log(format!(
            "⏱️ Started: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.log("═".repeat(RULE_WIDTH));
        self.log(format!("\n📋 Command:\n{}\n", self.command));
        self.log("─".repeat(RULE_WIDTH));

        if self.command.is_empty() {
            return Err(anyhow!("Empty command line"));
        }
        let program = self.command.program().unwrap_or_default().to_string();

        let mut cmd = self
            .command
            .to_command(&self.working_dir)
            .ok_or_else(|| anyhow!("Empty command line"))?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(
            "Launching {} in {}",
            self.command,
            self.working_dir.display()
        );
        let mut child = cmd.spawn().with_tool_context(&program)?;
        self.report_progress(LAUNCHED);

        let lines = match attach_output(&mut child) {
            Ok(lines) => lines,
            Err(e) => {
                terminate(&mut child);
                return Err(e);
            }
        };
        self.report_progress(ATTACHED);

        loop {
            let line = match lines.recv_timeout(ABORT_POLL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    if self.flags.aborted.load(Ordering::SeqCst) {
                        return Ok(self.cancel_child(&mut child));
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if self.is_cancelled() {
                return Ok(self.cancel_child(&mut child));
            }

            let line = match line.context("Failed to read tool output") {
                Ok(line) => line,
                Err(e) => {
                    terminate(&mut child);
                    return Err(e);
                }
            };

            debug!("tool: {}", line);
            let percent = self.progress.observe(&line);
            self.log(line);
            self.report_progress(percent);
        }

        let status = child
            .wait()
            .with_tool_context(&program)
            .context("Failed to wait for packaging tool")?;

        if status.success() {
            let percent = self.progress.finish();
            self.report_progress(percent);
            self.log(format!("\n{}", "═".repeat(RULE_WIDTH)));
            self.log("✅ Packaging completed successfully!");
            self.log("═".repeat(RULE_WIDTH));
            return Ok((Outcome::Succeeded, SUCCESS_MESSAGE.to_string()));
        }

        // A nonzero exit after a cancel request is the tool reacting to it.
        if self.is_cancelled() {
            return Ok((Outcome::Cancelled, CANCELLED_MESSAGE.to_string()));
        }

        self.log(format!("\n{}", "═".repeat(RULE_WIDTH)));
        self.log("❌ Packaging failed!");
        self.log("═".repeat(RULE_WIDTH));
        let failure = PackError::ProcessFailure {
            code: status.code(),
        };
        Ok((Outcome::Failed, failure.to_string()))
    }

    fn cancel_child(&mut self, child: &mut Child) -> (Outcome, String) {
        info!("Terminating packaging tool after cancellation");
        terminate(child);
        (Outcome::Cancelled, CANCELLED_MESSAGE.to_string())
    }

    fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    fn report_progress(&mut self, percent: u8) {
        let value = self.progress.advance_to(percent);
        self.emit(RunEvent::Progress(value));
    }

    fn log(&self, line: impl Into<String>) {
        self.emit(RunEvent::Log(line.into()));
    }

    fn emit(&self, event: RunEvent) {
        // The receiver is gone when the window closed mid-run.
        let _ = self.events.send(event);
    }
}

/// Kill and reap the child, ignoring an already-exited process
fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Kill failed, process likely exited: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap packaging tool: {}", e);
    }
}

/// Merge the child's stdout and stderr into one line stream, in arrival order
fn attach_output(child: &mut Child) -> Result<Receiver<std::io::Result<String>>> {
    let stdout = child
        .stdout
        .take()
        .context("Child process has no stdout pipe")?;
    let stderr = child
        .stderr
        .take()
        .context("Child process has no stderr pipe")?;

    let (tx, rx) = mpsc::channel();
    pump_lines("pybundle-stdout", stdout, tx.clone())?;
    pump_lines("pybundle-stderr", stderr, tx)?;
    Ok(rx)
}

fn pump_lines<R>(name: &str, reader: R, tx: Sender<std::io::Result<String>>) -> Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn output reader thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_outcome() {
        assert_eq!(SessionState::from(Outcome::Succeeded), SessionState::Succeeded);
        assert_eq!(SessionState::from(Outcome::Failed), SessionState::Failed);
        assert_eq!(SessionState::from(Outcome::Cancelled), SessionState::Cancelled);
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }

    #[test]
    fn test_empty_command_fails_once() {
        let handle = ConversionRunner::start(CommandLine::from_tokens(Vec::<String>::new()), ".");
        let events = handle.wait();

        let done: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Done { .. }))
            .collect();
        assert_eq!(done.len(), 1);
        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_spawn_failure_reports_error_text() {
        let command = CommandLine::from_tokens(["pybundle-no-such-program-xyz", "--version"]);
        let mut handle = ConversionRunner::start(command, ".");

        let mut last = None;
        while let Some(event) = handle.recv() {
            last = Some(event);
        }

        match last {
            Some(RunEvent::Done { outcome, message }) => {
                assert_eq!(outcome, Outcome::Failed);
                assert!(message.contains("pybundle-no-such-program-xyz"));
            }
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(handle.state(), SessionState::Failed);
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
    }
}
