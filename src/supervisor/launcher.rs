//! Child process launcher.
//!
//! Starts the agent server with `PORT` and `HOST` injected over the caller's
//! environment, forwards each stdout/stderr line to observers through the
//! owning coordinator's [`TaskQueue`], and runs a monitor task that is the
//! only writer of the child's [`ExitState`].

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, warn};

use crate::models::endpoint::AgentEndpoint;
use crate::models::process::ExitState;
use crate::supervisor::abort::{AbortScope, AbortSignal};
use crate::supervisor::output::{OutputCodec, OutputFrame, MAX_OUTPUT_LINE_BYTES};
use crate::supervisor::queue::TaskQueue;
use crate::{AppError, Result};

/// Environment variable carrying the port the child must bind.
pub const PORT_ENV: &str = "PORT";

/// Environment variable carrying the host the child must bind.
pub const HOST_ENV: &str = "HOST";

/// How long output readers may keep draining after the child is gone.
///
/// Grandchildren that inherited the pipes can hold them open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Callback receiving one line of child output.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback receiving the terminal exit state of a child.
pub type ExitObserver = Arc<dyn Fn(&ExitState) + Send + Sync>;

/// Command line and environment of the process to supervise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Caller-supplied environment, applied over the inherited one.
    pub env: HashMap<String, String>,
    /// Working directory; inherits the supervisor's when `None`.
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    /// Spec for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Observers for child output streams.
#[derive(Clone, Default)]
pub struct OutputObservers {
    /// Receives each stdout line.
    pub on_stdout: Option<LineObserver>,
    /// Receives each stderr line.
    pub on_stderr: Option<LineObserver>,
}

impl Debug for OutputObservers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputObservers")
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// Build the child environment: caller entries, then the optional API
/// server URL, then `PORT` and `HOST`, which always win.
#[must_use]
pub fn compose_environment(
    caller: &HashMap<String, String>,
    endpoint: &AgentEndpoint,
    api_server: Option<(&str, &str)>,
) -> HashMap<String, String> {
    let mut env = caller.clone();
    if let Some((name, url)) = api_server {
        env.insert(name.to_owned(), url.to_owned());
    }
    env.insert(PORT_ENV.to_owned(), endpoint.port.to_string());
    env.insert(HOST_ENV.to_owned(), endpoint.host.clone());
    env
}

/// A running (or finished) supervised child.
pub struct ProcessHandle {
    pid: u32,
    command: String,
    args: Vec<String>,
    environment: HashMap<String, String>,
    exit_rx: watch::Receiver<ExitState>,
    kill_signal: AbortSignal,
    queue: TaskQueue,
}

impl Debug for ProcessHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("exit_state", &*self.exit_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Executable the child was started with.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments the child was started with.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment overrides applied to the child.
    #[must_use]
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Current exit state.
    #[must_use]
    pub fn exit_state(&self) -> ExitState {
        self.exit_rx.borrow().clone()
    }

    /// Request termination. Best effort; a child that already exited keeps
    /// its `Exited` state.
    pub fn kill(&self, reason: impl Into<String>) {
        self.kill_signal.abort(reason);
    }

    /// Wait for the terminal exit state.
    pub async fn wait(&self) -> ExitState {
        wait_terminal(self.exit_rx.clone()).await
    }

    pub(crate) fn exit_receiver(&self) -> watch::Receiver<ExitState> {
        self.exit_rx.clone()
    }

    /// Deliver the terminal exit state to `observer` exactly once, after
    /// every output line of this child.
    pub fn on_exit(&self, observer: ExitObserver) -> JoinHandle<()> {
        let exit_rx = self.exit_rx.clone();
        let queue = self.queue.clone();
        let pid = self.pid;
        tokio::spawn(async move {
            let state = wait_terminal(exit_rx).await;
            if let Err(err) = queue.submit_fn(move || observer(&state)).await {
                warn!(pid, %err, "exit notification dropped");
            }
        })
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill_signal.abort("process handle dropped");
    }
}

/// Spawn the child described by `spec` with `environment` applied.
///
/// The child is killed when `abort` fires or [`ProcessHandle::kill`] is
/// called, whichever comes first.
///
/// # Errors
///
/// Returns `AppError::Process` if the OS cannot start the executable or its
/// output pipes cannot be captured.
pub fn launch(
    spec: &ProcessSpec,
    environment: HashMap<String, String>,
    observers: &OutputObservers,
    queue: &TaskQueue,
    abort: &AbortSignal,
) -> Result<ProcessHandle> {
    let span = info_span!("launch", command = %spec.command);
    let _guard = span.enter();

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Process(format!("failed to spawn {}: {err}", spec.command)))?;

    let pid = child
        .id()
        .ok_or_else(|| AppError::Process("child exited before its pid was read".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Process("failed to capture child stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Process("failed to capture child stderr".into()))?;

    info!(pid, args = ?spec.args, "child process spawned");

    let readers = vec![
        spawn_reader(stdout, observers.on_stdout.clone(), queue.clone(), pid, "stdout"),
        spawn_reader(stderr, observers.on_stderr.clone(), queue.clone(), pid, "stderr"),
    ];

    let kill_signal = AbortSignal::new();
    let kill_scope = AbortScope::new([abort.clone(), kill_signal.clone()]);
    let (exit_tx, exit_rx) = watch::channel(ExitState::Running);

    tokio::spawn(async move {
        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            Kill(String),
        }

        let outcome = tokio::select! {
            biased;
            reason = kill_scope.first_fired() => Outcome::Kill(reason),
            status = child.wait() => Outcome::Exited(status),
        };

        let final_state = match outcome {
            Outcome::Kill(reason) => {
                if let Err(err) = child.kill().await {
                    debug!(pid, %err, "kill failed, child already gone");
                }
                ExitState::Aborted { reason }
            }
            Outcome::Exited(Ok(status)) => ExitState::from_status(status),
            Outcome::Exited(Err(err)) => {
                warn!(pid, %err, "error waiting for child process");
                ExitState::Exited {
                    code: None,
                    signal: None,
                }
            }
        };

        drain_readers(readers, pid).await;
        info!(pid, state = %final_state, "child process finished");
        let _ = exit_tx.send(final_state);
    });

    Ok(ProcessHandle {
        pid,
        command: spec.command.clone(),
        args: spec.args.clone(),
        environment,
        exit_rx,
        kill_signal,
        queue: queue.clone(),
    })
}

fn spawn_reader<R>(
    stream: R,
    observer: Option<LineObserver>,
    queue: TaskQueue,
    pid: u32,
    stream_name: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        // Reading continues even when nothing is delivered; a closed pipe
        // would kill the child on its next write.
        let mut observer = observer;
        let mut framed = FramedRead::new(stream, OutputCodec::new());
        while let Some(frame) = framed.next().await {
            let bytes = match frame {
                Ok(OutputFrame::Line(bytes)) => bytes,
                Ok(OutputFrame::Oversized) => {
                    warn!(
                        pid,
                        stream = stream_name,
                        limit = MAX_OUTPUT_LINE_BYTES,
                        "output line too long, skipped"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(pid, stream = stream_name, %err, "failed to read child output");
                    break;
                }
            };

            let Some(ref target) = observer else {
                continue;
            };
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(err) => {
                    debug!(pid, stream = stream_name, "invalid UTF-8 in output, replacing");
                    String::from_utf8_lossy(err.as_bytes()).into_owned()
                }
            };
            let target = Arc::clone(target);
            if queue.submit_fn(move || target(&line)).await.is_err() {
                warn!(pid, stream = stream_name, "output queue closed, discarding output");
                observer = None;
            }
        }
    })
}

async fn drain_readers(readers: Vec<JoinHandle<()>>, pid: u32) {
    let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_TIMEOUT;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            debug!(pid, "output still open after exit, detaching reader");
            reader.abort();
        }
    }
}

pub(crate) async fn wait_terminal(mut exit_rx: watch::Receiver<ExitState>) -> ExitState {
    match exit_rx.wait_for(ExitState::is_terminal).await {
        Ok(state) => state.clone(),
        // Monitor task is gone without publishing; the child cannot be tracked.
        Err(_) => ExitState::Exited {
            code: None,
            signal: None,
        },
    }
}
