//! Lifecycle coordinator.
//!
//! Sequences one launch request through
//! `Idle -> Launching -> AwaitingHealth -> Ready -> Running` and resolves it
//! to exactly one outcome: a live [`AgentHandle`] or an error. No partial
//! handle is ever returned, and a failed startup never leaves the child
//! running.
//!
//! Two abort scopes are in play while awaiting health: the caller's signal,
//! which lives as long as the child, and an internal `until_ready` signal
//! that fires as soon as startup ends. A child exiting during startup fires
//! `until_ready` with the exit as reason, which the coordinator reports as
//! `AppError::Process` rather than as an abort.

use std::fmt::{Debug, Formatter};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::AgentClient;
use crate::models::endpoint::AgentEndpoint;
use crate::models::health::HealthState;
use crate::models::lifecycle::LifecycleState;
use crate::models::process::ExitState;
use crate::supervisor::abort::{AbortScope, AbortSignal};
use crate::supervisor::health::{HealthCheck, HealthProbe};
use crate::supervisor::launcher::{
    self, compose_environment, ExitObserver, OutputObservers, ProcessHandle, ProcessSpec,
};
use crate::supervisor::port::allocate_port;
use crate::supervisor::queue::TaskQueue;
use crate::{AppError, Result};

/// Host injected as `HOST` for local supervision.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Reason used when a handle is disposed.
const DISPOSE_REASON: &str = "disposed";

/// Builds the client for a freshly allocated endpoint.
pub type ClientFactory<C> = Box<dyn Fn(&AgentEndpoint) -> Result<C> + Send + Sync>;

/// Environment variable pointing the child at its upstream API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServerEnv {
    /// Variable name, e.g. `AGENT_API_URL`.
    pub var: String,
    /// Value injected into the child.
    pub url: String,
}

/// Everything needed to start and probe one child.
#[derive(Clone)]
pub struct LaunchSpec {
    /// Command line and caller environment.
    pub process: ProcessSpec,
    /// Host the child binds to.
    pub host: String,
    /// Optional upstream API server variable.
    pub api_server: Option<ApiServerEnv>,
    /// Readiness polling policy.
    pub probe: HealthProbe,
    /// Output line observers.
    pub observers: OutputObservers,
    /// Exit observer, armed only once the child is `Running`.
    pub on_exit: Option<ExitObserver>,
}

impl Debug for LaunchSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("process", &self.process)
            .field("host", &self.host)
            .field("api_server", &self.api_server)
            .field("probe", &self.probe)
            .field("observers", &self.observers)
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

impl LaunchSpec {
    /// Spec with default host, probe and no observers.
    #[must_use]
    pub fn new(process: ProcessSpec) -> Self {
        Self {
            process,
            host: DEFAULT_HOST.to_owned(),
            api_server: None,
            probe: HealthProbe::default(),
            observers: OutputObservers::default(),
            on_exit: None,
        }
    }

    /// Use a different readiness policy.
    #[must_use]
    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Inject an upstream API server URL under `var`.
    #[must_use]
    pub fn with_api_server(mut self, var: impl Into<String>, url: impl Into<String>) -> Self {
        self.api_server = Some(ApiServerEnv {
            var: var.into(),
            url: url.into(),
        });
        self
    }

    /// Forward stdout lines to `observer`.
    #[must_use]
    pub fn on_stdout(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observers.on_stdout = Some(std::sync::Arc::new(observer));
        self
    }

    /// Forward stderr lines to `observer`.
    #[must_use]
    pub fn on_stderr(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observers.on_stderr = Some(std::sync::Arc::new(observer));
        self
    }

    /// Report the exit of a running child to `observer`.
    #[must_use]
    pub fn on_exit(mut self, observer: impl Fn(&ExitState) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(std::sync::Arc::new(observer));
        self
    }
}

/// Live child handed back by a successful launch.
pub struct AgentHandle<C> {
    endpoint: AgentEndpoint,
    client: C,
    process: ProcessHandle,
    health: HealthState,
}

impl<C> Debug for AgentHandle<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("endpoint", &self.endpoint)
            .field("process", &self.process)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl<C> AgentHandle<C> {
    /// Endpoint the child listens on.
    #[must_use]
    pub fn endpoint(&self) -> &AgentEndpoint {
        &self.endpoint
    }

    /// Client bound to the child.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// OS process id of the child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// The supervised process.
    #[must_use]
    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Health probe result that made the child ready.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.health
    }

    /// Current lifecycle state, derived from the child's exit state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        match self.process.exit_state() {
            ExitState::Running => LifecycleState::Running,
            ExitState::Exited { .. } => LifecycleState::Exited,
            ExitState::Aborted { .. } => LifecycleState::Aborted,
        }
    }

    /// Kill the child and wait until it is gone. Idempotent.
    pub async fn dispose(&self) -> ExitState {
        self.process.kill(DISPOSE_REASON);
        let state = self.process.wait().await;
        info!(pid = self.process.pid(), %state, "agent disposed");
        state
    }

    /// Wait for the child to finish without killing it.
    pub async fn wait(&self) -> ExitState {
        self.process.wait().await
    }
}

/// Launches supervised children and resolves their startup.
///
/// Output and exit observers of every child launched through one
/// coordinator run on that coordinator's sequential task queue.
pub struct LifecycleCoordinator<C> {
    factory: ClientFactory<C>,
    queue: TaskQueue,
}

impl<C> Debug for LifecycleCoordinator<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl LifecycleCoordinator<AgentClient> {
    /// Coordinator probing children over HTTP at `health_path`.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn http(health_path: impl Into<String>, request_timeout: Duration) -> Self {
        let health_path = health_path.into();
        Self::new(move |endpoint| AgentClient::new(endpoint, &health_path, request_timeout))
    }
}

impl<C: HealthCheck> LifecycleCoordinator<C> {
    /// Coordinator using `factory` to build the client for each endpoint.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&AgentEndpoint) -> Result<C> + Send + Sync + 'static,
    {
        // The worker stops once this coordinator and every handle it
        // produced have dropped their queue senders.
        let (queue, _worker) = TaskQueue::spawn("coordinator");
        Self {
            factory: Box::new(factory),
            queue,
        }
    }

    /// Start a child and wait for it to become ready.
    ///
    /// `abort` is the caller's lifetime signal: firing it at any point kills
    /// the child. Before readiness that resolves this call as
    /// `AppError::Aborted`; afterwards the exit observer reports it.
    ///
    /// # Errors
    ///
    /// - `AppError::Aborted(reason)`: `abort` fired before readiness.
    /// - `AppError::Process`: spawn failure or child exit before readiness.
    /// - `AppError::HealthTimeout`: the attempt ceiling was reached.
    /// - `AppError::Io` / `AppError::Http`: port or client setup failed.
    pub async fn launch(&self, spec: LaunchSpec, abort: &AbortSignal) -> Result<AgentHandle<C>> {
        let mut lifecycle = Lifecycle::default();

        if let Some(reason) = abort.reason() {
            lifecycle.advance(LifecycleState::Aborted);
            return Err(AppError::Aborted(reason));
        }

        let (endpoint, client) = match self.prepare(&spec.host).await {
            Ok(prepared) => prepared,
            Err(err) => {
                lifecycle.advance(LifecycleState::FailedStartup);
                return Err(err);
            }
        };

        let api_server = spec
            .api_server
            .as_ref()
            .map(|api| (api.var.as_str(), api.url.as_str()));
        let environment = compose_environment(&spec.process.env, &endpoint, api_server);

        lifecycle.advance(LifecycleState::Launching);
        let process = match launcher::launch(
            &spec.process,
            environment,
            &spec.observers,
            &self.queue,
            abort,
        ) {
            Ok(process) => process,
            Err(err) => {
                lifecycle.advance(LifecycleState::FailedStartup);
                warn!(command = %spec.process.command, %err, "child failed to start");
                return Err(err);
            }
        };

        lifecycle.advance(LifecycleState::AwaitingHealth);
        let until_ready = AbortSignal::new();
        let exit_watch = watch_startup_exit(&process, until_ready.clone());
        let scope = AbortScope::new([abort.clone(), until_ready.clone()]);

        let probed = spec.probe.wait_until_ready(&client, &scope).await;
        until_ready.abort("startup finished");
        exit_watch.abort();

        let health = match probed {
            Ok(health) => health,
            Err(err) => {
                let (err, terminal) = match (abort.reason(), err) {
                    (Some(reason), _) => (AppError::Aborted(reason), LifecycleState::Aborted),
                    (None, AppError::Aborted(reason)) => {
                        (AppError::Process(reason), LifecycleState::FailedStartup)
                    }
                    (None, err @ AppError::HealthTimeout(_)) => (err, LifecycleState::TimedOut),
                    (None, err) => (err, LifecycleState::FailedStartup),
                };
                process.kill(err.to_string());
                let exit = process.wait().await;
                lifecycle.advance(terminal);
                warn!(pid = process.pid(), %err, %exit, "startup failed");
                return Err(err);
            }
        };

        lifecycle.advance(LifecycleState::Ready);
        if let Some(on_exit) = spec.on_exit {
            process.on_exit(on_exit);
        }
        lifecycle.advance(LifecycleState::Running);

        info!(
            pid = process.pid(),
            port = endpoint.port,
            attempts = health.attempts(),
            "agent ready"
        );

        Ok(AgentHandle {
            endpoint,
            client,
            process,
            health,
        })
    }

    async fn prepare(&self, host: &str) -> Result<(AgentEndpoint, C)> {
        let port = allocate_port(host).await?;
        let endpoint = AgentEndpoint::new(host, port);
        let client = (self.factory)(&endpoint)?;
        Ok((endpoint, client))
    }
}

/// Fire `until_ready` with the exit as reason if the child ends before
/// startup does.
fn watch_startup_exit(process: &ProcessHandle, until_ready: AbortSignal) -> JoinHandle<()> {
    let exit_rx = process.exit_receiver();
    tokio::spawn(async move {
        tokio::select! {
            _ = until_ready.aborted() => {}
            state = launcher::wait_terminal(exit_rx) => {
                until_ready.abort(format!("child {state} during startup"));
            }
        }
    })
}

/// Transition log for one launch request.
#[derive(Debug, Default)]
struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    fn advance(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "unexpected lifecycle transition");
        }
        debug!(from = ?self.state, to = ?next, "lifecycle transition");
        self.state = next;
    }
}
