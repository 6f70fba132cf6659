#![forbid(unsafe_code)]

//! `agent-supervisor`: launch and supervise one local agent server.
//!
//! Loads configuration, takes the resource lock, starts the agent on an
//! ephemeral port, waits for it to become healthy, prints its endpoint as a
//! JSON line on stdout, and tears everything down on exit or shutdown signal.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_supervisor::identity::load_or_create_devhook_id;
use agent_supervisor::lock::LockManager;
use agent_supervisor::models::process::ExitState;
use agent_supervisor::supervisor::{AbortSignal, LifecycleCoordinator};
use agent_supervisor::{AppError, Result, SupervisorConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-supervisor", about = "Local agent server supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Skip the resource lock even if one is configured.
    #[arg(long)]
    no_lock: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = SupervisorConfig::load_from_path(&args.config)?;
    info!(command = %config.command, "configuration loaded");

    let devhook_id = load_or_create_devhook_id(&config.data_dir)?;
    info!(devhook_id, "devhook identity ready");

    // ── Lock the managed resource ───────────────────────
    let lock_guard = match config.lock_target() {
        Some(resource) if !args.no_lock => {
            let guard = LockManager::new()
                .acquire(resource, &config.lock_options())
                .await?;
            Some(guard)
        }
        _ => None,
    };

    // ── Wire shutdown to the caller abort signal ────────
    let abort = AbortSignal::new();
    let signal_abort = abort.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_abort.abort("shutdown signal received");
    });

    // ── Launch and wait for readiness ───────────────────
    let coordinator =
        LifecycleCoordinator::http(config.health.path.clone(), config.request_timeout());
    let spec = config
        .launch_spec()
        .on_stdout(|line| info!(target: "agent", "{line}"))
        .on_stderr(|line| warn!(target: "agent", "{line}"))
        .on_exit(|state| info!(%state, "agent exited"));

    let handle = match coordinator.launch(spec, &abort).await {
        Ok(handle) => handle,
        Err(err) if err.is_aborted() => {
            info!(%err, "startup aborted");
            release(lock_guard);
            return Ok(());
        }
        Err(err) => {
            error!(%err, "agent failed to start");
            release(lock_guard);
            return Err(err);
        }
    };

    let ready_line = serde_json::to_string(handle.endpoint())
        .map_err(|err| AppError::Io(format!("failed to encode endpoint: {err}")))?;
    println!("{ready_line}");

    // ── Run until the child exits or we are told to stop ─
    let exit = tokio::select! {
        exit = handle.wait() => exit,
        reason = abort.aborted() => {
            info!(reason, "stopping agent");
            handle.dispose().await
        }
    };

    release(lock_guard);
    info!(%exit, "agent-supervisor shut down");

    match exit {
        ExitState::Exited {
            code: Some(code), ..
        } if code != 0 => Err(AppError::Process(format!("agent {exit}"))),
        _ => Ok(()),
    }
}

fn release(guard: Option<agent_supervisor::lock::LockGuard>) {
    if let Some(guard) = guard {
        if let Err(err) = guard.release() {
            warn!(%err, "failed to release resource lock");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the endpoint line; logs go to stderr.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
