//! Graceful shutdown of spawned tasks.

use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A named long-running task.
pub struct ManagedTask {
    /// Name used in logs.
    pub name: String,
    /// Join handle.
    pub handle: JoinHandle<Result<()>>,
}

impl ManagedTask {
    /// Wrap a spawned task.
    pub fn new(name: impl Into<String>, handle: JoinHandle<Result<()>>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

/// Resolve on ctrl-c or, on unix, SIGTERM.
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Cancel `token` and wait for every task, each bounded by `timeout`.
///
/// Tasks still running at the timeout are aborted. Returns true when every
/// task exited on its own without error.
pub async fn shutdown_tasks(
    token: &CancellationToken,
    tasks: Vec<ManagedTask>,
    timeout: Duration,
) -> bool {
    info!(tasks = tasks.len(), "Shutting down gracefully...");
    token.cancel();

    let mut clean = true;
    for mut task in tasks {
        clean &= wait_for_task(&task.name, timeout, &mut task.handle).await;
    }

    if clean {
        info!("Shutdown complete");
    } else {
        warn!("Shutdown finished with errors");
    }
    clean
}

async fn wait_for_task(task: &str, timeout: Duration, handle: &mut JoinHandle<Result<()>>) -> bool {
    match tokio::time::timeout(timeout, &mut *handle).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            error!(task, error = ?e, "Task failed");
            false
        }
        Ok(Err(e)) => {
            error!(task, error = ?e, "Task panicked");
            false
        }
        Err(_) => {
            warn!(
                task,
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout reached, aborting task"
            );
            handle.abort();
            let _ = handle.await;
            false
        }
    }
}
