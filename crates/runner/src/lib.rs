//! A concurrent application runner that manages long-running processes with graceful shutdown.
//!
//! This runner orchestrates named app processes and cleanup functions:
//! - App processes run concurrently until one fails or a shutdown signal is received
//! - On shutdown, processes get a grace period to observe cancellation
//! - Closers always run afterward, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use patrol_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("Cleaning up resources");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Type alias for an app process function.
/// Takes a cancellation token and returns a future that resolves to Result<(), anyhow::Error>
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Type alias for a closer function.
/// Returns a future that resolves to Result<(), anyhow::Error>
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

/// A concurrent application runner that manages long-running processes with graceful shutdown.
pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    shutdown_grace: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a new Runner with default configuration.
    ///
    /// Default settings:
    /// - Closer timeout: 10 seconds
    /// - Shutdown grace period: 10 seconds
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an anonymous app process to the runner.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds an app process whose name is attached to its log lines.
    ///
    /// App processes run concurrently. If any process returns an error,
    /// all processes are cancelled and closers are executed.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds a closer to the runner.
    ///
    /// Closers are executed after all app processes have stopped,
    /// regardless of whether they stopped due to error or cancellation.
    /// All closers will attempt to execute even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// Sets the timeout for executing closers.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets how long cancelled processes may take to stop before they are aborted.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets a custom cancellation token.
    ///
    /// This allows external control over process cancellation.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs all app processes and waits for completion or shutdown signal.
    ///
    /// This method:
    /// 1. Spawns all app processes concurrently
    /// 2. Monitors for SIGTERM/SIGINT signals
    /// 3. Cancels all processes when a signal is received or any process fails
    /// 4. Waits up to the grace period for processes to stop
    /// 5. Executes all closers with the configured timeout
    ///
    /// # Returns
    /// The first process error, if any
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::debug!(process = %name, "Starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let signal_token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received shutdown signal");
                    signal_token.cancel();
                }
                Err(err) => {
                    tracing::error!("Error setting up signal handler: {}", err);
                }
            }
        });

        #[cfg(unix)]
        {
            let sigterm_token = token.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!("Received SIGTERM signal");
                        sigterm_token.cancel();
                    }
                    Err(err) => {
                        tracing::error!("Error setting up SIGTERM handler: {}", err);
                    }
                }
            });
        }

        let mut first_error = None;
        loop {
            let result = tokio::select! {
                result = join_set.join_next() => match result {
                    Some(result) => result,
                    None => break,
                },
                _ = token.cancelled() => break,
            };

            match result {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "App process completed successfully");
                }
                Ok((name, Err(err))) => {
                    tracing::error!(process = %name, "App process error: {:#}", err);
                    if first_error.is_none() {
                        first_error = Some(err.context(format!("process '{}' failed", name)));
                    }
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!("App process panicked: {}", err);
                    if first_error.is_none() && !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }
        }

        Self::drain_processes(join_set, self.shutdown_grace).await;

        if !self.closers.is_empty() {
            tracing::info!("Running closers with timeout of {:?}", self.closer_timeout);

            match tokio::time::timeout(self.closer_timeout, Self::run_closers(self.closers)).await
            {
                Ok(()) => tracing::info!("All closers completed"),
                Err(_) => tracing::error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => {
                tracing::error!("Application exiting with error: {:#}", err);
                Err(err)
            }
            None => {
                tracing::info!("Application exiting normally");
                Ok(())
            }
        }
    }

    /// Waits for cancelled processes to return, aborting whatever is left after `grace`.
    async fn drain_processes(
        mut join_set: JoinSet<(String, Result<(), anyhow::Error>)>,
        grace: Duration,
    ) {
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = join_set.join_next().await {
                match result {
                    Ok((name, Ok(()))) => {
                        tracing::debug!(process = %name, "App process stopped");
                    }
                    Ok((name, Err(err))) => {
                        tracing::warn!(process = %name, "App process stopped with error: {:#}", err);
                    }
                    Err(err) => {
                        tracing::error!("App process panicked during shutdown: {}", err);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!("App processes did not stop within {:?}, aborting", grace);
            join_set.shutdown().await;
        }
    }

    /// Runs all closers concurrently.
    async fn run_closers(closers: Vec<Closer>) {
        let mut closer_set = JoinSet::new();

        for closer in closers {
            closer_set.spawn(async move { closer().await });
        }

        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    tracing::debug!("Closer completed successfully");
                }
                Ok(Err(err)) => {
                    tracing::error!("Closer error: {:#}", err);
                }
                Err(err) => {
                    tracing::error!("Closer panicked: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runner_stops_on_cancellation_and_runs_closers() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let closer_flag = closer_called.clone();

        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = Runner::new()
            .with_named_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer(move || async move {
                closer_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token)
            .with_closer_timeout(Duration::from_secs(1))
            .run()
            .await;

        assert!(result.is_ok());
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_runner_returns_first_error_and_cancels_others() {
        let peer_stopped = Arc::new(AtomicBool::new(false));
        let peer_flag = peer_stopped.clone();

        let result = Runner::new()
            .with_named_process("failing", |_ctx| async move {
                Err(anyhow::anyhow!("broker unreachable"))
            })
            .with_named_process("peer", move |ctx| async move {
                ctx.cancelled().await;
                peer_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_shutdown_grace(Duration::from_secs(1))
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("process 'failing' failed"));
        assert!(format!("{:#}", err).contains("broker unreachable"));
        assert!(peer_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_runner_aborts_processes_that_ignore_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let result = Runner::new()
            .with_app_process(|_ctx| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .with_cancellation_token(token)
            .with_shutdown_grace(Duration::from_millis(20))
            .run()
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_all_closers_run_even_when_one_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = counter.clone();
        let second = counter.clone();

        let runner = Runner::new()
            .with_closer(move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("flush failed"))
            })
            .with_closer(move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        Runner::run_closers(runner.closers).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
