//! Background "run while enabled" loop with cooperative cancellation.
//!
//! After a completed run the next one starts immediately if the runner is
//! still enabled. While disabled, or when a run was skipped because another
//! one held the guard, the loop sleeps for the poll interval before looking
//! again. Cancelling only stops future iterations; a run already in flight
//! always finishes.

use std::future::Future;
use std::time::Duration;

use terra_erosion::{ErosionError, RunOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a spawned background loop.
pub struct ContinuousRunner {
    enabled: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    completed: watch::Receiver<u64>,
    handle: JoinHandle<Result<u64, ErosionError>>,
}

impl ContinuousRunner {
    /// Spawn the loop on the current tokio runtime. It starts disabled.
    ///
    /// The loop ends with the job's error if a run fails; failures are never
    /// retried.
    pub fn spawn<F, Fut>(poll_interval: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RunOutcome, ErosionError>> + Send + 'static,
    {
        let (enabled_tx, enabled_rx) = watch::channel(false);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (completed_tx, completed_rx) = watch::channel(0u64);

        let handle = tokio::spawn(async move {
            let mut completed = 0u64;
            loop {
                if *cancel_rx.borrow() {
                    break;
                }

                if *enabled_rx.borrow() {
                    let outcome = job().await.inspect_err(|e| {
                        tracing::error!(error = %e, "Continuous run failed, stopping");
                    })?;
                    if outcome.is_completed() {
                        completed += 1;
                        completed_tx.send_replace(completed);
                        tokio::task::yield_now().await;
                        continue;
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = cancel_rx.changed() => {}
                }
            }
            tracing::debug!(completed, "Continuous runner stopped");
            Ok::<_, ErosionError>(completed)
        });

        Self {
            enabled: enabled_tx,
            cancel: cancel_tx,
            completed: completed_rx,
            handle,
        }
    }

    /// Toggle rescheduling. Takes effect at the next poll.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.send_replace(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Runs completed so far.
    pub fn completed(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Wait until at least `count` runs have completed.
    pub async fn wait_for(&mut self, count: u64) -> Result<(), RunnerError> {
        self.completed
            .wait_for(|&done| done >= count)
            .await
            .map(|_| ())
            .map_err(|_| RunnerError::Stopped)
    }

    /// Stop scheduling new runs.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel, wait for the in-flight run, and return the number of
    /// completed runs or the error that stopped the loop.
    pub async fn shutdown(self) -> Result<u64, RunnerError> {
        self.cancel();
        match self.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(RunnerError::Task(e.to_string())),
        }
    }
}
