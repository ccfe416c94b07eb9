//! Errors of the background runner.

use terra_erosion::ErosionError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A run failed; the loop stopped without retrying.
    #[error(transparent)]
    Job(#[from] ErosionError),

    /// The background task panicked or was aborted.
    #[error("continuous runner task failed: {0}")]
    Task(String),

    /// The loop ended before the awaited number of runs completed.
    #[error("continuous runner stopped")]
    Stopped,
}
