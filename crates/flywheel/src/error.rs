//! Error types for the task loop.

use thiserror::Error;

/// Errors raised synchronously by configuration and control operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid interval or iteration bound.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A previous run is still live.
    #[error("task is already launched and has not completed")]
    AlreadyRunning,

    /// No runtime handle was configured and none is ambient.
    #[error("no tokio runtime handle configured or available")]
    NoRuntime,
}

/// Category of a [`TaskError`], used to decide whether a failure is
/// transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Platform I/O failure. The only kind retried by default.
    Io,
    /// The operation did not complete in time.
    Timeout,
    /// A collaborator refused work but may recover.
    Unavailable,
    /// Anything else.
    Other,
}

/// A failure produced by a job or lifecycle hook.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// I/O failure.
    #[error("i/o error: {0}")]
    Io(String),

    /// Timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Temporarily unavailable.
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    /// Uncategorized failure.
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Io(_) => ErrorKind::Io,
            TaskError::Timeout(_) => ErrorKind::Timeout,
            TaskError::Unavailable(_) => ErrorKind::Unavailable,
            TaskError::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Io(err.to_string())
    }
}

/// Terminal outcome of a run, observed through its [`RunHandle`].
///
/// [`RunHandle`]: crate::RunHandle
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// The loop terminated on a fatal job or hook failure.
    #[error("task failed: {0}")]
    Failed(#[from] TaskError),

    /// The run was cancelled. Not routed through the error hook.
    #[error("task run was cancelled")]
    Cancelled,

    /// The job panicked.
    #[error("task panicked")]
    Panicked,
}
