use std::io;
use std::time::Duration;

use crate::converter::ConversionResult;

/// Errors that abort a run. Per-job failures are reported through
/// `ConversionResult` instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user asked us to stop. `completed` holds every result that was
    /// produced before the interruption.
    #[error("conversion interrupted ({} job(s) finished)", completed.len())]
    Interrupted { completed: Vec<ConversionResult> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("unable to register signal handler: {0}")]
    Signal(io::Error),
}

impl Error {
    pub fn interrupted() -> Self {
        Error::Interrupted { completed: vec![] }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of a short-lived probe invocation.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("error running {program}: {source}")]
    Io { program: String, source: io::Error },
}
