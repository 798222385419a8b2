use std::fmt;

/// Errors a computation can return to its executor.
#[derive(Debug)]
pub enum Error {
    /// Ask the executor to run the computation again after a backoff,
    /// keeping the current computation and its cache alive.
    Retry,

    /// Any other failure. The executor stops and performs no further runs.
    Computation(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error as a fatal computation failure.
    pub fn computation(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Computation(err.into())
    }

    /// Whether this is the retry sentinel.
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::Retry)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Retry => write!(f, "retry"),
            Error::Computation(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Retry => None,
            Error::Computation(err) => Some(err.as_ref()),
        }
    }
}
