use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared, cloneable cause attached to user-level stage failures.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by running streams.
///
/// `Error` is `Clone` because one failure may have to be forwarded to several
/// downstream consumers (broadcast outputs) and to the run handle.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("stream error: {context}")]
    Stream { context: &'static str },

    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        source: BoxError,
    },

    #[error("stage `{stage}` gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        stage: &'static str,
        attempts: u32,
        source: Box<Error>,
    },

    #[error("protocol violation: {0}")]
    Protocol(Violation),

    #[error("subscriber requested zero elements")]
    InvalidDemand,

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("task join error: {0}")]
    Join(Arc<tokio::task::JoinError>),
}

impl Error {
    pub fn stream(context: &'static str) -> Self {
        Self::Stream { context }
    }

    /// Wrap a failure raised by user code running inside `stage`.
    pub fn stage<E>(stage: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self::Stage {
            stage,
            source: Arc::from(source.into()),
        }
    }

    pub fn retry_exhausted(stage: &'static str, attempts: u32, source: Error) -> Self {
        Self::RetryExhausted {
            stage,
            attempts,
            source: Box::new(source),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(Arc::new(err))
    }
}

/// Breaches of the publisher/subscriber contract.
///
/// These are bugs in a stage implementation, not runtime conditions. Debug
/// builds assert on them; release builds fail the stream with
/// [`Error::Protocol`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("element pushed without outstanding demand")]
    DemandExceeded,

    #[error("signal emitted after a terminal signal")]
    SignalAfterTerminal,

    #[error("publisher already has a subscriber")]
    AlreadySubscribed,
}

/// Errors raised while binding or running a graph blueprint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has unbound ends: {}", .0.join(", "))]
    OpenEnds(Vec<String>),

    #[error("no open end named `{0}`")]
    UnknownEnd(String),

    #[error("open end `{name}` is an {actual}, expected an {expected}")]
    WrongDirection {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("open end `{name}` carries `{actual}`, expected `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("open end name `{0}` is already taken")]
    DuplicateName(String),

    #[error("node `{0}` was wired with a mismatched endpoint")]
    Wiring(&'static str),
}
