//! Error types for listener execution, registration and configuration.

use std::path::PathBuf;

/// Outcome of a listener that did not complete normally.
///
/// [`ListenerError::Halt`] is the benign control signal: a listener
/// aborting its own work on purpose. It is swallowed without logging and
/// the remaining listeners still run. Every other variant is a fault.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The listener stopped its own execution deliberately
    #[error("listener halted")]
    Halt,
    /// The listener failed with a message
    #[error("{0}")]
    Failed(String),
    /// The listener failed with an arbitrary error source
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListenerError {
    /// Shorthand for [`ListenerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this is the silent halt signal rather than a fault.
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt)
    }
}

/// Configuration errors detected when listeners are registered.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// `must_run_instantly` is only legal on synchronous listeners
    #[error("async listener {listener} for {event} cannot be flagged must_run_instantly")]
    InstantAsyncListener {
        listener: &'static str,
        event: &'static str,
    },
}

/// Errors raised while loading or validating a [`crate::MediatorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
