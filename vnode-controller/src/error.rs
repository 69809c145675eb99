use std::path::PathBuf;

use thiserror::Error;

use vnode_core::{CacheError, ClientError, ErrorKind, KeyError, ProviderError};
use vnode_queue::Retryable;

/// Errors that stop the whole controller. Stored in the terminal error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// A required dependency or argument is missing or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to wait for caches to sync")]
    CacheSyncFailed,

    #[error("pod controller has already been started")]
    AlreadyStarted,
}

/// Failure reconciling a single key. Scoped to that key; never fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid resource key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("failed to fetch pod {key} from the cache: {source}")]
    Cache {
        key: String,
        #[source]
        source: CacheError,
    },

    #[error("failed to {action} pod {key} in the provider: {source}")]
    Provider {
        key: String,
        action: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("failed to update status of pod {key}: {source}")]
    Client {
        key: String,
        #[source]
        source: ClientError,
    },

    /// The controller began stopping while a call for this key was pending.
    #[error("sync of pod {key} abandoned, controller is shutting down")]
    Cancelled { key: String },
}

impl SyncError {
    pub(crate) fn provider(key: impl Into<String>, action: &'static str, source: ProviderError) -> Self {
        SyncError::Provider {
            key: key.into(),
            action,
            source,
        }
    }

    /// Error category used by the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidKey(_) => ErrorKind::InvalidInput,
            SyncError::Cache { .. } => ErrorKind::Transient,
            SyncError::Provider { source, .. } => source.kind(),
            SyncError::Client { source, .. } => source.kind(),
            SyncError::Cancelled { .. } => ErrorKind::Transient,
        }
    }
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        // The queues are shut down by the time a call is abandoned.
        !matches!(self, SyncError::Cancelled { .. }) && self.kind().is_retryable()
    }
}

/// Failure loading [`ControllerConfig`](crate::ControllerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse controller config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid controller config: {0}")]
    Invalid(String),
}
