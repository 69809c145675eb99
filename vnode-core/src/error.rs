//! Error types shared by the engine and its collaborators.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure category reported across the provider boundary.
///
/// The engine's retry policy dispatches on this tag only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The object does not exist. Expected and terminal.
    NotFound,
    /// The request can never succeed as issued.
    InvalidInput,
    /// Worth retrying later.
    Transient,
    /// Cause not classified by the provider; retried like `Transient`.
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Unknown)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::InvalidInput => write!(f, "invalid input"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error returned by a workload provider.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Error returned by the cluster API client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{key} not found")]
    NotFound { key: String },

    /// The write raced another writer; re-reading and retrying resolves it.
    #[error("conflict writing {key}: {message}")]
    Conflict { key: String, message: String },

    #[error("cluster API error: {0}")]
    Api(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Conflict { .. } => ErrorKind::Transient,
            ClientError::Api(_) => ErrorKind::Unknown,
        }
    }
}

/// Failure reading the local cache mirror, other than plain absence.
#[derive(Debug, Error)]
#[error("cache lookup failed for {key}: {message}")]
pub struct CacheError {
    pub key: String,
    pub message: String,
}

/// A queue token that does not name an object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("unexpected key format: {0:?}")]
    Malformed(String),

    #[error("key {0:?} has an empty name")]
    EmptyName(String),
}
