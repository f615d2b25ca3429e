//! Error types for adokit

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdoError {
    /// Network or decoding failure. Never retried by the core.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no {kind} found with identifier {identifier}")]
    NotFound { kind: String, identifier: String },

    #[error("{count} {kind} resources are named {name}")]
    Ambiguous {
        kind: String,
        name: String,
        count: usize,
    },

    #[error("failed to create {kind}: {message}")]
    Creation { kind: String, message: String },

    #[error("failed to update {kind} {identity}: {message}")]
    Update {
        kind: String,
        identity: String,
        message: String,
    },

    #[error("failed to delete {kind} {identity}: {message}")]
    Deletion {
        kind: String,
        identity: String,
        message: String,
    },

    #[error("job {job} still running after {elapsed:?}")]
    TimedOut { job: String, elapsed: Duration },

    #[error("permission denied ({status}): {message}")]
    Permission { status: u16, message: String },

    #[error("{kind} does not support {operation}")]
    Unsupported {
        kind: String,
        operation: &'static str,
    },

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("invalid resource definition: {0}")]
    Registry(String),

    #[error("state file error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AdoError>;

impl AdoError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn not_found(kind: impl Into<String>, identifier: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            identifier: identifier.to_string(),
        }
    }

    pub fn creation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Creation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn update(kind: impl Into<String>, identity: impl ToString, message: impl Into<String>) -> Self {
        Self::Update {
            kind: kind.into(),
            identity: identity.to_string(),
            message: message.into(),
        }
    }

    pub fn deletion(
        kind: impl Into<String>,
        identity: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Deletion {
            kind: kind.into(),
            identity: identity.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Transport-level failures are the only errors the polling engine raises.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for AdoError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<url::ParseError> for AdoError {
    fn from(err: url::ParseError) -> Self {
        Self::Transport(format!("invalid url: {}", err))
    }
}
