//! Error types for fai-progress.
//!
//! All errors are strongly typed using thiserror. Load-time problems are
//! `ConfigError`s and refuse to build an engine; per-call problems are
//! `ExecutionError`s; per-line handler problems are `DispatchError`s, which the
//! ingest path recovers from by ignoring the line.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionId;

/// Errors raised while loading a rule table or building an engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Rule #{record} (action '{action}') has an empty task set")]
    EmptyTaskSet {
        record: usize,
        action: String,
    },

    #[error("Rule #{record} has an empty action name")]
    EmptyAction {
        record: usize,
    },

    #[error("Rule #{record} (action '{action}') has expected_hits {value}, must be >= 1")]
    InvalidExpectedHits {
        record: usize,
        action: String,
        value: i64,
    },

    #[error("Rule #{record} has an invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        record: usize,
        pattern: String,
        reason: String,
    },

    #[error("Rule #{record} uses unknown action '{action}'")]
    UnknownAction {
        record: usize,
        action: String,
    },

    #[error("Milestone for task '{task}' is invalid: {reason}")]
    InvalidMilestone {
        task: String,
        reason: String,
    },

    #[error("Milestone for task '{task}' is declared more than once")]
    DuplicateMilestone {
        task: String,
    },

    #[error("Directive '{name}' has an invalid pattern: {reason}")]
    InvalidDirective {
        name: &'static str,
        reason: String,
    },

    #[error("Failed to parse {format} input: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced to the caller of an engine or session operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Task '{task}' was never activated in session {session}")]
    NotActive {
        session: SessionId,
        task: String,
    },

    #[error("Session {session} has no active task")]
    NoActiveTask {
        session: SessionId,
    },

    #[error("Task '{task}' has no rules")]
    TaskNotFound {
        task: String,
    },

    #[error("Session not found: {session}")]
    SessionNotFound {
        session: SessionId,
    },

    #[error("Session already exists: {session}")]
    SessionExists {
        session: SessionId,
    },

    #[error("Session {session} is closed")]
    SessionClosed {
        session: SessionId,
    },

    #[error("Snapshot stream disconnected")]
    Disconnected,

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Errors produced by an action handler for a single classified line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No handler registered for action '{action}'")]
    UnknownAction {
        action: String,
    },

    #[error("Action '{action}' requires capture '{name}'")]
    MissingCapture {
        action: String,
        name: String,
    },

    #[error("Action '{action}' cannot use capture '{name}' = '{value}': {reason}")]
    InvalidCapture {
        action: String,
        name: String,
        value: String,
        reason: String,
    },
}

/// Top-level error type for fai-progress.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ProgressError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the session that raised this error can keep processing lines.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Internal { .. } => false,
            Self::Dispatch(_) => true,
            Self::Execution(e) => !matches!(
                e,
                ExecutionError::SessionClosed { .. } | ExecutionError::SessionNotFound { .. }
            ),
        }
    }
}

/// Result type alias for fai-progress operations.
pub type ProgressResult<T> = Result<T, ProgressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_record() {
        let err = ConfigError::InvalidExpectedHits {
            record: 3,
            action: "update_progress".to_string(),
            value: 0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("#3"));
        assert!(msg.contains("expected_hits 0"));
    }

    #[test]
    fn test_invalid_pattern_message() {
        let err = ConfigError::InvalidPattern {
            record: 0,
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("'('"));
        assert!(msg.contains("unclosed group"));
    }

    #[test]
    fn test_not_active_message() {
        let session = SessionId::new();
        let err = ExecutionError::NotActive {
            session,
            task: "partition".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("partition"));
        assert!(msg.contains(&session.to_string()));
    }

    #[test]
    fn test_progress_error_from_config() {
        let err: ProgressError = ConfigError::EmptyAction { record: 1 }.into();
        assert!(err.is_config());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_progress_error_from_dispatch() {
        let err: ProgressError = DispatchError::UnknownAction {
            action: "reboot".to_string(),
        }
        .into();
        assert!(!err.is_config());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_progress_error_recoverable() {
        let err1: ProgressError = ExecutionError::NoActiveTask {
            session: SessionId::new(),
        }
        .into();
        assert!(err1.is_execution());
        assert!(err1.is_recoverable());

        let err2: ProgressError = ExecutionError::SessionClosed {
            session: SessionId::new(),
        }
        .into();
        assert!(!err2.is_recoverable());

        let err3 = ProgressError::internal("poisoned lock");
        assert!(err3.is_internal());
        assert!(!err3.is_recoverable());
        assert!(format!("{err3}").contains("poisoned lock"));
    }
}
