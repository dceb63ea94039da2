//! Reminder domain error taxonomy
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a reminder name was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRejection {
    Empty,
    Duplicate(String),
}

impl fmt::Display for NameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameRejection::Empty => write!(f, "name is empty"),
            NameRejection::Duplicate(name) => write!(f, "a reminder named '{name}' already exists"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("invalid name: {0}")]
    InvalidName(NameRejection),

    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("no active setup session")]
    NoActiveSession,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reminder store {} is corrupt: {source}", path.display())]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ReminderError {
    /// True for errors the user fixes by replying again; false for
    /// server-side failures that should be escalated.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            ReminderError::InvalidName(_)
                | ReminderError::InvalidSchedule { .. }
                | ReminderError::NoActiveSession
        )
    }
}
