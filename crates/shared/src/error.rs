//! Error taxonomy shared by the dispatcher and the session controller.

use std::fmt;

/// Long-running operations a session can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Generation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Load => f.write_str("model load"),
            Operation::Generation => f.write_str("generation"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Something the user can fix: missing model, missing key, missing library.
    #[error("{0}")]
    Configuration(String),

    /// The engine or the remote service failed.
    #[error("{0}")]
    Engine(#[from] anyhow::Error),

    /// Another operation is still running.
    #[error("A {0} is already in progress")]
    Busy(Operation),
}

impl ChatError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ChatError::Configuration(_))
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, ChatError::Engine(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
