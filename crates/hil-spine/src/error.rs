use thiserror::Error;

use crate::lifecycle::LifecycleState;
use crate::params::ParamPosition;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeError {
    /// The host handed over a parameter list of the wrong length.
    #[error("expected {expected} parameters, got {actual}")]
    ConfigurationMismatch { expected: usize, actual: usize },

    #[error("parameter {position:?} is invalid: {reason}")]
    InvalidParameter {
        position: ParamPosition,
        reason: String,
    },

    /// `connect()` reported failure; the board never received a command.
    #[error("board on {port} did not answer the connection request")]
    ConnectionFailure { port: String },

    #[error("{operation} is not allowed while {state:?}")]
    LifecycleViolation {
        operation: &'static str,
        state: LifecycleState,
    },
}

impl BridgeError {
    pub(crate) fn invalid(position: ParamPosition, reason: impl Into<String>) -> Self {
        BridgeError::InvalidParameter {
            position,
            reason: reason.into(),
        }
    }

    /// True for errors raised before any device access took place.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ConfigurationMismatch { .. } | BridgeError::InvalidParameter { .. }
        )
    }
}
