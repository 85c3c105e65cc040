//! Error types for `callbridge-core`.

use thiserror::Error;

use crate::call::CallState;

#[derive(Debug, Error)]
pub enum Error {
  #[error("call not found: {0}")]
  CallNotFound(String),

  #[error("call {call_id} cannot move from {from} to {to}")]
  InvalidTransition {
    call_id: String,
    from:    CallState,
    to:      CallState,
  },

  #[error("unrecognized event type: {0:?}")]
  UnrecognizedEventType(String),

  #[error("malformed event: {0}")]
  MalformedEvent(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
