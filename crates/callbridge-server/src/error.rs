//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use callbridge_realtime::ControlError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid webhook signature: {0}")]
  SignatureInvalid(String),
  #[error("call not found: {0}")]
  CallNotFound(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("unrecognized event type: {0}")]
  UnrecognizedEventType(String),
  #[error("{operation} failed upstream: {source}")]
  ExternalApi {
    operation: &'static str,
    #[source]
    source:    ControlError,
  },
  #[error("not configured: {0}")]
  Configuration(String),
  #[error("twiml error: {0}")]
  Twiml(String),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a failed call-control request. A request that never left the
  /// process for lack of credentials is a configuration problem.
  pub fn external(operation: &'static str, source: ControlError) -> Self {
    match source {
      ControlError::MissingApiKey => {
        Error::Configuration("openai_api_key is not set".to_string())
      }
      source => Error::ExternalApi { operation, source },
    }
  }

  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Store(Box::new(e))
  }
}

impl From<callbridge_core::Error> for Error {
  fn from(e: callbridge_core::Error) -> Self {
    use callbridge_core::Error as Core;
    match e {
      Core::CallNotFound(id) => Error::CallNotFound(id),
      Core::UnrecognizedEventType(t) => Error::UnrecognizedEventType(t),
      Core::MalformedEvent(msg) => Error::BadRequest(msg),
      other => Error::store(other),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
      Error::CallNotFound(_) => StatusCode::NOT_FOUND,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::UnrecognizedEventType(_) => StatusCode::UNPROCESSABLE_ENTITY,
      Error::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
      Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Twiml(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    // Signature failures stay opaque to the caller; the detail is logged.
    let message = match &self {
      Error::SignatureInvalid(_) => "invalid webhook signature".to_string(),
      other => other.to_string(),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
