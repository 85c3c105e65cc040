//! Error types for `callbridge-realtime`.

use thiserror::Error;

/// A call-control request that did not succeed upstream.
#[derive(Debug, Error)]
pub enum ControlError {
  #[error("no API key configured")]
  MissingApiKey,

  #[error("invalid API base URL: {0}")]
  InvalidUrl(String),

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("provider responded {status}: {body}")]
  Status { status: u16, body: String },
}

impl ControlError {
  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Http(e) if e.is_timeout())
  }
}

#[derive(Debug, Error)]
pub enum SidebandError {
  #[error("no API key configured")]
  MissingApiKey,

  #[error("API key is not a valid header value")]
  InvalidApiKey,

  #[error("invalid sideband URL: {0}")]
  InvalidUrl(String),

  #[error("websocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
