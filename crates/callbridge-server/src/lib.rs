//! HTTP layer for callbridge.
//!
//! Exposes an axum [`Router`] that receives Twilio and realtime-provider
//! webhooks, drives calls through any [`CallControl`], and tracks them in any
//! [`CallStore`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod session;
pub mod signature;
pub mod twiml;

pub use config::BridgeConfig;
pub use error::Error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use callbridge_core::store::CallStore;
use callbridge_realtime::CallControl;
use tower_http::trace::TraceLayer;

use handlers::{calls, openai, status, twilio};

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: CallStore, C: CallControl> {
  pub calls:    Arc<S>,
  pub control:  Arc<C>,
  pub config:   Arc<BridgeConfig>,
  pub sessions: session::Sessions,
}

impl<S: CallStore, C: CallControl> AppState<S, C> {
  pub fn new(calls: S, control: C, config: BridgeConfig) -> Self {
    Self {
      calls:    Arc::new(calls),
      control:  Arc::new(control),
      config:   Arc::new(config),
      sessions: session::Sessions::default(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the bridge.
pub fn router<S, C>(state: AppState<S, C>) -> Router
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  Router::new()
    .route("/status",                   get(status::handler::<S, C>))
    .route("/calls",                    get(calls::list::<S, C>))
    .route("/call/{call_id}",           get(calls::get_one::<S, C>))
    .route("/call/{call_id}/refer",     post(calls::refer::<S, C>))
    .route("/call/{call_id}/reject",    post(calls::reject::<S, C>))
    .route("/call/{call_id}/hangup",    post(calls::hangup::<S, C>))
    .route("/webhook/openai",           post(openai::incoming::<S, C>))
    .route("/webhook/twilio",           post(twilio::handler::<S, C>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
