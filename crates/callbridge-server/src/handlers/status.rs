//! `GET /status`: health and configuration report.
//!
//! Only inspects local state. It never calls out to a provider, so it stays
//! cheap enough for a load balancer to poll.

use std::collections::BTreeMap;

use axum::{Json, extract::State};
use callbridge_core::store::CallStore;
use callbridge_realtime::CallControl;
use serde::Serialize;

use crate::{AppState, config::CredentialStatus, error::Error};

#[derive(Debug, Serialize)]
pub struct StatusReport {
  pub status:            &'static str,
  /// Tracked calls that have not reached a terminal state.
  pub active_calls:      usize,
  pub total_calls:       usize,
  pub openai_configured: bool,
  pub twilio_configured: bool,
  pub sideband_enabled:  bool,
  pub credentials:       BTreeMap<&'static str, CredentialStatus>,
  pub problems:          Vec<String>,
}

pub async fn handler<S, C>(
  State(state): State<AppState<S, C>>,
) -> Result<Json<StatusReport>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let calls = state.calls.list().await.map_err(Error::store)?;
  let config = &state.config;
  let problems = config.problems();

  Ok(Json(StatusReport {
    status:            if problems.is_empty() { "healthy" } else { "degraded" },
    active_calls:      calls.iter().filter(|c| !c.state.is_terminal()).count(),
    total_calls:       calls.len(),
    openai_configured: config.openai_configured(),
    twilio_configured: config.twilio_configured(),
    sideband_enabled:  config.sideband_enabled,
    credentials:       config.credentials().into_iter().collect(),
    problems,
  }))
}
