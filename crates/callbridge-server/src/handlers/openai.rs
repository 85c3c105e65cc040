//! `POST /webhook/openai`: calls arriving at the realtime provider.

use axum::{Json, extract::State};
use callbridge_core::{call::CallRecord, event::WebhookEvent, store::CallStore};
use callbridge_realtime::CallControl;
use chrono::Utc;
use serde_json::{Value, json};

use crate::{AppState, error::Error, session, signature::RealtimeWebhook};

/// Accept an incoming call and start tracking it.
///
/// The record is inserted only once the provider has confirmed the accept, so
/// a failed accept leaves the registry untouched. Redelivered webhooks for a
/// call we already track are acknowledged without a second accept.
pub async fn incoming<S, C>(
  State(state): State<AppState<S, C>>,
  RealtimeWebhook(event): RealtimeWebhook,
) -> Result<Json<Value>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let WebhookEvent::CallIncoming(call) = event else {
    return Err(Error::BadRequest(
      "only realtime call events are accepted here".to_string(),
    ));
  };
  let call_id = call.call_id.as_str();
  tracing::info!(
    call_id,
    caller = %call.caller,
    callee = %call.callee,
    twilio_call_sid = call.twilio_call_sid(),
    "incoming call"
  );

  if let Some(existing) = state.calls.get(call_id).await.map_err(Error::store)? {
    tracing::info!(call_id, state = %existing.state, "duplicate incoming-call webhook");
    return Ok(Json(accepted(&existing, true)));
  }

  if let Err(e) = state.control.accept(call_id, &state.config.assistant).await {
    tracing::error!(call_id, operation = "accept", error = %e, "failed to accept call");
    return Err(Error::external("accept", e));
  }

  let insertion = state
    .calls
    .insert(CallRecord::accepted(&call, Utc::now()))
    .await
    .map_err(Error::store)?;

  if insertion.is_inserted() {
    tracing::info!(call_id, "call accepted");
    if state.config.sideband_enabled {
      session::spawn(state.clone(), call.call_id.clone());
    }
  }

  Ok(Json(accepted(insertion.record(), !insertion.is_inserted())))
}

fn accepted(record: &CallRecord, duplicate: bool) -> Value {
  json!({
    "status":    "accepted",
    "call_id":   record.call_id,
    "state":     record.state,
    "duplicate": duplicate,
  })
}
