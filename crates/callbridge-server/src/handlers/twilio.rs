//! `POST /webhook/twilio`: the PSTN leg.
//!
//! The first request for a call (no `CallStatus`, or `queued`/`ringing`) is
//! answered with TwiML that dials the realtime provider's SIP endpoint. Later
//! status callbacks move the matching record along its lifecycle.

use axum::extract::State;
use callbridge_core::{
  call::{CallState, TWILIO_CALL_SID},
  event::{CallStatusUpdate, TwilioCallStatus, WebhookEvent},
  store::CallStore,
};
use callbridge_realtime::CallControl;

use crate::{
  AppState,
  error::Error,
  signature::TwilioWebhook,
  twiml::{self, Twiml},
};

pub async fn handler<S, C>(
  State(state): State<AppState<S, C>>,
  TwilioWebhook(fields): TwilioWebhook,
) -> Result<Twiml, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let WebhookEvent::CallStatus(update) = WebhookEvent::from_twilio_form(&fields)? else {
    return Err(Error::BadRequest("expected a Twilio call event".to_string()));
  };

  match update.call_status {
    None => route(&state, &update),
    Some(status) if status.is_setup() => route(&state, &update),
    Some(TwilioCallStatus::InProgress) => {
      apply(&state, &update, CallState::Active).await;
      twiml::empty()
    }
    Some(status) if status.is_finished() => {
      apply(&state, &update, CallState::Ended).await;
      twiml::empty()
    }
    Some(status) => {
      tracing::debug!(call_sid = %update.call_sid, ?status, "ignoring call status");
      twiml::empty()
    }
  }
}

/// Send the call on to the realtime provider.
fn route<S, C>(state: &AppState<S, C>, update: &CallStatusUpdate) -> Result<Twiml, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  tracing::info!(
    call_sid = %update.call_sid,
    from = %update.from,
    to = %update.to,
    direction = update.direction.as_deref(),
    "Twilio call"
  );

  let Some(project_id) = state.config.project_id() else {
    tracing::error!(call_sid = %update.call_sid, "openai_project_id is not set; cannot route call");
    return twiml::say_and_hangup(twiml::APOLOGY);
  };

  let uri = twiml::openai_sip_uri(project_id, &update.call_sid);
  tracing::info!(call_sid = %update.call_sid, sip_uri = %uri, "routing call to realtime SIP");
  twiml::dial_sip(&uri)
}

/// Apply a status callback to the record bridged from this PSTN leg, if any.
/// Transitions the lifecycle does not allow are logged and dropped.
async fn apply<S, C>(state: &AppState<S, C>, update: &CallStatusUpdate, next: CallState)
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let call_sid = update.call_sid.as_str();
  let record = match state.calls.find_by_metadata(TWILIO_CALL_SID, call_sid).await {
    Ok(Some(record)) => record,
    Ok(None) => {
      tracing::debug!(call_sid, "status callback for an untracked call");
      return;
    }
    Err(e) => {
      tracing::error!(call_sid, error = %e, "registry lookup failed");
      return;
    }
  };

  match state.calls.transition(&record.call_id, next).await {
    Ok(Some(updated)) => {
      tracing::info!(call_id = %updated.call_id, call_sid, state = %updated.state, "call status applied");
    }
    Ok(None) => {}
    Err(e) => {
      tracing::info!(call_id = %record.call_id, call_sid, error = %e, "status callback ignored");
    }
  }
}
