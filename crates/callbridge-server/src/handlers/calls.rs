//! Registry listing and the explicit call-control operations.
//!
//! Control operations look the call up first (unknown ids never reach the
//! provider), then issue the provider request, and only after it succeeds
//! record the new state.

use axum::{
  Json,
  extract::{Path, State},
};
use bytes::Bytes;
use callbridge_core::{
  call::{CallRecord, CallState},
  store::CallStore,
};
use callbridge_realtime::CallControl;
use serde::Deserialize;
use serde_json::Value;

use crate::{AppState, error::Error, handlers::success};

// ─── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ReferBody {
  #[serde(default, alias = "target_uri")]
  destination: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
  #[serde(default)]
  reason:      Option<String>,
  #[serde(default)]
  status_code: Option<u16>,
}

/// Parse an optional JSON body; an empty body yields the default.
fn parse_body<T>(body: &[u8]) -> Result<T, Error>
where
  T: Default + for<'de> Deserialize<'de>,
{
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body).map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}")))
}

async fn lookup<S: CallStore>(calls: &S, call_id: &str) -> Result<CallRecord, Error> {
  calls
    .get(call_id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| {
      tracing::warn!(call_id, "control operation on unknown call");
      Error::CallNotFound(call_id.to_string())
    })
}

/// Record the outcome of a successful control operation.
async fn settle<S: CallStore>(
  calls: &S,
  call_id: &str,
  state: CallState,
) -> Result<CallRecord, Error> {
  calls
    .set_state(call_id, state)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::CallNotFound(call_id.to_string()))
}

// ─── Listing ─────────────────────────────────────────────────────────────────

pub async fn list<S, C>(
  State(state): State<AppState<S, C>>,
) -> Result<Json<Vec<CallRecord>>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let calls = state.calls.list().await.map_err(Error::store)?;
  Ok(Json(calls))
}

pub async fn get_one<S, C>(
  State(state): State<AppState<S, C>>,
  Path(call_id): Path<String>,
) -> Result<Json<CallRecord>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  state
    .calls
    .get(&call_id)
    .await
    .map_err(Error::store)?
    .map(Json)
    .ok_or(Error::CallNotFound(call_id))
}

// ─── Control ─────────────────────────────────────────────────────────────────

/// `POST /call/{call_id}/refer`: transfer the call with a SIP REFER.
pub async fn refer<S, C>(
  State(state): State<AppState<S, C>>,
  Path(call_id): Path<String>,
  body: Bytes,
) -> Result<Json<Value>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let ReferBody { destination } = parse_body(&body)?;
  let destination = destination
    .map(|d| d.trim().to_string())
    .filter(|d| !d.is_empty())
    .ok_or_else(|| Error::BadRequest("destination is required".to_string()))?;

  lookup(&*state.calls, &call_id).await?;

  if let Err(e) = state.control.refer(&call_id, &destination).await {
    tracing::error!(%call_id, operation = "refer", %destination, error = %e, "failed to transfer call");
    return Err(Error::external("refer", e));
  }

  let record = settle(&*state.calls, &call_id, CallState::Transferred).await?;
  tracing::info!(%call_id, %destination, "call transferred");
  Ok(Json(success(&record)))
}

/// `POST /call/{call_id}/reject`: decline the call.
pub async fn reject<S, C>(
  State(state): State<AppState<S, C>>,
  Path(call_id): Path<String>,
  body: Bytes,
) -> Result<Json<Value>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let RejectBody { reason, status_code } = parse_body(&body)?;
  if let Some(code) = status_code
    && !(400..=699).contains(&code)
  {
    return Err(Error::BadRequest(format!("{code} is not a SIP failure status")));
  }

  lookup(&*state.calls, &call_id).await?;

  if let Err(e) = state.control.reject(&call_id, status_code).await {
    tracing::error!(%call_id, operation = "reject", error = %e, "failed to reject call");
    return Err(Error::external("reject", e));
  }

  let record = settle(&*state.calls, &call_id, CallState::Rejected).await?;
  tracing::info!(%call_id, reason = reason.as_deref().unwrap_or("none"), status_code, "call rejected");
  Ok(Json(success(&record)))
}

/// `POST /call/{call_id}/hangup`: end the call.
pub async fn hangup<S, C>(
  State(state): State<AppState<S, C>>,
  Path(call_id): Path<String>,
) -> Result<Json<Value>, Error>
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  lookup(&*state.calls, &call_id).await?;

  if let Err(e) = state.control.hangup(&call_id).await {
    tracing::error!(%call_id, operation = "hangup", error = %e, "failed to hang up call");
    return Err(Error::external("hangup", e));
  }

  let record = settle(&*state.calls, &call_id, CallState::Ended).await?;
  tracing::info!(%call_id, "call hung up");
  Ok(Json(success(&record)))
}
