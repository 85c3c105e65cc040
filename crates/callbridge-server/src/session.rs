//! Drives a sideband session for each accepted call and reflects it in the
//! registry.
//!
//! The socket opening means the provider has a live session for the call
//! (`active`); the socket closing means it is over (`ended`). Conversation
//! events are only logged.

use callbridge_core::{call::CallState, store::CallStore};
use callbridge_realtime::{
  CallControl,
  sideband::{self, SessionEvent},
};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::AppState;

// ─── Tracking ─────────────────────────────────────────────────────────────────

/// The set of running sideband sessions.
#[derive(Clone, Default)]
pub struct Sessions {
  shutdown: CancellationToken,
  tasks:    TaskTracker,
}

impl Sessions {
  /// Number of sessions still running.
  pub fn len(&self) -> usize { self.tasks.len() }

  pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

  /// Wait for every running session to finish on its own.
  pub async fn join(&self) {
    self.tasks.close();
    self.tasks.wait().await;
  }

  /// Close every session's socket and wait for them to wind down.
  pub async fn shutdown(&self) {
    tracing::info!(sessions = self.len(), "closing sideband sessions");
    self.shutdown.cancel();
    self.join().await;
  }
}

// ─── Monitoring ───────────────────────────────────────────────────────────────

/// Start monitoring `call_id` in the background.
pub fn spawn<S, C>(state: AppState<S, C>, call_id: String)
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let tasks = state.sessions.tasks.clone();
  tasks.spawn(monitor(state, call_id));
}

async fn monitor<S, C>(state: AppState<S, C>, call_id: String)
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  let config = state.config.sideband_config();
  let greeting = state.config.assistant.greeting.clone();

  // The socket reader reports synchronously; registry updates are async, so
  // events are handed over through a channel and applied alongside.
  let (tx, mut rx) = mpsc::unbounded_channel();
  let shutdown = state.sessions.shutdown.clone().cancelled_owned();
  let session =
    sideband::run_session(&config, &call_id, greeting.as_deref(), shutdown, move |event| {
      let _ = tx.send(event);
    });
  let apply = async {
    let mut opened = false;
    while let Some(event) = rx.recv().await {
      opened |= event == SessionEvent::Opened;
      handle(&state, &call_id, event).await;
    }
    opened
  };

  let (result, opened) = tokio::join!(session, apply);
  match result {
    Ok(()) => tracing::info!(%call_id, "sideband session closed"),
    Err(e) => tracing::warn!(%call_id, error = %e, "sideband session failed"),
  }

  if opened {
    advance(&state, &call_id, CallState::Ended).await;
  }
}

async fn handle<S, C>(state: &AppState<S, C>, call_id: &str, event: SessionEvent)
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  match event {
    SessionEvent::Opened => {
      tracing::info!(call_id, "sideband session open");
      advance(state, call_id, CallState::Active).await;
    }
    SessionEvent::UserTranscript(text) => {
      tracing::info!(call_id, transcript = %text, "caller");
    }
    SessionEvent::AssistantTranscript(text) => {
      tracing::info!(call_id, transcript = %text, "assistant");
    }
    SessionEvent::SpeechStarted => tracing::debug!(call_id, "caller started speaking"),
    SessionEvent::SpeechStopped => tracing::debug!(call_id, "caller stopped speaking"),
    SessionEvent::FunctionCall { call_id: fc_id, name, arguments } => {
      tracing::warn!(
        call_id,
        function_call_id = fc_id.as_deref(),
        function = %name,
        %arguments,
        "function call requested but no tools are configured; ignoring"
      );
    }
    SessionEvent::ProviderError(message) => {
      tracing::error!(call_id, error = %message, "realtime session error");
    }
    SessionEvent::Other(kind) => tracing::trace!(call_id, kind = %kind, "sideband event"),
  }
}

/// Provider-driven transition; anything the lifecycle forbids (the call was
/// already transferred, rejected or hung up) is left alone.
async fn advance<S, C>(state: &AppState<S, C>, call_id: &str, next: CallState)
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  match state.calls.transition(call_id, next).await {
    Ok(Some(record)) => tracing::info!(call_id, state = %record.state, "call state updated"),
    Ok(None) => tracing::debug!(call_id, "sideband event for an untracked call"),
    Err(e) => tracing::debug!(call_id, error = %e, "state update skipped"),
  }
}
