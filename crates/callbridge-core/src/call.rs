//! Call records, the unit of state tracked by the registry.
//!
//! A record is created only after the call-control provider has accepted the
//! call. From then on its `state` moves along a small lifecycle driven either
//! by provider callbacks or by explicit control operations.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::IncomingCall;

/// Metadata key under which the Twilio `CallSid` of the originating PSTN leg
/// is stored, when the incoming SIP INVITE carried it.
pub const TWILIO_CALL_SID: &str = "twilio_call_sid";

/// Metadata key for the id of the webhook delivery that created the record.
pub const WEBHOOK_ID: &str = "webhook_id";

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a tracked call.
///
/// ```text
/// accepted ──► active ──► transferred | rejected | ended
///     └──────────────────► transferred | rejected | ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
  Accepted,
  Active,
  Transferred,
  Rejected,
  Ended,
}

impl CallState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Accepted => "accepted",
      Self::Active => "active",
      Self::Transferred => "transferred",
      Self::Rejected => "rejected",
      Self::Ended => "ended",
    }
  }

  /// No provider-driven transition leaves a terminal state.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Transferred | Self::Rejected | Self::Ended)
  }

  /// Whether a provider-driven transition from `self` to `next` is allowed.
  pub fn can_transition_to(self, next: CallState) -> bool {
    use CallState::*;
    matches!(
      (self, next),
      (Accepted, Active)
        | (Accepted | Active, Transferred | Rejected | Ended)
    )
  }
}

impl fmt::Display for CallState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One tracked phone call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
  /// Identifier assigned by the call-control provider.
  pub call_id:    String,
  pub state:      CallState,
  pub caller:     String,
  pub callee:     String,
  /// When the call was accepted.
  pub created_at: DateTime<Utc>,
  /// Additional fields lifted from the webhook payload.
  #[serde(default)]
  pub metadata:   BTreeMap<String, String>,
}

impl CallRecord {
  /// Build the record for a call the provider has just accepted.
  pub fn accepted(call: &IncomingCall, created_at: DateTime<Utc>) -> Self {
    let mut metadata: BTreeMap<String, String> = call
      .sip_headers
      .iter()
      .map(|h| (format!("sip.{}", h.name.to_ascii_lowercase()), h.value.clone()))
      .collect();

    if let Some(id) = &call.webhook_id {
      metadata.insert(WEBHOOK_ID.to_string(), id.clone());
    }
    if let Some(sid) = call.twilio_call_sid() {
      metadata.insert(TWILIO_CALL_SID.to_string(), sid.to_string());
    }

    Self {
      call_id: call.call_id.clone(),
      state: CallState::Accepted,
      caller: call.caller.clone(),
      callee: call.callee.clone(),
      created_at,
      metadata,
    }
  }
}
