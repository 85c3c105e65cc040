//! Parsed webhook events.
//!
//! Provider payloads are parsed into explicit variants. A realtime webhook
//! whose `type` is not one we handle is an error, never silently dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Event type sent by the realtime provider when a SIP call reaches the
/// project and is waiting to be accepted.
pub const CALL_INCOMING: &str = "realtime.call.incoming";

/// SIP header carrying the Twilio `CallSid` of the PSTN leg.
pub const TWILIO_CALL_SID_HEADER: &str = "X-Twilio-CallSid";

// ─── Event ───────────────────────────────────────────────────────────────────

/// A webhook event after signature verification and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
  /// A call is waiting to be accepted by the realtime provider.
  CallIncoming(IncomingCall),
  /// A call-progress callback from the telephony provider.
  CallStatus(CallStatusUpdate),
}

impl WebhookEvent {
  /// Parse the JSON body of a realtime provider webhook.
  pub fn from_realtime_json(body: &[u8]) -> Result<Self> {
    let raw: RawRealtimeEvent = serde_json::from_slice(body)
      .map_err(|e| Error::MalformedEvent(e.to_string()))?;

    match raw.kind.as_str() {
      CALL_INCOMING => {
        let data: IncomingCallData = serde_json::from_value(raw.data)
          .map_err(|e| Error::MalformedEvent(e.to_string()))?;
        IncomingCall::from_data(raw.id, data).map(Self::CallIncoming)
      }
      other => Err(Error::UnrecognizedEventType(other.to_string())),
    }
  }

  /// Parse the decoded form fields of a telephony provider callback.
  pub fn from_twilio_form(fields: &BTreeMap<String, String>) -> Result<Self> {
    let value = serde_json::to_value(fields)?;
    let update: CallStatusUpdate = serde_json::from_value(value)
      .map_err(|e| Error::MalformedEvent(e.to_string()))?;
    if update.call_sid.trim().is_empty() {
      return Err(Error::MalformedEvent("CallSid is empty".into()));
    }
    Ok(Self::CallStatus(update))
  }
}

// ─── Realtime provider ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawRealtimeEvent {
  #[serde(default)]
  id:   Option<String>,
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  data: Value,
}

#[derive(Deserialize)]
struct IncomingCallData {
  call_id:     String,
  #[serde(default)]
  sip_headers: Vec<SipHeader>,
  #[serde(default)]
  from:        Option<String>,
  #[serde(default)]
  to:          Option<String>,
}

/// A single SIP header forwarded by the realtime provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipHeader {
  pub name:  String,
  pub value: String,
}

/// The payload of a `realtime.call.incoming` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
  /// Delivery id from the webhook envelope.
  pub webhook_id:  Option<String>,
  pub call_id:     String,
  pub caller:      String,
  pub callee:      String,
  pub sip_headers: Vec<SipHeader>,
}

impl IncomingCall {
  fn from_data(webhook_id: Option<String>, data: IncomingCallData) -> Result<Self> {
    if data.call_id.trim().is_empty() {
      return Err(Error::MalformedEvent("call_id is empty".into()));
    }

    let header = |name: &str| {
      data
        .sip_headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| sip_user(&h.value))
    };
    let caller = data.from.clone().or_else(|| header("From")).unwrap_or_default();
    let callee = data.to.clone().or_else(|| header("To")).unwrap_or_default();

    Ok(Self {
      webhook_id,
      call_id: data.call_id,
      caller,
      callee,
      sip_headers: data.sip_headers,
    })
  }

  /// The Twilio `CallSid` forwarded as a custom SIP header, if any.
  pub fn twilio_call_sid(&self) -> Option<&str> {
    self
      .sip_headers
      .iter()
      .find(|h| h.name.eq_ignore_ascii_case(TWILIO_CALL_SID_HEADER))
      .map(|h| h.value.as_str())
  }
}

/// Extract the user part from a SIP `From`/`To` header value.
///
/// `"Alice" <sip:+15551234567@pstn.example.com>;tag=1` → `+15551234567`.
/// Values that do not look like a SIP address are returned trimmed.
pub fn sip_user(value: &str) -> String {
  let addr = match (value.find('<'), value.find('>')) {
    (Some(start), Some(end)) if start < end => &value[start + 1..end],
    _ => value,
  };
  let addr = addr.trim();
  let rest = ["sips:", "sip:", "tel:"]
    .iter()
    .find_map(|scheme| addr.strip_prefix(scheme));

  match rest {
    Some(rest) => rest
      .split(['@', ';'])
      .next()
      .unwrap_or(rest)
      .to_string(),
    None => value.trim().to_string(),
  }
}

// ─── Telephony provider ──────────────────────────────────────────────────────

/// Progress of the PSTN leg as reported by Twilio's `CallStatus` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TwilioCallStatus {
  Queued,
  Ringing,
  InProgress,
  Completed,
  Busy,
  Failed,
  NoAnswer,
  Canceled,
  #[serde(other)]
  Unknown,
}

impl TwilioCallStatus {
  /// The call is still being set up and should be routed.
  pub fn is_setup(self) -> bool {
    matches!(self, Self::Queued | Self::Ringing)
  }

  /// The PSTN leg is gone.
  pub fn is_finished(self) -> bool {
    matches!(
      self,
      Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled
    )
  }
}

/// A voice webhook or status callback from Twilio.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallStatusUpdate {
  pub call_sid:    String,
  #[serde(default)]
  pub from:        String,
  #[serde(default)]
  pub to:          String,
  #[serde(default)]
  pub call_status: Option<TwilioCallStatus>,
  #[serde(default)]
  pub direction:   Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_incoming_call_with_sip_headers() {
    let body = br#"{
      "id": "evt_1",
      "object": "event",
      "type": "realtime.call.incoming",
      "data": {
        "call_id": "rtc_C1",
        "sip_headers": [
          {"name": "From", "value": "\"Caller\" <sip:+1555@pstn.twilio.com>;tag=9"},
          {"name": "To", "value": "<sip:+1777@sip.api.openai.com>"},
          {"name": "X-Twilio-CallSid", "value": "CA42"}
        ]
      }
    }"#;
    let WebhookEvent::CallIncoming(call) = WebhookEvent::from_realtime_json(body).unwrap() else {
      panic!("expected an incoming call");
    };
    assert_eq!(call.webhook_id.as_deref(), Some("evt_1"));
    assert_eq!(call.call_id, "rtc_C1");
    assert_eq!(call.caller, "+1555");
    assert_eq!(call.callee, "+1777");
    assert_eq!(call.twilio_call_sid(), Some("CA42"));
  }

  #[test]
  fn explicit_from_and_to_win_over_headers() {
    let body = br#"{"type":"realtime.call.incoming","data":{"call_id":"C1","from":"+1555","to":"+1777"}}"#;
    let WebhookEvent::CallIncoming(call) = WebhookEvent::from_realtime_json(body).unwrap() else {
      panic!("expected an incoming call");
    };
    assert_eq!(call.caller, "+1555");
    assert_eq!(call.callee, "+1777");
    assert!(call.webhook_id.is_none());
  }

  #[test]
  fn unknown_type_fails_closed() {
    let body = br#"{"type":"batch.completed","data":{}}"#;
    assert!(matches!(
      WebhookEvent::from_realtime_json(body),
      Err(Error::UnrecognizedEventType(t)) if t == "batch.completed"
    ));
  }

  #[test]
  fn missing_call_id_is_malformed() {
    let body = br#"{"type":"realtime.call.incoming","data":{"sip_headers":[]}}"#;
    assert!(matches!(
      WebhookEvent::from_realtime_json(body),
      Err(Error::MalformedEvent(_))
    ));
    let body = br#"{"type":"realtime.call.incoming","data":{"call_id":"  "}}"#;
    assert!(matches!(
      WebhookEvent::from_realtime_json(body),
      Err(Error::MalformedEvent(_))
    ));
  }

  #[test]
  fn garbage_is_malformed() {
    assert!(matches!(
      WebhookEvent::from_realtime_json(b"not json"),
      Err(Error::MalformedEvent(_))
    ));
  }

  #[test]
  fn sip_user_variants() {
    assert_eq!(sip_user("<sip:+1555@host>;tag=x"), "+1555");
    assert_eq!(sip_user("sips:alice@example.com"), "alice");
    assert_eq!(sip_user("tel:+1999;phone-context=x"), "+1999");
    assert_eq!(sip_user(" +1555 "), "+1555");
  }

  #[test]
  fn parses_twilio_form() {
    let fields: BTreeMap<String, String> = [
      ("CallSid", "CA1"),
      ("From", "+1555"),
      ("To", "+1777"),
      ("CallStatus", "in-progress"),
      ("Direction", "inbound"),
      ("AccountSid", "AC1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let WebhookEvent::CallStatus(update) = WebhookEvent::from_twilio_form(&fields).unwrap() else {
      panic!("expected a status update");
    };
    assert_eq!(update.call_sid, "CA1");
    assert_eq!(update.call_status, Some(TwilioCallStatus::InProgress));
    assert_eq!(update.direction.as_deref(), Some("inbound"));
  }

  #[test]
  fn twilio_form_requires_call_sid() {
    let fields = BTreeMap::from([("From".to_string(), "+1555".to_string())]);
    assert!(matches!(
      WebhookEvent::from_twilio_form(&fields),
      Err(Error::MalformedEvent(_))
    ));
  }

  #[test]
  fn twilio_status_classes() {
    assert!(TwilioCallStatus::Ringing.is_setup());
    assert!(TwilioCallStatus::NoAnswer.is_finished());
    assert!(!TwilioCallStatus::InProgress.is_finished());
    let status: TwilioCallStatus = serde_json::from_str("\"something-new\"").unwrap();
    assert_eq!(status, TwilioCallStatus::Unknown);
  }
}
