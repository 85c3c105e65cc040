//! Webhook signature verification and the verifying extractors.
//!
//! Both providers sign with an HMAC over the exact bytes they sent. Checks
//! run before anything else in a handler, and comparisons go through
//! [`Mac::verify_slice`], which is constant-time.

use std::collections::BTreeMap;

use axum::{
  Form,
  extract::{FromRequest, Request},
  http::{HeaderMap, Uri, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use callbridge_core::{event::WebhookEvent, store::CallStore};
use callbridge_realtime::CallControl;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::{AppState, error::Error};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

pub const WEBHOOK_ID: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE: &str = "webhook-signature";
pub const TWILIO_SIGNATURE: &str = "x-twilio-signature";

// ─── Realtime provider (Standard Webhooks) ───────────────────────────────────

/// HMAC key for a realtime webhook secret. `whsec_`-prefixed secrets carry
/// base64 key material; anything else is used as raw bytes.
fn realtime_key(secret: &str) -> Result<Vec<u8>, Error> {
  match secret.strip_prefix("whsec_") {
    Some(encoded) => B64.decode(encoded).map_err(|_| {
      Error::Configuration("openai_webhook_secret is not valid base64".to_string())
    }),
    None => Ok(secret.as_bytes().to_vec()),
  }
}

fn realtime_mac(
  secret: &str,
  id: &str,
  timestamp: &str,
  body: &[u8],
) -> Result<HmacSha256, Error> {
  let key = realtime_key(secret)?;
  let mut mac = HmacSha256::new_from_slice(&key)
    .map_err(|e| Error::Configuration(format!("openai_webhook_secret: {e}")))?;
  mac.update(id.as_bytes());
  mac.update(b".");
  mac.update(timestamp.as_bytes());
  mac.update(b".");
  mac.update(body);
  Ok(mac)
}

/// Produce a `webhook-signature` header value (`v1,<base64>`).
pub fn sign_realtime(
  secret: &str,
  id: &str,
  timestamp: &str,
  body: &[u8],
) -> Result<String, Error> {
  let mac = realtime_mac(secret, id, timestamp, body)?;
  Ok(format!("v1,{}", B64.encode(mac.finalize().into_bytes())))
}

/// Verify a realtime webhook delivery.
///
/// `webhook-signature` may list several space-separated `v1,<base64>`
/// signatures (secret rotation); one match is enough.
pub fn verify_realtime(
  headers:   &HeaderMap,
  body:      &[u8],
  secret:    &str,
  tolerance: TimeDelta,
  now:       DateTime<Utc>,
) -> Result<(), Error> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| Error::SignatureInvalid(format!("missing {name} header")))
  };
  let id = header(WEBHOOK_ID)?;
  let timestamp = header(WEBHOOK_TIMESTAMP)?;
  let signatures = header(WEBHOOK_SIGNATURE)?;

  let sent_at: i64 = timestamp.trim().parse().map_err(|_| {
    Error::SignatureInvalid(format!("timestamp {timestamp:?} is not an integer"))
  })?;
  let now_secs = now.timestamp();
  if now_secs.abs_diff(sent_at) > tolerance.num_seconds().unsigned_abs() {
    let reason = if sent_at < now_secs { "too old" } else { "too new" };
    return Err(Error::SignatureInvalid(format!("timestamp is {reason}")));
  }

  let mac = realtime_mac(secret, id, timestamp, body)?;
  let matched = signatures
    .split_whitespace()
    .filter_map(|candidate| candidate.strip_prefix("v1,"))
    .filter_map(|encoded| B64.decode(encoded).ok())
    .any(|sig| mac.clone().verify_slice(&sig).is_ok());

  if matched {
    Ok(())
  } else {
    Err(Error::SignatureInvalid("no matching v1 signature".to_string()))
  }
}

// ─── Telephony provider (Twilio) ─────────────────────────────────────────────

/// Twilio signs the full request URL followed by every POST parameter,
/// sorted by name, each as `name` immediately followed by `value`.
fn twilio_mac(
  url: &str,
  params: &BTreeMap<String, String>,
  auth_token: &str,
) -> Result<HmacSha1, Error> {
  let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
    .map_err(|e| Error::Configuration(format!("twilio_auth_token: {e}")))?;
  mac.update(url.as_bytes());
  for (name, value) in params {
    mac.update(name.as_bytes());
    mac.update(value.as_bytes());
  }
  Ok(mac)
}

/// Produce an `X-Twilio-Signature` header value.
pub fn sign_twilio(
  url: &str,
  params: &BTreeMap<String, String>,
  auth_token: &str,
) -> Result<String, Error> {
  let mac = twilio_mac(url, params, auth_token)?;
  Ok(B64.encode(mac.finalize().into_bytes()))
}

pub fn verify_twilio(
  url: &str,
  params: &BTreeMap<String, String>,
  signature: &str,
  auth_token: &str,
) -> Result<(), Error> {
  let provided = B64.decode(signature.trim()).map_err(|_| {
    Error::SignatureInvalid("X-Twilio-Signature is not base64".to_string())
  })?;
  twilio_mac(url, params, auth_token)?
    .verify_slice(&provided)
    .map_err(|_| Error::SignatureInvalid("X-Twilio-Signature mismatch".to_string()))
}

/// The URL Twilio used to reach us: `public_url` plus the request path, or
/// `https://{Host}{path}` when no public URL is configured.
fn public_request_url(
  public_url: Option<&str>,
  headers: &HeaderMap,
  uri: &Uri,
) -> Result<String, Error> {
  let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
  if let Some(base) = public_url {
    return Ok(format!("{}{path}", base.trim_end_matches('/')));
  }
  let host = headers
    .get(header::HOST)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| {
      Error::SignatureInvalid("cannot rebuild request URL without a Host header".to_string())
    })?;
  Ok(format!("https://{host}{path}"))
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// A realtime webhook whose signature has been verified, parsed into an event.
pub struct RealtimeWebhook(pub WebhookEvent);

impl<S, C> FromRequest<AppState<S, C>> for RealtimeWebhook
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  type Rejection = Error;

  async fn from_request(
    req: Request,
    state: &AppState<S, C>,
  ) -> Result<Self, Self::Rejection> {
    let secret = state
      .config
      .webhook_secret()
      .ok_or_else(|| Error::Configuration("openai_webhook_secret is not set".to_string()))?
      .to_string();
    let headers = req.headers().clone();
    let body = Bytes::from_request(req, state)
      .await
      .map_err(|e| Error::BadRequest(e.body_text()))?;

    let tolerance = state.config.webhook_tolerance().ok_or_else(|| {
      Error::Configuration("webhook_tolerance_secs is out of range".to_string())
    })?;
    if let Err(e) = verify_realtime(&headers, &body, &secret, tolerance, Utc::now()) {
      tracing::warn!(error = %e, "rejecting realtime webhook");
      return Err(e);
    }

    let event = WebhookEvent::from_realtime_json(&body).inspect_err(|e| {
      tracing::warn!(error = %e, "unusable realtime webhook payload");
    })?;
    Ok(RealtimeWebhook(event))
  }
}

/// The form fields of a Twilio webhook, after signature verification (unless
/// disabled by configuration).
pub struct TwilioWebhook(pub BTreeMap<String, String>);

impl<S, C> FromRequest<AppState<S, C>> for TwilioWebhook
where
  S: CallStore + Clone + 'static,
  C: CallControl + Clone + 'static,
{
  type Rejection = Error;

  async fn from_request(
    req: Request,
    state: &AppState<S, C>,
  ) -> Result<Self, Self::Rejection> {
    let headers = req.headers().clone();
    let uri = req.uri().clone();
    let Form(fields) = Form::<BTreeMap<String, String>>::from_request(req, state)
      .await
      .map_err(|e| Error::BadRequest(e.body_text()))?;

    if state.config.verify_twilio_signatures {
      let token = state
        .config
        .auth_token()
        .ok_or_else(|| Error::Configuration("twilio_auth_token is not set".to_string()))?;
      let result = headers
        .get(TWILIO_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::SignatureInvalid("missing X-Twilio-Signature header".to_string()))
        .and_then(|signature| {
          let url = public_request_url(state.config.public_url.as_deref(), &headers, &uri)?;
          verify_twilio(&url, &fields, signature, token)
        });
      if let Err(e) = result {
        tracing::warn!(error = %e, call_sid = fields.get("CallSid").map(String::as_str), "rejecting Twilio webhook");
        return Err(e);
      }
    }

    Ok(TwilioWebhook(fields))
  }
}
