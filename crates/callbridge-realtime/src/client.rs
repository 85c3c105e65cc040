//! Async HTTP client for the realtime provider's SIP call-control API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | accept    | `POST {base}/realtime/calls/{id}/accept` + session config |
//! | refer     | `POST {base}/realtime/calls/{id}/refer` + `{"target_uri": …}` |
//! | reject    | `POST {base}/realtime/calls/{id}/reject` [+ `{"status_code": …}`] |
//! | hangup    | `POST {base}/realtime/calls/{id}/hangup` |

use std::time::Duration;

use callbridge_core::profile::BehaviorProfile;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::{CallControl, ControlError};

/// Connection settings for the call-control API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// e.g. `https://api.openai.com/v1`
  pub api_base: String,
  pub api_key:  Option<String>,
  /// Upper bound for every request, connect included.
  pub timeout:  Duration,
}

/// HTTP implementation of [`CallControl`].
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct RealtimeClient {
  client: Client,
  config: ClientConfig,
}

// ─── Request bodies ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct AcceptBody<'a> {
  #[serde(rename = "type")]
  kind:         &'static str,
  model:        &'a str,
  instructions: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  audio:        Option<AudioConfig<'a>>,
}

#[derive(Serialize)]
struct AudioConfig<'a> {
  output: AudioOutput<'a>,
}

#[derive(Serialize)]
struct AudioOutput<'a> {
  voice: &'a str,
}

impl<'a> From<&'a BehaviorProfile> for AcceptBody<'a> {
  fn from(p: &'a BehaviorProfile) -> Self {
    AcceptBody {
      kind:         "realtime",
      model:        &p.model,
      instructions: &p.instructions,
      audio:        p.voice.as_deref().map(|voice| AudioConfig {
        output: AudioOutput { voice },
      }),
    }
  }
}

#[derive(Serialize)]
struct ReferBody {
  target_uri: String,
}

#[derive(Serialize)]
struct RejectBody {
  status_code: u16,
}

/// Turn a transfer destination into a SIP/tel URI.
///
/// Bare numbers get a `tel:` scheme; anything already carrying a scheme is
/// passed through.
pub fn target_uri(destination: &str) -> String {
  let destination = destination.trim();
  if ["tel:", "sip:", "sips:"]
    .iter()
    .any(|scheme| destination.starts_with(scheme))
  {
    destination.to_string()
  } else {
    format!("tel:{destination}")
  }
}

// ─── Client ───────────────────────────────────────────────────────────────────

impl RealtimeClient {
  pub fn new(config: ClientConfig) -> Result<Self, ControlError> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, call_id: &str, action: &str) -> Result<Url, ControlError> {
    let invalid = || ControlError::InvalidUrl(self.config.api_base.clone());
    let mut url = Url::parse(&self.config.api_base).map_err(|_| invalid())?;
    url
      .path_segments_mut()
      .map_err(|_| invalid())?
      .pop_if_empty()
      .extend(["realtime", "calls", call_id, action]);
    Ok(url)
  }

  async fn post<B: Serialize>(
    &self,
    call_id: &str,
    action: &str,
    body: Option<&B>,
  ) -> Result<(), ControlError> {
    let api_key = self
      .config
      .api_key
      .as_deref()
      .filter(|k| !k.trim().is_empty())
      .ok_or(ControlError::MissingApiKey)?;

    let mut req = self.client.post(self.url(call_id, action)?).bearer_auth(api_key);
    if let Some(body) = body {
      req = req.json(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
      tracing::debug!(%call_id, action, status = status.as_u16(), "call-control request succeeded");
      return Ok(());
    }

    let body = resp.text().await.unwrap_or_default();
    Err(ControlError::Status { status: status.as_u16(), body })
  }
}

impl CallControl for RealtimeClient {
  async fn accept(
    &self,
    call_id: &str,
    profile: &BehaviorProfile,
  ) -> Result<(), ControlError> {
    self.post(call_id, "accept", Some(&AcceptBody::from(profile))).await
  }

  async fn refer(&self, call_id: &str, destination: &str) -> Result<(), ControlError> {
    let body = ReferBody { target_uri: target_uri(destination) };
    self.post(call_id, "refer", Some(&body)).await
  }

  async fn reject(
    &self,
    call_id: &str,
    sip_status: Option<u16>,
  ) -> Result<(), ControlError> {
    let body = sip_status.map(|status_code| RejectBody { status_code });
    self.post(call_id, "reject", body.as_ref()).await
  }

  async fn hangup(&self, call_id: &str) -> Result<(), ControlError> {
    self.post::<()>(call_id, "hangup", None).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::post,
  };
  use serde_json::{Value, json};
  use tokio::net::TcpListener;

  use super::*;

  #[derive(Debug, Clone)]
  struct Seen {
    path:  String,
    auth:  Option<String>,
    body:  Option<Value>,
  }

  type Log = Arc<Mutex<Vec<Seen>>>;

  async fn provider(
    State(log): State<Log>,
    Path((call_id, action)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
  ) -> StatusCode {
    log.lock().unwrap().push(Seen {
      path: format!("/v1/realtime/calls/{call_id}/{action}"),
      auth: headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string),
      body: serde_json::from_slice(&body).ok(),
    });
    match call_id.as_str() {
      "boom" => StatusCode::NOT_FOUND,
      "slow" => {
        tokio::time::sleep(Duration::from_secs(2)).await;
        StatusCode::OK
      }
      _ => StatusCode::OK,
    }
  }

  /// Serve a fake provider on an ephemeral port and return a client for it.
  async fn fake_provider(api_key: Option<&str>) -> (RealtimeClient, Log) {
    let log: Log = Arc::default();
    let app = Router::new()
      .route("/v1/realtime/calls/{call_id}/{action}", post(provider))
      .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = RealtimeClient::new(ClientConfig {
      api_base: format!("http://{addr}/v1/"),
      api_key:  api_key.map(str::to_string),
      timeout:  Duration::from_millis(300),
    })
    .unwrap();
    (client, log)
  }

  #[tokio::test]
  async fn accept_sends_profile() {
    let (client, log) = fake_provider(Some("sk-test")).await;
    let profile = BehaviorProfile {
      instructions: "Be brief.".into(),
      model:        "gpt-realtime".into(),
      voice:        Some("verse".into()),
      greeting:     None,
    };
    client.accept("rtc_1", &profile).await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/v1/realtime/calls/rtc_1/accept");
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(
      seen[0].body,
      Some(json!({
        "type": "realtime",
        "model": "gpt-realtime",
        "instructions": "Be brief.",
        "audio": {"output": {"voice": "verse"}}
      }))
    );
  }

  #[tokio::test]
  async fn accept_without_voice_omits_audio() {
    let (client, log) = fake_provider(Some("sk-test")).await;
    let profile = BehaviorProfile { voice: None, ..BehaviorProfile::default() };
    client.accept("rtc_1", &profile).await.unwrap();
    let body = log.lock().unwrap()[0].body.clone().unwrap();
    assert!(body.get("audio").is_none());
  }

  #[tokio::test]
  async fn refer_wraps_destination_in_uri() {
    let (client, log) = fake_provider(Some("sk-test")).await;
    client.refer("rtc_1", "+1999").await.unwrap();
    let seen = log.lock().unwrap()[0].clone();
    assert_eq!(seen.path, "/v1/realtime/calls/rtc_1/refer");
    assert_eq!(seen.body, Some(json!({"target_uri": "tel:+1999"})));
  }

  #[tokio::test]
  async fn reject_and_hangup_bodies() {
    let (client, log) = fake_provider(Some("sk-test")).await;
    client.reject("rtc_1", None).await.unwrap();
    client.reject("rtc_2", Some(486)).await.unwrap();
    client.hangup("rtc_3").await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].body, None);
    assert_eq!(seen[1].body, Some(json!({"status_code": 486})));
    assert_eq!(seen[2].path, "/v1/realtime/calls/rtc_3/hangup");
    assert_eq!(seen[2].body, None);
  }

  #[tokio::test]
  async fn provider_error_is_surfaced() {
    let (client, _log) = fake_provider(Some("sk-test")).await;
    let err = client.hangup("boom").await.unwrap_err();
    assert!(matches!(err, ControlError::Status { status: 404, .. }), "{err}");
  }

  #[tokio::test]
  async fn slow_provider_times_out() {
    let (client, _log) = fake_provider(Some("sk-test")).await;
    let err = client.hangup("slow").await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
  }

  #[tokio::test]
  async fn missing_key_never_sends() {
    let (client, log) = fake_provider(None).await;
    let err = client.hangup("rtc_1").await.unwrap_err();
    assert!(matches!(err, ControlError::MissingApiKey));
    assert!(log.lock().unwrap().is_empty());
  }

  #[test]
  fn target_uri_keeps_existing_scheme() {
    assert_eq!(target_uri("+1999"), "tel:+1999");
    assert_eq!(target_uri("tel:+1999"), "tel:+1999");
    assert_eq!(target_uri("sip:desk@example.com"), "sip:desk@example.com");
  }
}
