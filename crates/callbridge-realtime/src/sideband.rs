//! Per-call sideband WebSocket.
//!
//! Once a SIP call has been accepted the provider exposes a WebSocket for it
//! at `{url}?call_id={id}`. We use it to send the opening greeting and to
//! observe the conversation; audio never flows through here.

use std::pin::pin;

use futures::{SinkExt as _, StreamExt as _};
use reqwest::Url;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::{
  Message,
  client::IntoClientRequest as _,
  http::{HeaderValue, header},
};

use crate::SidebandError;

/// Where and how to open the sideband for a call.
#[derive(Debug, Clone)]
pub struct SidebandConfig {
  /// e.g. `wss://api.openai.com/v1/realtime`
  pub url:     String,
  pub api_key: Option<String>,
}

/// A server event, reduced to what we act on or log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  /// The socket is open and the greeting (if any) is about to be sent.
  Opened,
  UserTranscript(String),
  AssistantTranscript(String),
  SpeechStarted,
  SpeechStopped,
  FunctionCall {
    call_id:   Option<String>,
    name:      String,
    arguments: String,
  },
  ProviderError(String),
  /// Any other event, by type.
  Other(String),
}

impl SessionEvent {
  /// Classify one JSON server event. Returns `None` for non-JSON frames or
  /// frames without a `type`.
  pub fn parse(text: &str) -> Option<Self> {
    let event: Value = serde_json::from_str(text).ok()?;
    let kind = event.get("type")?.as_str()?;
    let str_field = |v: &Value, key: &str| {
      v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
    };

    let parsed = match kind {
      "input_audio_buffer.speech_started" => Self::SpeechStarted,
      "input_audio_buffer.speech_stopped" => Self::SpeechStopped,
      "conversation.item.input_audio_transcription.completed" => {
        Self::UserTranscript(str_field(&event, "transcript"))
      }
      "response.audio_transcript.done" | "response.output_audio_transcript.done" => {
        Self::AssistantTranscript(str_field(&event, "transcript"))
      }
      "conversation.item.created" => {
        return Some(message_text(&event).unwrap_or_else(|| Self::Other(kind.to_string())));
      }
      "response.function_call_arguments.done" => Self::FunctionCall {
        call_id:   event.get("call_id").and_then(Value::as_str).map(str::to_string),
        name:      str_field(&event, "name"),
        arguments: str_field(&event, "arguments"),
      },
      "error" => {
        let error = event.get("error").cloned().unwrap_or(Value::Null);
        let message = error
          .get("message")
          .and_then(Value::as_str)
          .map(str::to_string)
          .unwrap_or_else(|| error.to_string());
        Self::ProviderError(message)
      }
      other => Self::Other(other.to_string()),
    };
    Some(parsed)
  }
}

/// Text carried by a `conversation.item.created` message item.
fn message_text(event: &Value) -> Option<SessionEvent> {
  let item = event.get("item")?;
  if item.get("type")?.as_str()? != "message" {
    return None;
  }
  item
    .get("content")?
    .as_array()?
    .iter()
    .find_map(|part| {
      let text = part.get("text").and_then(Value::as_str)?.to_string();
      match part.get("type")?.as_str()? {
        "input_text" => Some(SessionEvent::UserTranscript(text)),
        "text" | "output_text" => Some(SessionEvent::AssistantTranscript(text)),
        _ => None,
      }
    })
}

/// The `response.create` event that makes the assistant speak first.
pub fn greeting_event(instructions: &str) -> String {
  json!({
    "type": "response.create",
    "response": { "instructions": instructions },
  })
  .to_string()
}

/// Open the sideband for `call_id`, send `greeting`, and report every server
/// event to `on_event` until the provider closes the socket.
///
/// When `shutdown` resolves first, a close frame is sent and the session
/// ends normally.
pub async fn run_session<F, D>(
  config: &SidebandConfig,
  call_id: &str,
  greeting: Option<&str>,
  shutdown: D,
  mut on_event: F,
) -> Result<(), SidebandError>
where
  F: FnMut(SessionEvent) + Send,
  D: Future<Output = ()> + Send,
{
  let api_key = config
    .api_key
    .as_deref()
    .filter(|k| !k.trim().is_empty())
    .ok_or(SidebandError::MissingApiKey)?;

  let mut url =
    Url::parse(&config.url).map_err(|_| SidebandError::InvalidUrl(config.url.clone()))?;
  url.query_pairs_mut().append_pair("call_id", call_id);

  let mut request = url.as_str().into_client_request()?;
  let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
    .map_err(|_| SidebandError::InvalidApiKey)?;
  request.headers_mut().insert(header::AUTHORIZATION, bearer);

  let (socket, _) = tokio_tungstenite::connect_async(request).await?;
  let (mut sink, mut stream) = socket.split();
  on_event(SessionEvent::Opened);

  if let Some(instructions) = greeting {
    sink.send(Message::text(greeting_event(instructions))).await?;
  }

  let mut shutdown = pin!(shutdown);
  loop {
    tokio::select! {
      message = stream.next() => {
        let Some(message) = message else { break };
        match message? {
          Message::Text(text) => {
            if let Some(event) = SessionEvent::parse(text.as_str()) {
              on_event(event);
            }
          }
          Message::Close(_) => break,
          _ => {}
        }
      }
      () = &mut shutdown => {
        tracing::debug!(call_id, "closing sideband session");
        sink.send(Message::Close(None)).await?;
        break;
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use futures::{SinkExt as _, StreamExt as _};
  use tokio::{net::TcpListener, sync::oneshot};
  use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

  use super::*;

  #[test]
  fn classifies_server_events() {
    assert_eq!(
      SessionEvent::parse(r#"{"type":"input_audio_buffer.speech_started"}"#),
      Some(SessionEvent::SpeechStarted)
    );
    assert_eq!(
      SessionEvent::parse(
        r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hi there"}"#
      ),
      Some(SessionEvent::UserTranscript("hi there".into()))
    );
    assert_eq!(
      SessionEvent::parse(
        r#"{"type":"conversation.item.created","item":{"type":"message","content":[{"type":"text","text":"Hello!"}]}}"#
      ),
      Some(SessionEvent::AssistantTranscript("Hello!".into()))
    );
    assert_eq!(
      SessionEvent::parse(
        r#"{"type":"response.function_call_arguments.done","call_id":"fc_1","name":"send_email","arguments":"{}"}"#
      ),
      Some(SessionEvent::FunctionCall {
        call_id:   Some("fc_1".into()),
        name:      "send_email".into(),
        arguments: "{}".into(),
      })
    );
    assert_eq!(
      SessionEvent::parse(r#"{"type":"error","error":{"message":"bad"}}"#),
      Some(SessionEvent::ProviderError("bad".into()))
    );
    assert_eq!(
      SessionEvent::parse(r#"{"type":"session.created"}"#),
      Some(SessionEvent::Other("session.created".into()))
    );
    assert_eq!(SessionEvent::parse("not json"), None);
    assert_eq!(SessionEvent::parse(r#"{"no_type":1}"#), None);
  }

  #[tokio::test]
  async fn session_sends_greeting_and_reports_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel::<(String, Option<String>)>();
    let (greeting_tx, greeting_rx) = oneshot::channel::<String>();

    tokio::spawn(async move {
      let (tcp, _) = listener.accept().await.unwrap();
      let callback = move |req: &Request, resp: Response| {
        let auth = req
          .headers()
          .get(header::AUTHORIZATION)
          .and_then(|v| v.to_str().ok())
          .map(str::to_string);
        let _ = uri_tx.send((req.uri().to_string(), auth));
        Ok::<_, ErrorResponse>(resp)
      };
      let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();

      if let Some(Ok(Message::Text(text))) = ws.next().await {
        let _ = greeting_tx.send(text.as_str().to_string());
      }
      ws.send(Message::text(
        r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#,
      ))
      .await
      .unwrap();
      ws.close(None).await.unwrap();
    });

    let config = SidebandConfig {
      url:     format!("ws://{addr}/v1/realtime"),
      api_key: Some("sk-test".into()),
    };
    let mut events = Vec::new();
    run_session(&config, "rtc_1", Some("Say hi."), std::future::pending(), |e| events.push(e))
      .await
      .unwrap();

    assert_eq!(
      events,
      vec![
        SessionEvent::Opened,
        SessionEvent::UserTranscript("hello".into()),
      ]
    );

    let (uri, auth) = uri_rx.await.unwrap();
    assert_eq!(uri, "/v1/realtime?call_id=rtc_1");
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));

    let greeting: Value = serde_json::from_str(&greeting_rx.await.unwrap()).unwrap();
    assert_eq!(greeting["type"], "response.create");
    assert_eq!(greeting["response"]["instructions"], "Say hi.");
  }

  #[tokio::test]
  async fn shutdown_sends_close_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel::<bool>();

    tokio::spawn(async move {
      let (tcp, _) = listener.accept().await.unwrap();
      let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
      let mut saw_close = false;
      while let Some(Ok(message)) = ws.next().await {
        if matches!(message, Message::Close(_)) {
          saw_close = true;
          break;
        }
      }
      let _ = closed_tx.send(saw_close);
    });

    let config = SidebandConfig {
      url:     format!("ws://{addr}/v1/realtime"),
      api_key: Some("sk-test".into()),
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut events = Vec::new();
    let session = run_session(
      &config,
      "rtc_1",
      None,
      async move {
        let _ = stop_rx.await;
      },
      |e| events.push(e),
    );
    let stop = async move {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      let _ = stop_tx.send(());
    };
    let (result, ()) = tokio::join!(session, stop);
    result.unwrap();

    assert_eq!(events, vec![SessionEvent::Opened]);
    assert!(closed_rx.await.unwrap());
  }

  #[tokio::test]
  async fn missing_key_fails_before_connecting() {
    let config = SidebandConfig {
      url:     "ws://127.0.0.1:9/v1/realtime".into(),
      api_key: None,
    };
    let err = run_session(&config, "rtc_1", None, std::future::pending(), |_| {})
      .await
      .unwrap_err();
    assert!(matches!(err, SidebandError::MissingApiKey));
  }
}
