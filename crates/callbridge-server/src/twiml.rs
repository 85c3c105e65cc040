//! TwiML generation for Twilio voice webhooks, via `quick-xml`'s writer API.

use std::io::Cursor;

use axum::{
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::error::Error;

pub const CONTENT_TYPE_TWIML: &str = "application/xml";

pub const APOLOGY: &str =
  "Sorry, there was an error processing your call. Please try again later.";

/// The realtime provider's SIP endpoint for a project, carrying the Twilio
/// `CallSid` as a custom SIP header so the two legs can be correlated.
pub fn openai_sip_uri(project_id: &str, call_sid: &str) -> String {
  format!("sip:{project_id}@sip.api.openai.com;transport=tls?X-Twilio-CallSid={call_sid}")
}

/// A rendered TwiML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
  fn into_response(self) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE_TWIML)], self.0).into_response()
  }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

struct TwimlBuilder {
  writer: Writer<Cursor<Vec<u8>>>,
}

fn xml_err(e: impl std::fmt::Display) -> Error { Error::Twiml(e.to_string()) }

impl TwimlBuilder {
  fn new() -> Result<Self, Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
      .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
      .map_err(xml_err)?;
    Ok(Self { writer })
  }

  fn start(&mut self, name: &str) -> Result<&mut Self, Error> {
    self
      .writer
      .write_event(Event::Start(BytesStart::new(name)))
      .map_err(xml_err)?;
    Ok(self)
  }

  fn end(&mut self, name: &str) -> Result<&mut Self, Error> {
    self
      .writer
      .write_event(Event::End(BytesEnd::new(name)))
      .map_err(xml_err)?;
    Ok(self)
  }

  fn empty(&mut self, name: &str) -> Result<&mut Self, Error> {
    self
      .writer
      .write_event(Event::Empty(BytesStart::new(name)))
      .map_err(xml_err)?;
    Ok(self)
  }

  fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, Error> {
    self.start(name)?;
    self
      .writer
      .write_event(Event::Text(BytesText::new(text)))
      .map_err(xml_err)?;
    self.end(name)
  }

  fn finish(self) -> Result<Twiml, Error> {
    String::from_utf8(self.writer.into_inner().into_inner())
      .map(Twiml)
      .map_err(xml_err)
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// `<Response><Dial><Sip>{uri}</Sip></Dial></Response>`
pub fn dial_sip(uri: &str) -> Result<Twiml, Error> {
  let mut b = TwimlBuilder::new()?;
  b.start("Response")?
    .start("Dial")?
    .text_element("Sip", uri)?
    .end("Dial")?
    .end("Response")?;
  b.finish()
}

/// Speak `message`, then hang up.
pub fn say_and_hangup(message: &str) -> Result<Twiml, Error> {
  let mut b = TwimlBuilder::new()?;
  b.start("Response")?
    .text_element("Say", message)?
    .empty("Hangup")?
    .end("Response")?;
  b.finish()
}

/// `<Response/>`: acknowledge a status callback without instructions.
pub fn empty() -> Result<Twiml, Error> {
  let mut b = TwimlBuilder::new()?;
  b.empty("Response")?;
  b.finish()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dial_escapes_the_uri() {
    let uri = openai_sip_uri("proj_123", "CA1");
    let Twiml(xml) = dial_sip(&uri).unwrap();
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(xml.contains(
      "<Response><Dial><Sip>sip:proj_123@sip.api.openai.com;transport=tls?X-Twilio-CallSid=CA1</Sip></Dial></Response>"
    ), "{xml}");

    let Twiml(xml) = dial_sip("sip:a@b?x=1&y=2").unwrap();
    assert!(xml.contains("x=1&amp;y=2"), "{xml}");
  }

  #[test]
  fn apology_hangs_up() {
    let Twiml(xml) = say_and_hangup(APOLOGY).unwrap();
    assert!(xml.contains(&format!("<Say>{APOLOGY}</Say><Hangup/></Response>")), "{xml}");
  }

  #[test]
  fn empty_response() {
    let Twiml(xml) = empty().unwrap();
    assert!(xml.ends_with("<Response/>"), "{xml}");
  }
}
