//! Runtime configuration, deserialised from `config.toml` and the
//! environment.
//!
//! Every credential is optional at load time. Missing or malformed values are
//! logged at startup and reported by `GET /status`; a handler that needs one
//! answers with a configuration error instead of the process refusing to run.

use std::time::Duration;

use callbridge_core::profile::BehaviorProfile;
use chrono::TimeDelta;
use callbridge_realtime::{ClientConfig, sideband::SidebandConfig};
use serde::{Deserialize, Serialize};

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_true() -> bool { true }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_realtime_url() -> String { "wss://api.openai.com/v1/realtime".to_string() }
fn default_timeout() -> u64 { 10 }
fn default_tolerance() -> i64 { 300 }

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Deserialize, Clone)]
pub struct BridgeConfig {
  #[serde(default = "default_host")]
  pub host:                     String,
  #[serde(default = "default_port")]
  pub port:                     u16,
  /// Externally visible base URL (e.g. `https://bridge.example.com`), used to
  /// rebuild the URL Twilio signed.
  #[serde(default)]
  pub public_url:               Option<String>,

  #[serde(default)]
  pub openai_api_key:           Option<String>,
  #[serde(default)]
  pub openai_project_id:        Option<String>,
  #[serde(default)]
  pub openai_webhook_secret:    Option<String>,
  #[serde(default)]
  pub twilio_account_sid:       Option<String>,
  #[serde(default)]
  pub twilio_auth_token:        Option<String>,

  #[serde(default = "default_true")]
  pub verify_twilio_signatures: bool,
  #[serde(default = "default_api_base")]
  pub openai_api_base:          String,
  #[serde(default = "default_realtime_url")]
  pub openai_realtime_url:      String,
  #[serde(default = "default_timeout")]
  pub request_timeout_secs:     u64,
  /// Maximum clock skew accepted on signed webhooks, in seconds.
  #[serde(default = "default_tolerance")]
  pub webhook_tolerance_secs:   i64,
  /// Open the per-call sideband WebSocket after accepting a call.
  #[serde(default = "default_true")]
  pub sideband_enabled:         bool,

  #[serde(default)]
  pub assistant:                BehaviorProfile,
}

/// Presence and shape of one required credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
  pub present:     bool,
  pub well_formed: bool,
}

/// Treat blank values like missing ones.
fn non_blank(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BridgeConfig {
  pub fn api_key(&self) -> Option<&str> { non_blank(&self.openai_api_key) }
  pub fn project_id(&self) -> Option<&str> { non_blank(&self.openai_project_id) }
  pub fn webhook_secret(&self) -> Option<&str> { non_blank(&self.openai_webhook_secret) }
  pub fn account_sid(&self) -> Option<&str> { non_blank(&self.twilio_account_sid) }
  pub fn auth_token(&self) -> Option<&str> { non_blank(&self.twilio_auth_token) }

  /// Every required credential with its expected shape, in a stable order.
  fn checks(&self) -> [(&'static str, Option<&str>, Option<&'static str>); 5] {
    [
      ("openai_api_key", self.api_key(), None),
      ("openai_project_id", self.project_id(), Some("proj_")),
      ("openai_webhook_secret", self.webhook_secret(), None),
      ("twilio_account_sid", self.account_sid(), Some("AC")),
      ("twilio_auth_token", self.auth_token(), None),
    ]
  }

  pub fn credentials(&self) -> Vec<(&'static str, CredentialStatus)> {
    self
      .checks()
      .into_iter()
      .map(|(name, value, prefix)| {
        let well_formed = value.is_some_and(|v| prefix.is_none_or(|p| v.starts_with(p)));
        (name, CredentialStatus { present: value.is_some(), well_formed })
      })
      .collect()
  }

  /// Accepted clock skew on realtime webhooks; `None` when the configured
  /// value is negative or too large to represent.
  pub fn webhook_tolerance(&self) -> Option<TimeDelta> {
    if self.webhook_tolerance_secs < 0 {
      return None;
    }
    TimeDelta::try_seconds(self.webhook_tolerance_secs)
  }

  /// Human-readable description of every missing or malformed credential
  /// and every out-of-range setting.
  pub fn problems(&self) -> Vec<String> {
    let mut problems: Vec<String> = self
      .checks()
      .into_iter()
      .filter_map(|(name, value, prefix)| match (value, prefix) {
        (None, _) => Some(format!("{name} is not set")),
        (Some(v), Some(p)) if !v.starts_with(p) => {
          Some(format!("{name} should start with {p:?}"))
        }
        _ => None,
      })
      .collect();
    if self.webhook_tolerance().is_none() {
      problems.push(format!(
        "webhook_tolerance_secs {} is out of range",
        self.webhook_tolerance_secs
      ));
    }
    problems
  }

  fn well_formed(&self, name: &str) -> bool {
    self
      .credentials()
      .into_iter()
      .any(|(n, status)| n == name && status.well_formed)
  }

  pub fn openai_configured(&self) -> bool {
    ["openai_api_key", "openai_project_id", "openai_webhook_secret"]
      .iter()
      .all(|name| self.well_formed(name))
  }

  pub fn twilio_configured(&self) -> bool {
    ["twilio_account_sid", "twilio_auth_token"]
      .iter()
      .all(|name| self.well_formed(name))
  }

  pub fn client_config(&self) -> ClientConfig {
    ClientConfig {
      api_base: self.openai_api_base.clone(),
      api_key:  self.api_key().map(str::to_string),
      timeout:  Duration::from_secs(self.request_timeout_secs),
    }
  }

  pub fn sideband_config(&self) -> SidebandConfig {
    SidebandConfig {
      url:     self.openai_realtime_url.clone(),
      api_key: self.api_key().map(str::to_string),
    }
  }

  /// Log each credential (masked) and each problem.
  pub fn log_summary(&self) {
    for (name, value, _) in self.checks() {
      match value {
        Some(v) => tracing::info!(setting = name, value = %mask(v), "credential set"),
        None => tracing::error!(setting = name, "credential missing"),
      }
    }
    for problem in self.problems() {
      tracing::error!("{problem}");
    }
    if self.verify_twilio_signatures && self.public_url.is_none() {
      tracing::warn!("public_url not set; Twilio signatures will be checked against the Host header");
    }
    tracing::info!(
      model = %self.assistant.model,
      voice = self.assistant.voice.as_deref().unwrap_or("default"),
      sideband = self.sideband_enabled,
      "assistant profile loaded"
    );
  }
}

/// Show the first and last four characters of a secret.
pub fn mask(value: &str) -> String {
  let chars: Vec<char> = value.chars().collect();
  if chars.len() > 8 {
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
  } else {
    "***".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> BridgeConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn defaults_apply_to_empty_config() {
    let cfg = from_toml("");
    assert_eq!(cfg.host, "0.0.0.0");
    assert_eq!(cfg.port, 8000);
    assert!(cfg.verify_twilio_signatures);
    assert!(cfg.sideband_enabled);
    assert_eq!(cfg.webhook_tolerance_secs, 300);
    assert_eq!(cfg.assistant, BehaviorProfile::default());
    assert!(!cfg.openai_configured());
    assert!(!cfg.twilio_configured());
    assert_eq!(cfg.problems().len(), 5);
  }

  #[test]
  fn complete_config_is_configured() {
    let cfg = from_toml(
      r#"
      openai_api_key = "sk-abc"
      openai_project_id = "proj_123"
      openai_webhook_secret = "whsec_c2VjcmV0"
      twilio_account_sid = "AC123"
      twilio_auth_token = "token"

      [assistant]
      voice = "verse"
      "#,
    );
    assert!(cfg.openai_configured());
    assert!(cfg.twilio_configured());
    assert!(cfg.problems().is_empty());
    assert_eq!(cfg.assistant.voice.as_deref(), Some("verse"));
    assert_eq!(cfg.assistant.model, "gpt-realtime");
  }

  #[test]
  fn malformed_and_blank_values_are_reported() {
    let cfg = from_toml(
      r#"
      openai_api_key = "   "
      openai_project_id = "123"
      openai_webhook_secret = "s"
      twilio_account_sid = "XX123"
      twilio_auth_token = "t"
      "#,
    );
    let creds = cfg.credentials();
    assert_eq!(creds[0], ("openai_api_key", CredentialStatus { present: false, well_formed: false }));
    assert_eq!(creds[1], ("openai_project_id", CredentialStatus { present: true, well_formed: false }));
    assert!(!cfg.openai_configured());
    assert!(!cfg.twilio_configured());
    let problems = cfg.problems();
    assert!(problems.iter().any(|p| p.contains("openai_project_id")));
    assert!(problems.iter().any(|p| p.contains("twilio_account_sid")));
    assert!(problems.iter().any(|p| p.contains("openai_api_key")));
  }

  #[test]
  fn out_of_range_tolerance_is_a_problem() {
    let cfg = from_toml("webhook_tolerance_secs = 300");
    assert_eq!(cfg.webhook_tolerance(), Some(TimeDelta::seconds(300)));

    for value in [i64::MAX, -1] {
      let cfg = from_toml(&format!("webhook_tolerance_secs = {value}"));
      assert_eq!(cfg.webhook_tolerance(), None);
      assert!(cfg.problems().iter().any(|p| p.contains("webhook_tolerance_secs")));
    }
  }

  #[test]
  fn mask_hides_secrets() {
    assert_eq!(mask("sk-1234567890"), "sk-1...7890");
    assert_eq!(mask("short"), "***");
  }
}
