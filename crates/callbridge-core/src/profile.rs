//! The assistant's behavior profile, supplied when accepting a call.

use serde::{Deserialize, Serialize};

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice assistant. You can:
- Answer questions and provide information
- Help with tasks and planning
- Have natural conversations
- Transfer calls if needed

Be conversational, friendly, and concise in your responses.";

const DEFAULT_GREETING: &str = "Greet the caller warmly and ask how you can help them today. \
Keep it brief and natural.";

/// Persona, voice and model used for every accepted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorProfile {
  pub instructions: String,
  pub model:        String,
  /// Output voice; the provider default is used when `None`.
  pub voice:        Option<String>,
  /// Instructions for the first response sent on the sideband session.
  /// `None` disables the greeting.
  pub greeting:     Option<String>,
}

impl Default for BehaviorProfile {
  fn default() -> Self {
    Self {
      instructions: DEFAULT_INSTRUCTIONS.to_string(),
      model:        "gpt-realtime".to_string(),
      voice:        Some("alloy".to_string()),
      greeting:     Some(DEFAULT_GREETING.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_profile_keeps_defaults() {
    let profile: BehaviorProfile =
      serde_json::from_str(r#"{"voice":"verse"}"#).unwrap();
    assert_eq!(profile.voice.as_deref(), Some("verse"));
    assert_eq!(profile.model, "gpt-realtime");
    assert!(profile.instructions.starts_with("You are a helpful voice assistant"));
  }
}
