//! Configuration models.
//!
//! Secrets come from `~/.config/docchat/secret.json` (loaded by the
//! interaction crate) with environment variables as fallback. Runtime
//! tunables live in [`AssistantSettings`] and may be overridden from TOML.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str = "You are adept at question answering";
pub const DEFAULT_TERMINATION_MARKER: &str = "TERMINATE";

/// Secret configuration file contents (secret.json).
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SecretConfig {
    pub openai: Option<OpenAiSecret>,
}

/// OpenAI credentials section of the secret file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OpenAiSecret {
    pub api_key: String,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Tunables for the conversation session and upload flow.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AssistantSettings {
    pub model: String,
    pub instructions: String,
    /// Literal token whose presence in a message ends the conversation.
    pub termination_marker: String,
    /// Settle window before the opening turn, letting a just-uploaded file
    /// become visible to the assistant. Best effort, not a guarantee.
    pub start_delay_ms: u64,
    pub poll: PollPolicy,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            termination_marker: DEFAULT_TERMINATION_MARKER.to_string(),
            start_delay_ms: 2_000,
            poll: PollPolicy::default(),
        }
    }
}

impl AssistantSettings {
    /// Parses settings from a TOML document; missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

/// Bounded retry policy for upload-visibility polling.
///
/// Replaces an unbounded fixed-interval wait: intervals grow geometrically
/// up to `max_interval_ms` and the whole wait is capped at `max_wait_ms`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PollPolicy {
    pub initial_interval_ms: u64,
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            backoff_factor: 2.0,
            max_interval_ms: 5_000,
            max_wait_ms: 60_000,
        }
    }
}

impl PollPolicy {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// The interval following `current`, clamped to the maximum.
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_factor).min(self.max_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = AssistantSettings::default();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.termination_marker, "TERMINATE");
        assert_eq!(settings.start_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_settings_partial_toml_override() {
        let settings = AssistantSettings::from_toml_str(
            r#"
            model = "gpt-4-1106-preview"

            [poll]
            max_wait_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(settings.model, "gpt-4-1106-preview");
        assert_eq!(settings.instructions, DEFAULT_INSTRUCTIONS);
        assert_eq!(settings.poll.max_wait(), Duration::from_secs(30));
        assert_eq!(settings.poll.backoff_factor, 2.0);
    }

    #[test]
    fn test_settings_invalid_toml_is_error() {
        assert!(AssistantSettings::from_toml_str("model = [").is_err());
    }

    #[test]
    fn test_poll_backoff_clamped() {
        let policy = PollPolicy::default();
        let mut interval = policy.initial_interval();
        for _ in 0..10 {
            interval = policy.next_interval(interval);
            assert!(interval <= policy.max_interval());
        }
        assert_eq!(interval, policy.max_interval());
    }

    #[test]
    fn test_secret_config_parse() {
        let secret: SecretConfig = serde_json::from_str(
            r#"{"openai": {"api_key": "sk-test", "model_name": "gpt-4o-mini"}}"#,
        )
        .unwrap();
        let openai = secret.openai.unwrap();
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.model_name.as_deref(), Some("gpt-4o-mini"));
    }
}
