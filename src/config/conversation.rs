use serde::{Deserialize, Serialize};

/// Conversation template; each carries a fixed word limit injected into
/// the composed brevity instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateId {
    Debate,
    Story,
    Qa,
    Brainstorm,
}

impl TemplateId {
    pub fn word_limit(self) -> usize {
        match self {
            TemplateId::Debate => 200,
            TemplateId::Story => 100,
            TemplateId::Qa => 100,
            TemplateId::Brainstorm => 100,
        }
    }
}

/// Word limit used when no template is selected.
pub const DEFAULT_WORD_LIMIT: usize = 200;

pub fn word_limit_for(template: Option<TemplateId>) -> usize {
    template.map_or(DEFAULT_WORD_LIMIT, TemplateId::word_limit)
}

/// How the activation controller treats a target tab before sending.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// Foreground the target before every send and leave it there.
    /// Simple and reliable, visually intrusive.
    Always,
    /// Send without any activation attempt. Background tabs may have
    /// their timers throttled by the host browser, so agent-side polling
    /// can stall; this is an accepted, operator-visible risk.
    Never,
    /// Briefly foreground to send and to poll, restoring the previous
    /// foreground tab each time.
    #[default]
    Hybrid,
}

/// Baseline timing for a hybrid exchange. Per-platform learned profiles
/// start from these values and stay within 0.5x-2x of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridTimeouts {
    /// Delay between foregrounding the target tab and sending, ms.
    pub activation_ms: u64,
    /// Interval between response polls, ms.
    pub check_interval_ms: u64,
    /// Delay before the first poll after sending, ms.
    pub initial_delay_ms: u64,
}

impl Default for HybridTimeouts {
    fn default() -> Self {
        Self {
            activation_ms: 1500,
            check_interval_ms: 3000,
            initial_delay_ms: 5000,
        }
    }
}

/// Per-conversation settings. Created with defaults, mutated by config
/// updates, persisted on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub auto_reply_delay_ms: u64,
    pub max_turns: usize,
    pub context_window_size: usize,
    pub initial_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateId>,
    #[serde(default)]
    pub activation_mode: ActivationMode,
    #[serde(default)]
    pub hybrid: HybridTimeouts,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            auto_reply_delay_ms: 2000,
            max_turns: 10,
            context_window_size: 6,
            initial_prompt: String::new(),
            template: None,
            activation_mode: ActivationMode::default(),
            hybrid: HybridTimeouts::default(),
        }
    }
}

impl ConversationConfig {
    pub fn word_limit(&self) -> usize {
        word_limit_for(self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_word_limits_match_table() {
        assert_eq!(TemplateId::Debate.word_limit(), 200);
        assert_eq!(TemplateId::Story.word_limit(), 100);
        assert_eq!(TemplateId::Qa.word_limit(), 100);
        assert_eq!(TemplateId::Brainstorm.word_limit(), 100);
    }

    #[test]
    fn word_limit_defaults_without_template() {
        assert_eq!(word_limit_for(None), 200);
        let config = ConversationConfig::default();
        assert_eq!(config.word_limit(), 200);
    }

    #[test]
    fn activation_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ActivationMode::Hybrid).unwrap(),
            "\"hybrid\""
        );
        let mode: ActivationMode = serde_json::from_str("\"never\"").unwrap();
        assert_eq!(mode, ActivationMode::Never);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = ConversationConfig::default();
        config.template = Some(TemplateId::Story);
        config.max_turns = 25;

        let json = serde_json::to_string(&config).unwrap();
        let back: ConversationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn config_tolerates_missing_optional_fields() {
        let json = r#"{
            "auto_reply_delay_ms": 1000,
            "max_turns": 5,
            "context_window_size": 4,
            "initial_prompt": "topic"
        }"#;
        let config: ConversationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.activation_mode, ActivationMode::Hybrid);
        assert_eq!(config.hybrid, HybridTimeouts::default());
        assert!(config.template.is_none());
    }
}
