use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

use crate::config::ConversationConfig;
use crate::models::HistoryEntry;
use crate::utils::{context_char_budget, truncate_str};

/// With fewer than this many prior entries eligible as context, the
/// outbound message is just the latest text (plus topic and brevity
/// instruction), with no context block.
const OPENING_HISTORY_LEN: usize = 2;

const OPENING_TEMPLATE: &str = "\
{%- if topic %}=== MAIN TOPIC ===
{{ topic }}

{% endif -%}
{{ latest }}

Please keep your reply under {{ word_limit }} words.";

const CONTINUATION_TEMPLATE: &str = "\
{%- if topic %}=== MAIN TOPIC ===
{{ topic }}

{% endif -%}
=== RECENT CONTEXT ===
{% for entry in entries -%}
{{ entry.role }}: {{ entry.content }}
{% endfor %}
=== LATEST MESSAGE (from Agent {{ from_slot }}) ===
{{ latest }}

Respond directly to the latest message and stay on the main topic.
Do not repeat earlier points; add something new to the conversation.
Please keep your reply under {{ word_limit }} words.";

#[derive(Serialize)]
struct ContextEntry {
    role: String,
    content: String,
}

/// Build the next outbound message. Pure over
/// `(history, config, latest_text, from_index)`: the same inputs always
/// produce the same string.
///
/// `history` is the full recorded log including the entry appended for
/// `latest_text`; the context window deliberately excludes that newest
/// entry.
pub fn compose(
    history: &[HistoryEntry],
    config: &ConversationConfig,
    latest_text: &str,
    from_index: usize,
) -> Result<String> {
    let past = &history[..history.len().saturating_sub(1)];
    compose_over(past, config, latest_text, from_index)
}

/// Build a message for text that is not in the log, such as an operator
/// interjection. Every recorded entry is eligible context.
pub fn compose_interjection(
    history: &[HistoryEntry],
    config: &ConversationConfig,
    latest_text: &str,
    from_index: usize,
) -> Result<String> {
    compose_over(history, config, latest_text, from_index)
}

fn compose_over(
    past: &[HistoryEntry],
    config: &ConversationConfig,
    latest_text: &str,
    from_index: usize,
) -> Result<String> {
    let word_limit = config.word_limit();
    let topic = config.initial_prompt.trim();

    let mut env = Environment::new();

    if past.len() < OPENING_HISTORY_LEN {
        env.add_template("opening", OPENING_TEMPLATE)
            .context("Failed to add opening template")?;
        let rendered = env
            .get_template("opening")
            .context("Failed to get opening template")?
            .render(minijinja::context! {
                topic => topic,
                latest => latest_text,
                word_limit => word_limit,
            })
            .context("Failed to render opening message")?;
        return Ok(rendered);
    }

    let budget = context_char_budget(word_limit);
    let window_start = past.len().saturating_sub(config.context_window_size);
    let entries: Vec<ContextEntry> = past[window_start..]
        .iter()
        .map(|entry| ContextEntry {
            role: entry.role.clone(),
            content: truncate_str(&entry.content, budget),
        })
        .collect();

    env.add_template("continuation", CONTINUATION_TEMPLATE)
        .context("Failed to add continuation template")?;
    let rendered = env
        .get_template("continuation")
        .context("Failed to get continuation template")?
        .render(minijinja::context! {
            topic => topic,
            entries => entries,
            latest => latest_text,
            from_slot => from_index + 1,
            word_limit => word_limit,
        })
        .context("Failed to render continuation message")?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateId;
    use chrono::Utc;

    fn entry(id: u64, index: usize, content: &str) -> HistoryEntry {
        HistoryEntry {
            id,
            participant_index: index,
            slot_order: index as u32 + 1,
            role: format!("Agent {}", index + 1),
            content: content.to_string(),
            timestamp: Utc::now(),
            platform: None,
        }
    }

    fn config_with_topic(topic: &str) -> ConversationConfig {
        ConversationConfig {
            initial_prompt: topic.to_string(),
            ..ConversationConfig::default()
        }
    }

    #[test]
    fn short_history_uses_latest_text_only() {
        let config = config_with_topic("");
        let history = vec![entry(1, 0, "opening line")];

        let message = compose(&history, &config, "opening line", 0).unwrap();

        assert!(message.starts_with("opening line"));
        assert!(!message.contains("RECENT CONTEXT"));
        assert!(message.contains("under 200 words"));
    }

    #[test]
    fn short_history_prefixes_main_topic() {
        let config = config_with_topic("Is tea better than coffee?");
        let history = vec![entry(1, 0, "I say tea")];

        let message = compose(&history, &config, "I say tea", 0).unwrap();

        assert!(message.starts_with("=== MAIN TOPIC ==="));
        assert!(message.contains("Is tea better than coffee?"));
        assert!(message.contains("I say tea"));
    }

    #[test]
    fn longer_history_includes_context_window() {
        let mut config = config_with_topic("topic");
        config.context_window_size = 2;
        let history = vec![
            entry(1, 0, "first"),
            entry(2, 1, "second"),
            entry(3, 0, "third"),
            entry(4, 1, "latest"),
        ];

        let message = compose(&history, &config, "latest", 1).unwrap();

        assert!(message.contains("=== RECENT CONTEXT ==="));
        // Window is the last 2 entries excluding the newest.
        assert!(!message.contains("Agent 1: first"));
        assert!(message.contains("Agent 2: second"));
        assert!(message.contains("Agent 1: third"));
        assert!(message.contains("=== LATEST MESSAGE (from Agent 2) ==="));
        assert!(message.contains("\nlatest"));
    }

    #[test]
    fn context_entries_are_truncated_but_latest_is_not() {
        let config = config_with_topic("");
        let long = "x".repeat(500);
        let history = vec![
            entry(1, 0, &long),
            entry(2, 1, "b"),
            entry(3, 0, "c"),
            entry(4, 1, &long),
        ];

        let message = compose(&history, &config, &long, 1).unwrap();

        // The untruncated latest text appears in full.
        assert!(message.contains(&long));
        // The windowed copy of the long entry is cut to the 200-char
        // budget with an ellipsis.
        let truncated = format!("{}...", "x".repeat(197));
        assert!(message.contains(&truncated));
    }

    #[test]
    fn interjection_keeps_the_newest_entry_in_context() {
        let mut config = config_with_topic("topic");
        config.context_window_size = 2;
        let history = vec![
            entry(1, 0, "first"),
            entry(2, 1, "second"),
            entry(3, 0, "third"),
        ];

        let message =
            compose_interjection(&history, &config, "steer back to the topic", 0).unwrap();

        // The newest recorded entry stays in the window; the operator
        // text is the latest message.
        assert!(message.contains("Agent 2: second"));
        assert!(message.contains("Agent 1: third"));
        assert!(message.contains("steer back to the topic"));

        // The regular path excludes the newest entry, since there it is
        // the latest message itself.
        let regular = compose(&history, &config, "third", 0).unwrap();
        assert!(!regular.contains("Agent 1: third"));
    }

    #[test]
    fn composition_is_deterministic() {
        let mut config = config_with_topic("determinism");
        config.template = Some(TemplateId::Debate);
        let history = vec![
            entry(1, 0, "a"),
            entry(2, 1, "b"),
            entry(3, 0, "c"),
            entry(4, 1, "d"),
        ];

        let first = compose(&history, &config, "d", 1).unwrap();
        let second = compose(&history, &config, "d", 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn story_template_injects_its_word_limit() {
        let mut config = config_with_topic("Once upon a time");
        config.template = Some(TemplateId::Story);

        let short = compose(&[entry(1, 0, "x")], &config, "x", 0).unwrap();
        assert!(short.contains("100"));

        let history = vec![
            entry(1, 0, "a"),
            entry(2, 1, "b"),
            entry(3, 0, "c"),
            entry(4, 1, "d"),
        ];
        let long = compose(&history, &config, "d", 1).unwrap();
        assert!(long.contains("100"));
    }

    #[test]
    fn empty_history_composes_opener() {
        let config = config_with_topic("Debate club");
        let message = compose(&[], &config, "Debate club", 0).unwrap();

        assert!(message.contains("=== MAIN TOPIC ==="));
        assert!(message.contains("under 200 words"));
    }
}
