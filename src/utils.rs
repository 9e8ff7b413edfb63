/// Truncates a string to max_chars characters, appending "..." if truncated.
/// Safe for UTF-8 multi-byte characters (e.g., Japanese text).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncate_at = max_chars.saturating_sub(3);
        let byte_index = s
            .char_indices()
            .nth(truncate_at)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        format!("{}...", &s[..byte_index])
    }
}

/// Character budget for one context entry: five characters per allowed
/// word, capped at 200. A rough proxy for words, kept intentionally crude.
pub fn context_char_budget(word_limit: usize) -> usize {
    (word_limit * 5).min(200)
}
