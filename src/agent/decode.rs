//! Decoding of structured LLM replies.
//!
//! Replies are treated as untrusted text and decoded in layers: strict JSON
//! extraction first, then line-oriented `KEY: value` parsing. The heuristic
//! fallbacks live with their callers; nothing downstream may depend on
//! provider-specific output quirks.

use std::collections::HashMap;

/// Extract the outermost JSON object from free-form text.
///
/// Tolerates chatter around the object and ```json code fences; returns the
/// slice from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let stripped = strip_code_fences(text);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&stripped[start..=end])
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Parse `KEY: value` lines into a map. Keys are uppercased identifiers at
/// line start; later duplicates overwrite earlier ones.
pub fn parse_tagged_lines(text: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
        {
            continue;
        }
        fields.insert(key.to_string(), value.trim().to_string());
    }

    fields
}
