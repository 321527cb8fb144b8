//! Extracts a JSON object from a chat model's response text, which is
//! frequently wrapped in markdown fences, prefixed with commentary, or
//! otherwise not quite a bare JSON document.
//!
//! Strategies are tried in order; the first one that parses wins.

use serde_json::Value;

/// Strip a leading/trailing ```json fence (or a bare ``` fence) if present.
fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_start()
            .strip_suffix("```")
            .unwrap_or(rest)
            .trim()
            .to_string()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_start()
            .strip_suffix("```")
            .unwrap_or(rest)
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strategy 2: the whole cleaned string is itself one JSON object.
fn match_whole_string(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        serde_json::from_str(trimmed).ok()
    } else {
        None
    }
}

/// Strategy 3: scan for every brace-balanced `{...}` substring and
/// return the longest one that parses.
fn longest_balanced_substring(text: &str) -> Option<Value> {
    let bytes: Vec<char> = text.chars().collect();
    let mut best: Option<(usize, usize)> = None;

    for start in 0..bytes.len() {
        if bytes[start] != '{' {
            continue;
        }
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        for end in start..bytes.len() {
            let c = bytes[end];
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let len = end - start;
                        if best.is_none_or(|(_, best_len)| len > best_len) {
                            best = Some((start, len));
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    best.and_then(|(start, len)| {
        let candidate: String = bytes[start..=start + len].iter().collect();
        serde_json::from_str(&candidate).ok()
    })
}

/// Strategy 4: walk line by line, and from each line that opens a brace
/// try extending forward until the braces balance.
fn line_by_line_balanced_span(text: &str) -> Option<Value> {
    let lines: Vec<&str> = text.lines().collect();
    for (start_idx, line) in lines.iter().enumerate() {
        if !line.contains('{') {
            continue;
        }
        let mut depth = 0i32;
        let mut buf = String::new();
        for line in &lines[start_idx..] {
            buf.push_str(line);
            buf.push('\n');
            depth += line.matches('{').count() as i32;
            depth -= line.matches('}').count() as i32;
            if depth <= 0 && buf.contains('{') {
                if let Ok(value) = serde_json::from_str(&buf) {
                    return Some(value);
                }
                break;
            }
        }
    }
    None
}

/// Strategy 5: give up and synthesise a clarification-request response
/// so the turn still completes instead of panicking downstream.
fn synthesize_clarification(raw: &str) -> Value {
    serde_json::json!({
        "intention_type": "error",
        "response_text": "I couldn't understand that response well enough to act on it. Could you rephrase your request?",
        "requires_clarification": true,
        "clarification_questions": ["Could you restate what you'd like me to build or change?"],
        "parameter_updates": {},
        "_salvage_raw_excerpt": raw.chars().take(500).collect::<String>(),
    })
}

/// Run the full salvage pipeline against a raw model response.
pub fn salvage_json(raw: &str) -> Value {
    let cleaned = strip_markdown_fences(raw);
    match_whole_string(&cleaned)
        .or_else(|| longest_balanced_substring(&cleaned))
        .or_else(|| line_by_line_balanced_span(&cleaned))
        .unwrap_or_else(|| synthesize_clarification(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence_and_parses() {
        let raw = "```json\n{\"intention_type\": \"creation\"}\n```";
        let value = salvage_json(raw);
        assert_eq!(value["intention_type"], "creation");
    }

    #[test]
    fn parses_bare_json() {
        let raw = "{\"intention_type\": \"query\"}";
        let value = salvage_json(raw);
        assert_eq!(value["intention_type"], "query");
    }

    #[test]
    fn extracts_longest_balanced_object_from_chatter() {
        let raw = "Sure! Here you go: {\"a\": {\"b\": 1}} hope that helps";
        let value = salvage_json(raw);
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn line_by_line_recovers_multiline_object_with_trailing_noise() {
        let raw = "preamble\n{\n  \"intention_type\": \"creation\"\n}\ntrailing garbage that isn't json";
        let value = salvage_json(raw);
        assert_eq!(value["intention_type"], "creation");
    }

    #[test]
    fn unsalvageable_text_becomes_a_clarification_request() {
        let value = salvage_json("complete nonsense with no braces at all");
        assert_eq!(value["intention_type"], "error");
        assert_eq!(value["requires_clarification"], true);
    }
}
