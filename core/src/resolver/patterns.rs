//! Regex families used to classify an utterance and pull out fast-path
//! hints (a parameter name/value pair, mentioned geometry kinds, and
//! dimensions).

use regex_lite::Regex;
use std::sync::LazyLock;

pub static META_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(undo|redo|save|export|reset|clear)\b").unwrap_or_else(|e| panic!("{e}")));

pub static QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what|how|where|when|why|how many)\b").unwrap_or_else(|e| panic!("{e}"))
});

pub static MODIFICATION_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(increase|decrease|reduce|change|alter|modify|set|adjust|make)\b")
        .unwrap_or_else(|e| panic!("{e}"))
});

pub static CREATION_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(create|make|add|draw|build|generate|box|cylinder|sphere|hole|flange)\b")
        .unwrap_or_else(|e| panic!("{e}"))
});

pub static PARAM_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:change|set|make)\s+([a-z_][a-z0-9_]*)\s+(?:to|=)\s*(-?\d+(?:\.\d+)?)|([a-z_][a-z0-9_]*)\s*=\s*(-?\d+(?:\.\d+)?)")
        .unwrap_or_else(|e| panic!("{e}"))
});

// `hole` is a keyword alongside the explicit dimension names: a hole's
// only natural measurement is its diameter, so callers map that capture
// to "diameter" (see `resolver::normalize_dimension_name`).
pub static DIMENSION_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(-?\d+(?:\.\d+)?)\s*mm\s+(diameter|height|thickness|radius|width|length|hole)")
        .unwrap_or_else(|e| panic!("{e}"))
});

pub static DIMENSION_BEFORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(diameter|height|thickness|radius|width|length|hole)\D{0,10}?(-?\d+(?:\.\d+)?)\s*mm")
        .unwrap_or_else(|e| panic!("{e}"))
});

pub const GEOMETRY_KINDS: &[&str] = &[
    "box", "cylinder", "sphere", "cone", "cut", "fillet", "chamfer", "hole", "flange", "sketch",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_assignment_matches_change_to_form() {
        let caps = PARAM_ASSIGNMENT
            .captures("change cylinder_height to 40")
            .expect("matches");
        assert_eq!(&caps[1], "cylinder_height");
        assert_eq!(&caps[2], "40");
    }

    #[test]
    fn param_assignment_matches_equals_form() {
        let caps = PARAM_ASSIGNMENT
            .captures("cylinder_height = 40")
            .expect("matches");
        assert_eq!(&caps[3], "cylinder_height");
        assert_eq!(&caps[4], "40");
    }

    #[test]
    fn dimension_matches_both_orderings() {
        assert!(DIMENSION_AFTER.is_match("an 8 mm hole"));
        assert!(DIMENSION_BEFORE.is_match("hole diameter 8 mm"));
    }
}
