//! Classifies a raw utterance into an intention and extracts the
//! fast-path hints the orchestrator needs to skip the LLM entirely for
//! a simple parameter edit.

pub mod patterns;

use crate::pig::ParamValue;
use crate::types::IntentionType;

#[derive(Debug, Clone, Default)]
pub struct ResolvedHints {
    pub parameter_edit: Option<(String, f64)>,
    pub mentioned_geometry: Vec<String>,
    pub mentioned_dimensions: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub intention_type: IntentionType,
    pub hints: ResolvedHints,
}

/// Ordered classification: first matching family wins. Falls through to
/// `Creation` when nothing matches, matching the source implementation's
/// bias toward treating ambiguous input as a new-object request.
pub fn resolve(utterance: &str) -> Resolved {
    let lower = utterance.to_ascii_lowercase();

    let intention_type = if patterns::META_COMMAND.is_match(&lower) {
        IntentionType::MetaCommand
    } else if patterns::QUESTION.is_match(&lower) {
        IntentionType::Query
    } else if patterns::MODIFICATION_VERB.is_match(&lower) {
        IntentionType::Modification
    } else if patterns::CREATION_VERB.is_match(&lower) {
        IntentionType::Creation
    } else {
        IntentionType::Creation
    };

    let hints = extract_hints(&lower, &intention_type);
    Resolved {
        intention_type,
        hints,
    }
}

fn extract_hints(lower: &str, intention_type: &IntentionType) -> ResolvedHints {
    let mut hints = ResolvedHints::default();

    if matches!(intention_type, IntentionType::Modification) {
        if let Some(caps) = patterns::PARAM_ASSIGNMENT.captures(lower) {
            let (name, value) = if caps.get(1).is_some() {
                (caps.get(1), caps.get(2))
            } else {
                (caps.get(3), caps.get(4))
            };
            if let (Some(name), Some(value)) = (name, value) {
                if let Ok(parsed) = value.as_str().parse::<f64>() {
                    hints.parameter_edit = Some((name.as_str().to_string(), parsed));
                }
            }
        }
    }

    for kind in patterns::GEOMETRY_KINDS {
        if lower.contains(kind) {
            hints.mentioned_geometry.push((*kind).to_string());
        }
    }

    for caps in patterns::DIMENSION_AFTER.captures_iter(lower) {
        if let (Ok(value), Some(dim)) = (caps[1].parse::<f64>(), caps.get(2)) {
            hints
                .mentioned_dimensions
                .push((normalize_dimension_name(dim.as_str()), value));
        }
    }
    for caps in patterns::DIMENSION_BEFORE.captures_iter(lower) {
        if let (Some(dim), Ok(value)) = (caps.get(1), caps[2].parse::<f64>()) {
            hints
                .mentioned_dimensions
                .push((normalize_dimension_name(dim.as_str()), value));
        }
    }

    hints
}

/// A bare `hole` keyword next to a measurement means its diameter — a
/// hole has no other natural dimension to quote in millimetres.
fn normalize_dimension_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("hole") {
        "diameter".to_string()
    } else {
        name.to_string()
    }
}

/// Convert an extracted fast-path hint into a typed parameter value.
pub fn hint_to_param_value(value: f64) -> ParamValue {
    ParamValue::Numeric(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_creation_utterance() {
        let resolved = resolve("Create a cylinder with radius 10 and height 20");
        assert_eq!(resolved.intention_type, IntentionType::Creation);
        assert!(resolved.hints.mentioned_geometry.contains(&"cylinder".to_string()));
    }

    #[test]
    fn classifies_modification_and_extracts_parameter_edit() {
        let resolved = resolve("change cylinder_height to 40");
        assert_eq!(resolved.intention_type, IntentionType::Modification);
        assert_eq!(
            resolved.hints.parameter_edit,
            Some(("cylinder_height".to_string(), 40.0))
        );
    }

    #[test]
    fn classifies_question() {
        let resolved = resolve("what is the volume of this part?");
        assert_eq!(resolved.intention_type, IntentionType::Query);
    }

    #[test]
    fn classifies_meta_command() {
        let resolved = resolve("undo that last change");
        assert_eq!(resolved.intention_type, IntentionType::MetaCommand);
    }

    #[test]
    fn extracts_dimension_mentions_both_orderings() {
        let resolved = resolve("add an 8 mm hole through it");
        assert!(resolved
            .hints
            .mentioned_dimensions
            .contains(&("diameter".to_string(), 8.0)));
    }
}
