//! Plan validation: a JSON-Schema pass over the raw response shape,
//! layered under semantic checks the schema can't express (per-kind
//! required parameters, identifier validity).

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::types::Plan;

/// Minimal schema for the response envelope. Deliberately permissive on
/// `execution_plan`'s internals — those are checked semantically below,
/// where the error messages can name the offending node.
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["intention_type"],
        "properties": {
            "intention_type": {
                "type": "string",
                "enum": ["creation", "new_instruction", "modification", "query", "question", "meta_command", "error"]
            },
            "response_text": { "type": "string" },
            "requires_clarification": { "type": "boolean" },
            "clarification_questions": {
                "type": "array",
                "items": { "type": "string" }
            },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        }
    })
}

pub fn validate_schema(value: &Value) -> Vec<String> {
    let schema = response_schema();
    let compiled = match JSONSchema::compile(&schema) {
        Ok(compiled) => compiled,
        Err(err) => return vec![format!("internal schema error: {err}")],
    };
    match compiled.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    }
}

const REQUIRED_PARAMS_BY_KIND: &[(&str, &[&str])] = &[
    ("box", &["length", "width", "height"]),
    ("cylinder", &["radius", "height"]),
    ("sphere", &["radius"]),
    ("extrude", &["sketch", "distance"]),
    ("cut", &["target", "tool"]),
    ("union", &["left", "right"]),
    ("fillet", &["target", "radius"]),
    ("chamfer", &["target", "distance"]),
];

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Semantic checks over an already-parsed plan: AST node shape,
/// per-operation-kind required parameters, and parameter name validity.
/// Returns one message per problem found; an empty vec means the plan
/// is valid.
pub fn validate_plan_semantics(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();

    for name in plan.parameters.keys() {
        if !is_valid_identifier(name) {
            errors.push(format!("parameter name '{name}' is not a valid identifier"));
        }
    }

    for node in &plan.ast_nodes {
        if node.id.is_empty() {
            errors.push("AST node is missing an id".to_string());
        }
        if node.kind.is_empty() {
            errors.push(format!("AST node '{}' is missing a kind", node.id));
            continue;
        }
        if let Some((_, required)) = REQUIRED_PARAMS_BY_KIND
            .iter()
            .find(|(kind, _)| *kind == node.kind)
        {
            for param in *required {
                if !node.parameters.contains_key(*param) {
                    errors.push(format!(
                        "AST node '{}' of kind '{}' is missing required parameter '{param}'",
                        node.id, node.kind
                    ));
                }
            }
        }
    }

    if plan.script.is_none() && plan.ast_nodes.is_empty() {
        errors.push("plan has neither a script nor ast_nodes".to_string());
    }

    if let Some(script) = &plan.script {
        if !script.contains("result") {
            errors.push("script must define a 'result' value".to_string());
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pig::ParamValue;
    use crate::types::PlanAstNode;
    use std::collections::BTreeMap;

    #[test]
    fn schema_rejects_missing_intention_type() {
        let value = serde_json::json!({"response_text": "hi"});
        assert!(!validate_schema(&value).is_empty());
    }

    #[test]
    fn schema_accepts_minimal_valid_envelope() {
        let value = serde_json::json!({"intention_type": "creation"});
        assert!(validate_schema(&value).is_empty());
    }

    #[test]
    fn cylinder_node_without_radius_is_rejected() {
        let mut plan = Plan::default();
        plan.ast_nodes = vec![PlanAstNode {
            id: "n0".into(),
            kind: "cylinder".into(),
            operation: None,
            parameters: BTreeMap::from([("height".into(), ParamValue::Numeric(20.0))]),
            children: vec![],
        }];
        let errors = validate_plan_semantics(&plan);
        assert!(errors.iter().any(|e| e.contains("radius")));
    }

    #[test]
    fn invalid_parameter_identifier_is_rejected() {
        let mut plan = Plan::default();
        plan.parameters
            .insert("9bad-name".into(), ParamValue::Numeric(1.0));
        plan.script = Some("result = 1".into());
        let errors = validate_plan_semantics(&plan);
        assert!(errors.iter().any(|e| e.contains("9bad-name")));
    }

    #[test]
    fn script_missing_result_assignment_is_rejected() {
        let mut plan = Plan::default();
        plan.script = Some("x = 1".into());
        let errors = validate_plan_semantics(&plan);
        assert!(errors.iter().any(|e| e.contains("result")));
    }
}
