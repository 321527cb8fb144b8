//! Maps a salvaged JSON value onto the engine's `LlmResponse`/`Plan`
//! types. Tolerant by design: a response missing optional fields still
//! parses, matching the required-fields-only check the prompt asks the
//! model to satisfy.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::pig::ParamValue;
use crate::types::{IntentionType, LlmResponse, Plan, PlanAstNode};

fn value_to_param(value: &Value) -> Option<ParamValue> {
    match value {
        Value::Number(n) => n.as_f64().map(ParamValue::Numeric),
        Value::Bool(b) => Some(ParamValue::Boolean(*b)),
        Value::String(s) => Some(ParamValue::Text(s.clone())),
        Value::Array(items) => {
            let nums: Option<Vec<f64>> = items.iter().map(|v| v.as_f64()).collect();
            nums.map(ParamValue::Vector)
        }
        _ => None,
    }
}

fn parse_param_map(value: &Value) -> BTreeMap<String, ParamValue> {
    let mut map = BTreeMap::new();
    if let Value::Object(obj) = value {
        for (k, v) in obj {
            if let Some(param) = value_to_param(v) {
                map.insert(k.clone(), param);
            }
        }
    }
    map
}

fn parse_ast_nodes(value: &Value) -> Vec<PlanAstNode> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            Some(PlanAstNode {
                id: obj.get("id")?.as_str()?.to_string(),
                kind: obj.get("kind")?.as_str()?.to_string(),
                operation: obj
                    .get("operation")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                parameters: obj
                    .get("parameters")
                    .map(parse_param_map)
                    .unwrap_or_default(),
                children: obj
                    .get("children")
                    .map(parse_ast_nodes)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_execution_plan(value: &Value) -> Option<Plan> {
    let obj = value.as_object()?;
    Some(Plan {
        id: obj
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        script: obj
            .get("cadquery_code")
            .or_else(|| obj.get("script"))
            .and_then(Value::as_str)
            .map(str::to_string),
        ast_nodes: obj
            .get("ast_nodes")
            .map(parse_ast_nodes)
            .unwrap_or_default(),
        parameters: obj
            .get("parameters")
            .or_else(|| obj.get("new_parameters"))
            .map(parse_param_map)
            .unwrap_or_default(),
        affected_operations: obj
            .get("affected_operations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub fn parse_llm_response(value: &Value) -> EngineResult<LlmResponse> {
    let intention_raw = value
        .get("intention_type")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::LlmMalformed("missing intention_type".into()))?;

    let intention_type = match intention_raw {
        "creation" | "new_instruction" => IntentionType::Creation,
        "modification" => IntentionType::Modification,
        "query" | "question" => IntentionType::Query,
        "meta_command" => IntentionType::MetaCommand,
        "error" => IntentionType::Error,
        other => {
            return Err(EngineError::LlmMalformed(format!(
                "unrecognised intention_type '{other}'"
            )))
        }
    };

    let response_text = value
        .get("response_text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let execution_plan = value.get("execution_plan").and_then(parse_execution_plan);

    let parameter_updates = value
        .get("parameter_updates")
        .map(parse_param_map)
        .unwrap_or_default();

    let requires_clarification = value
        .get("requires_clarification")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let clarification_questions = value
        .get("clarification_questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let confidence = value.get("confidence").and_then(Value::as_f64);

    Ok(LlmResponse {
        intention_type,
        response_text,
        execution_plan,
        parameter_updates,
        requires_clarification,
        clarification_questions,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_response() {
        let value = serde_json::json!({
            "intention_type": "creation",
            "response_text": "building it",
        });
        let response = parse_llm_response(&value).expect("parses");
        assert_eq!(response.intention_type, IntentionType::Creation);
        assert!(response.execution_plan.is_none());
    }

    #[test]
    fn parses_full_execution_plan() {
        let value = serde_json::json!({
            "intention_type": "creation",
            "response_text": "ok",
            "execution_plan": {
                "id": "plan1",
                "description": "cylinder",
                "cadquery_code": "result = cq.Workplane().cylinder(20, 10)",
                "parameters": {"radius": 10.0, "height": 20.0},
                "affected_operations": ["cyl"],
            },
        });
        let response = parse_llm_response(&value).expect("parses");
        let plan = response.execution_plan.expect("plan present");
        assert_eq!(plan.id, "plan1");
        assert_eq!(plan.parameters.len(), 2);
        assert!(plan.script.is_some());
    }

    #[test]
    fn missing_intention_type_is_malformed() {
        let value = serde_json::json!({"response_text": "oops"});
        assert!(parse_llm_response(&value).is_err());
    }
}
