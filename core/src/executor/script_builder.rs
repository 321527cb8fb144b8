//! Turns a [`Plan`](crate::types::Plan) into a complete, runnable script:
//! imports, a parameters block, the operations block (either the plan's
//! own script or a rendering of its AST nodes), and a tail block that
//! tessellates `result` and prints the sentinel line the sandbox looks
//! for on stdout.

use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::pig::{Operation, ParamValue, Pig};
use crate::types::{Plan, PlanAstNode};

const FORBIDDEN_SELECTORS: &[&str] = &["|X", "|Y", "|Z"];

/// Reject edge selectors the prompt-engineering layer has found
/// unreliable before a script ever reaches a subprocess.
pub fn check_forbidden_selectors(script: &str) -> EngineResult<()> {
    for selector in FORBIDDEN_SELECTORS {
        if script.contains(selector) {
            return Err(EngineError::ExecFailure {
                msg: format!("script uses forbidden edge selector '{selector}'"),
                traceback: String::new(),
            });
        }
    }
    Ok(())
}

fn render_param_literal(value: &ParamValue) -> String {
    match value {
        ParamValue::Numeric(v) => format!("{v}"),
        ParamValue::Boolean(v) => (if *v { "True" } else { "False" }).to_string(),
        ParamValue::Text(v) => format!("{v:?}"),
        ParamValue::Vector(v) => {
            let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

fn render_parameters_block(parameters: &BTreeMap<String, ParamValue>) -> String {
    let mut lines = vec!["# parameters".to_string()];
    for (name, value) in parameters {
        lines.push(format!("{name} = {}", render_param_literal(value)));
    }
    lines.join("\n")
}

/// Render AST-style top level nodes into an operations block. Multiple
/// untied top-level primitives are unioned left-to-right, with a comment
/// explaining why `result` ended up built from more than one node.
fn render_ast_nodes(nodes: &[PlanAstNode]) -> String {
    let mut lines = Vec::new();
    let mut result_names = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        let local_result = format!("_node{i}");
        let op = Operation::from_ast_node(node);
        lines.push(op.render(&local_result));
        result_names.push(local_result);
    }

    match result_names.as_slice() {
        [] => {}
        [only] => lines.push(format!("result = {only}")),
        many => {
            lines.push(
                "# multiple top-level primitives with no explicit union: \
                 unioned left-to-right in declaration order"
                    .to_string(),
            );
            let mut acc = many[0].clone();
            for name in &many[1..] {
                let next = format!("{acc}.union({name})");
                acc = next;
            }
            lines.push(format!("result = {acc}"));
        }
    }
    lines.join("\n")
}

const TAIL_BLOCK: &str = r#"
import json
import sys

if "result" in dir():
    _bbox = result.val().BoundingBox()
    _payload = {
        "bbox": {
            "min": [_bbox.xmin, _bbox.ymin, _bbox.zmin],
            "max": [_bbox.xmax, _bbox.ymax, _bbox.zmax],
        },
        "volume": result.val().Volume(),
        "center_of_mass": list(result.val().Center().toTuple()),
    }
    print("EXECUTION_SUCCESS")
    print(json.dumps(_payload))
else:
    print("EXECUTION_ERROR:no result produced", file=sys.stderr)
"#;

pub fn assemble_script(plan: &Plan) -> String {
    let mut sections = vec!["import cadquery as cq".to_string()];
    sections.push(render_parameters_block(&plan.parameters));

    let operations_block = match &plan.script {
        Some(script) => reindent(script),
        None => render_ast_nodes(&plan.ast_nodes),
    };
    sections.push(operations_block);
    sections.push(TAIL_BLOCK.trim_end().to_string());

    sections.join("\n\n")
}

fn reindent(script: &str) -> String {
    script
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Re-render the entire committed graph as a single script, in
/// topological order. Used both for the parameter-edit fast path (no
/// LLM round trip needed) and to regenerate a model after a direct edit
/// or rollback.
pub fn assemble_script_from_pig(pig: &Pig) -> String {
    let mut sections = vec!["import cadquery as cq".to_string()];

    let params: BTreeMap<String, ParamValue> = pig
        .parameters()
        .iter()
        .map(|p| (p.name.clone(), p.value.clone()))
        .collect();
    sections.push(render_parameters_block(&params));

    let mut op_lines = Vec::new();
    let mut sink_names = Vec::new();
    for &idx in pig.execution_order() {
        if let Some(op) = pig.operation(idx) {
            op_lines.push(op.operation.render(&op.name));
            if op.dependents.is_empty() {
                sink_names.push(op.name.clone());
            }
        }
    }
    match sink_names.as_slice() {
        [] => {}
        [only] => op_lines.push(format!("result = {only}")),
        many => {
            let mut acc = many[0].clone();
            for name in &many[1..] {
                acc = format!("{acc}.union({name})");
            }
            op_lines.push(format!("result = {acc}"));
        }
    }
    sections.push(op_lines.join("\n"));
    sections.push(TAIL_BLOCK.trim_end().to_string());

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_axis_aligned_edge_selectors() {
        let script = "result = box.edges(\"|Z\").fillet(1)";
        assert!(check_forbidden_selectors(script).is_err());
    }

    #[test]
    fn accepts_unselected_edge_fillets() {
        let script = "result = box.edges().fillet(1)";
        assert!(check_forbidden_selectors(script).is_ok());
    }

    #[test]
    fn multiple_primitives_are_unioned_with_an_explanatory_comment() {
        let mut plan = Plan::default();
        plan.ast_nodes = vec![
            PlanAstNode {
                id: "n0".into(),
                kind: "box".into(),
                operation: None,
                parameters: BTreeMap::from([
                    ("length".into(), ParamValue::Numeric(1.0)),
                    ("width".into(), ParamValue::Numeric(1.0)),
                    ("height".into(), ParamValue::Numeric(1.0)),
                ]),
                children: vec![],
            },
            PlanAstNode {
                id: "n1".into(),
                kind: "sphere".into(),
                operation: None,
                parameters: BTreeMap::from([("radius".into(), ParamValue::Numeric(2.0))]),
                children: vec![],
            },
        ];
        let script = assemble_script(&plan);
        assert!(script.contains("unioned left-to-right"));
        assert!(script.contains("result = _node0.union(_node1)"));
    }
}
