//! Operation nodes: a closed set of CAD steps plus an escape hatch for
//! scripts that don't map onto a known kind.
//!
//! Modeled as a tagged variant rather than a string-keyed template table:
//! each variant owns its own `render()`, so an unrecognised kind cannot
//! silently produce an empty script fragment.

use std::collections::BTreeMap;

use crate::pig::graph::NodeRef;
use crate::pig::parameter::ParamValue;
use crate::types::PlanAstNode;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Box {
        length: String,
        width: String,
        height: String,
    },
    Cylinder {
        radius: String,
        height: String,
    },
    Sphere {
        radius: String,
    },
    Extrude {
        sketch: String,
        distance: String,
    },
    Cut {
        target: String,
        tool: String,
    },
    Union {
        left: String,
        right: String,
    },
    Fillet {
        target: String,
        radius: String,
    },
    Chamfer {
        target: String,
        distance: String,
    },
    /// Anything that doesn't fit a known kind: the raw script fragment is
    /// used verbatim. This is the fallback for AST nodes with an
    /// unrecognised `kind`, never silently dropped.
    FreeScript(String),
}

impl Operation {
    /// Render this operation as a fragment of the embedded CAD DSL,
    /// assuming its named inputs already exist as bound identifiers in
    /// the assembled script (parameters or results of prior operations).
    pub fn render(&self, result_name: &str) -> String {
        match self {
            Operation::Box {
                length,
                width,
                height,
            } => format!("{result_name} = cq.Workplane(\"XY\").box({length}, {width}, {height})"),
            Operation::Cylinder { radius, height } => {
                format!("{result_name} = cq.Workplane(\"XY\").cylinder({height}, {radius})")
            }
            Operation::Sphere { radius } => {
                format!("{result_name} = cq.Workplane(\"XY\").sphere({radius})")
            }
            Operation::Extrude { sketch, distance } => {
                format!("{result_name} = {sketch}.extrude({distance})")
            }
            Operation::Cut { target, tool } => {
                format!("{result_name} = {target}.cut({tool})")
            }
            Operation::Union { left, right } => {
                format!("{result_name} = {left}.union({right})")
            }
            // Edge selectors like `.edges(\"|Z\")` are unreliable across
            // geometry shapes; always fillet/chamfer the full edge set.
            Operation::Fillet { target, radius } => {
                format!("{result_name} = {target}.edges().fillet({radius})")
            }
            Operation::Chamfer { target, distance } => {
                format!("{result_name} = {target}.edges().chamfer({distance})")
            }
            Operation::FreeScript(src) => src.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Box { .. } => "box",
            Operation::Cylinder { .. } => "cylinder",
            Operation::Sphere { .. } => "sphere",
            Operation::Extrude { .. } => "extrude",
            Operation::Cut { .. } => "cut",
            Operation::Union { .. } => "union",
            Operation::Fillet { .. } => "fillet",
            Operation::Chamfer { .. } => "chamfer",
            Operation::FreeScript(_) => "script",
        }
    }

    /// Build an operation variant from a planner AST node, falling back
    /// to `FreeScript` for any kind this engine doesn't have a template
    /// for. Parameter references that aren't present on the node fall
    /// back to the parameter's own name, so the rendered script still
    /// reads as an identifier rather than an empty string.
    pub fn from_ast_node(node: &PlanAstNode) -> Operation {
        let text_ref = |key: &str| -> String {
            match node.parameters.get(key) {
                Some(ParamValue::Text(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => key.to_string(),
            }
        };
        match node.kind.as_str() {
            "box" => Operation::Box {
                length: text_ref("length"),
                width: text_ref("width"),
                height: text_ref("height"),
            },
            "cylinder" => Operation::Cylinder {
                radius: text_ref("radius"),
                height: text_ref("height"),
            },
            "sphere" => Operation::Sphere {
                radius: text_ref("radius"),
            },
            "extrude" => Operation::Extrude {
                sketch: text_ref("sketch"),
                distance: text_ref("distance"),
            },
            "cut" => Operation::Cut {
                target: text_ref("target"),
                tool: text_ref("tool"),
            },
            "union" => Operation::Union {
                left: text_ref("left"),
                right: text_ref("right"),
            },
            "fillet" => Operation::Fillet {
                target: text_ref("target"),
                radius: text_ref("radius"),
            },
            "chamfer" => Operation::Chamfer {
                target: text_ref("target"),
                distance: text_ref("distance"),
            },
            _ => Operation::FreeScript(node.operation.clone().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationNode {
    pub name: String,
    pub operation: Operation,
    pub description: Option<String>,
    /// local input name -> the node (parameter or another operation)
    /// this operation depends on.
    pub inputs: BTreeMap<String, NodeRef>,
    /// Indices of operation nodes that directly depend on this one.
    pub dependents: std::collections::BTreeSet<usize>,
}

impl OperationNode {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            description: None,
            inputs: BTreeMap::new(),
            dependents: std::collections::BTreeSet::new(),
        }
    }
}
