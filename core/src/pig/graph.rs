//! The Parametric Intention Graph: an arena of parameter and operation
//! nodes plus index-based dependency edges.
//!
//! Node identity is a plain integer index into one of two arenas, never a
//! shared reference — snapshotting is a value copy of both arenas, and
//! restoring a snapshot never reassigns an id.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{EngineError, EngineResult};
use crate::pig::operation::{Operation, OperationNode};
use crate::pig::parameter::{ParamValue, ParameterNode};
use crate::types::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRef {
    Parameter(usize),
    Operation(usize),
}

#[derive(Debug, Clone, Default)]
pub struct Pig {
    parameters: Vec<ParameterNode>,
    operations: Vec<OperationNode>,
    param_names: BTreeMap<String, usize>,
    op_names: BTreeMap<String, usize>,
    /// Operation indices in topological order; recomputed on every
    /// structural change.
    execution_order: Vec<usize>,
}

impl Pig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(&self, idx: usize) -> Option<&ParameterNode> {
        self.parameters.get(idx)
    }

    pub fn operation(&self, idx: usize) -> Option<&OperationNode> {
        self.operations.get(idx)
    }

    pub fn parameters(&self) -> &[ParameterNode] {
        &self.parameters
    }

    pub fn operations(&self) -> &[OperationNode] {
        &self.operations
    }

    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    pub fn find_parameter(&self, name: &str) -> Option<usize> {
        self.param_names.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn find_operation(&self, name: &str) -> Option<usize> {
        self.op_names.get(&name.to_ascii_lowercase()).copied()
    }

    /// Nodes with no dependencies: every parameter (they never have
    /// outgoing edges) plus any operation with an empty input map.
    pub fn root_nodes(&self) -> BTreeSet<NodeRef> {
        let mut roots: BTreeSet<NodeRef> =
            (0..self.parameters.len()).map(NodeRef::Parameter).collect();
        for (idx, op) in self.operations.iter().enumerate() {
            if op.inputs.is_empty() {
                roots.insert(NodeRef::Operation(idx));
            }
        }
        roots
    }

    /// Insert or, if the name already exists, update the value of a
    /// parameter in place. Returns its stable index.
    pub fn add_parameter(&mut self, name: &str, value: ParamValue) -> usize {
        let key = name.to_ascii_lowercase();
        if let Some(&idx) = self.param_names.get(&key) {
            self.parameters[idx].value = value;
            return idx;
        }
        let idx = self.parameters.len();
        self.parameters.push(ParameterNode::new(name, value));
        self.param_names.insert(key, idx);
        idx
    }

    /// Add an operation depending on the given named inputs, each
    /// resolved to an existing node. Rejects any input whose edge would
    /// close a cycle before mutating anything.
    pub fn add_operation(
        &mut self,
        name: &str,
        operation: Operation,
        inputs: Vec<(String, NodeRef)>,
    ) -> EngineResult<usize> {
        let key = name.to_ascii_lowercase();
        let idx = match self.op_names.get(&key) {
            Some(&existing) => {
                self.operations[existing].operation = operation;
                existing
            }
            None => {
                self.operations.push(OperationNode::new(name, operation));
                let idx = self.operations.len() - 1;
                self.op_names.insert(key, idx);
                idx
            }
        };

        for (local_name, dep) in inputs {
            self.add_dependency(idx, dep)?;
            self.operations[idx].inputs.insert(local_name, dep);
        }

        self.recompute_execution_order()?;
        Ok(idx)
    }

    /// Add a single dependency edge `op depends on dep`, eagerly
    /// rejecting it if it would close a cycle. This is the redesign the
    /// source implementation lacks: there, cycles are only discovered
    /// when the topological sort runs.
    fn add_dependency(&mut self, op_idx: usize, dep: NodeRef) -> EngineResult<()> {
        if self.would_cycle(op_idx, dep) {
            return Err(EngineError::CycleDetected);
        }
        match dep {
            NodeRef::Parameter(p) => {
                self.parameters[p].dependents.insert(op_idx);
            }
            NodeRef::Operation(o) => {
                self.operations[o].dependents.insert(op_idx);
            }
        }
        Ok(())
    }

    fn would_cycle(&self, op_idx: usize, dep: NodeRef) -> bool {
        let NodeRef::Operation(dep_idx) = dep else {
            return false;
        };
        if dep_idx == op_idx {
            return true;
        }
        let mut stack = vec![dep_idx];
        let mut seen = HashSet::new();
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if cur == op_idx {
                return true;
            }
            for dep_ref in self.operations[cur].inputs.values() {
                if let NodeRef::Operation(idx) = dep_ref {
                    stack.push(*idx);
                }
            }
        }
        false
    }

    fn recompute_execution_order(&mut self) -> EngineResult<()> {
        let n = self.operations.len();
        let mut indegree = vec![0usize; n];
        for (idx, op) in self.operations.iter().enumerate() {
            indegree[idx] = op
                .inputs
                .values()
                .filter(|d| matches!(d, NodeRef::Operation(_)))
                .count();
        }

        let ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut queue = std::collections::VecDeque::from(ready.clone());
        let mut visited = vec![false; n];
        for &r in &ready {
            visited[r] = true;
        }

        while let Some(cur) = queue.pop_front() {
            order.push(cur);
            for (idx, op) in self.operations.iter().enumerate() {
                if visited[idx] {
                    continue;
                }
                let depends_on_cur = op
                    .inputs
                    .values()
                    .any(|d| matches!(d, NodeRef::Operation(o) if *o == cur));
                if depends_on_cur {
                    indegree[idx] -= 1;
                    if indegree[idx] == 0 {
                        visited[idx] = true;
                        queue.push_back(idx);
                    }
                }
            }
        }

        if order.len() != n {
            // Cannot happen given eager cycle rejection, but guard anyway.
            return Err(EngineError::CycleDetected);
        }
        self.execution_order = order;
        Ok(())
    }

    /// Validate and write a new value for an existing parameter,
    /// returning the topologically ordered closure of operations that
    /// must re-execute.
    pub fn update_parameter(&mut self, name: &str, new_value: ParamValue) -> EngineResult<Vec<usize>> {
        let idx = self
            .find_parameter(name)
            .ok_or_else(|| EngineError::ParameterNotFound(name.to_string()))?;

        let current = &self.parameters[idx].value;
        if current.type_name() != new_value.type_name() {
            return Err(EngineError::TypeMismatch {
                name: name.to_string(),
                expected: current.type_name().to_string(),
                got: new_value.type_name().to_string(),
            });
        }
        if let ParamValue::Numeric(v) = new_value {
            let node = &self.parameters[idx];
            if !node.in_bounds(v) {
                return Err(EngineError::OutOfBounds {
                    name: name.to_string(),
                    value: v,
                    min: node.min.unwrap_or(f64::NEG_INFINITY),
                    max: node.max.unwrap_or(f64::INFINITY),
                });
            }
        }

        self.parameters[idx].value = new_value;
        Ok(self.affected_closure(NodeRef::Parameter(idx)))
    }

    /// BFS over `dependents`, returned in topological order with each
    /// index appearing exactly once.
    pub fn affected_closure(&self, seed: NodeRef) -> Vec<usize> {
        let mut affected: HashSet<usize> = HashSet::new();
        let mut stack: Vec<NodeRef> = vec![seed];
        let mut seen_nodes: HashSet<NodeRef> = HashSet::new();
        while let Some(node) = stack.pop() {
            if !seen_nodes.insert(node) {
                continue;
            }
            let dependents = match node {
                NodeRef::Parameter(p) => &self.parameters[p].dependents,
                NodeRef::Operation(o) => &self.operations[o].dependents,
            };
            for &dep_op in dependents {
                affected.insert(dep_op);
                stack.push(NodeRef::Operation(dep_op));
            }
        }
        self.execution_order
            .iter()
            .copied()
            .filter(|idx| affected.contains(idx))
            .collect()
    }

    pub fn snapshot(&self) -> Pig {
        self.clone()
    }

    pub fn restore(&mut self, snapshot: Pig) {
        *self = snapshot;
    }

    /// Replace an operation's script and, when `infer_parameters` is
    /// set, register any bare identifiers that look like new parameter
    /// names. Defaults to requiring the caller supply every parameter
    /// explicitly (see design notes on direct-edit parameter inference).
    pub fn edit_operation_script(
        &mut self,
        op_idx: usize,
        new_script: String,
        explicit_params: &BTreeMap<String, ParamValue>,
        infer_parameters: bool,
    ) -> EngineResult<Vec<usize>> {
        if op_idx >= self.operations.len() {
            return Err(EngineError::OperationNotFound(op_idx.to_string()));
        }

        for (name, value) in explicit_params {
            let pidx = self.add_parameter(name, value.clone());
            self.add_dependency(op_idx, NodeRef::Parameter(pidx))?;
            self.operations[op_idx]
                .inputs
                .insert(name.clone(), NodeRef::Parameter(pidx));
        }

        if infer_parameters {
            for ident in infer_parameter_identifiers(&new_script) {
                if self.find_parameter(&ident).is_none() {
                    let pidx = self.add_parameter(&ident, ParamValue::Numeric(0.0));
                    self.add_dependency(op_idx, NodeRef::Parameter(pidx))?;
                    self.operations[op_idx]
                        .inputs
                        .insert(ident, NodeRef::Parameter(pidx));
                }
            }
        }

        self.operations[op_idx].operation = Operation::FreeScript(new_script);
        self.recompute_execution_order()?;
        Ok(self.affected_closure(NodeRef::Operation(op_idx)))
    }

    /// Merge a successfully executed plan into the graph: its
    /// parameters (by name, creating or rebinding) and either a single
    /// `FreeScript` operation for a script-style plan or one operation
    /// per top-level AST node. Must only be called once the plan's
    /// script has actually executed without error — a failed or
    /// timed-out execution never reaches here.
    pub fn absorb_plan(&mut self, plan: &Plan) -> EngineResult<()> {
        let param_indices: Vec<(String, usize)> = plan
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), self.add_parameter(name, value.clone())))
            .collect();

        if let Some(script) = &plan.script {
            let op_name = if plan.id.is_empty() {
                format!("op_{}", self.operations.len())
            } else {
                plan.id.clone()
            };
            let inputs = param_indices
                .iter()
                .map(|(name, idx)| (name.clone(), NodeRef::Parameter(*idx)))
                .collect();
            self.add_operation(&op_name, Operation::FreeScript(script.clone()), inputs)?;
        } else {
            for node in &plan.ast_nodes {
                let operation = Operation::from_ast_node(node);
                let inputs = param_indices
                    .iter()
                    .filter(|(name, _)| node.parameters.contains_key(name))
                    .map(|(name, idx)| (name.clone(), NodeRef::Parameter(*idx)))
                    .collect();
                self.add_operation(&node.id, operation, inputs)?;
            }
        }

        Ok(())
    }

    /// Resolve an advisory `affected_operations` entry, which may be
    /// either a node id or a human name: try it as an operation name
    /// first, then as a parameter name. Unresolvable entries are
    /// dropped rather than treated as an error — they were never relied
    /// on for correctness, only as a hint.
    pub fn resolve_affected_ref(&self, reference: &str) -> Option<NodeRef> {
        self.find_operation(reference)
            .map(NodeRef::Operation)
            .or_else(|| self.find_parameter(reference).map(NodeRef::Parameter))
    }
}

/// A handful of DSL keywords and builders that should never be mistaken
/// for a parameter identifier during auto-detection.
const DSL_STOPWORDS: &[&str] = &[
    "cq", "result", "workplane", "box", "cylinder", "sphere", "extrude", "cut", "union", "edges",
    "fillet", "chamfer", "faces", "hole",
];

fn infer_parameter_identifiers(script: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for token in script.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        if token.is_empty() || !token.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        let lower = token.to_ascii_lowercase();
        if DSL_STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            continue;
        }
        if seen.insert(lower) {
            out.push(token.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cylinder_pig() -> (Pig, usize) {
        let mut pig = Pig::new();
        let r = pig.add_parameter("radius", ParamValue::Numeric(10.0));
        let h = pig.add_parameter("height", ParamValue::Numeric(20.0));
        let op = pig
            .add_operation(
                "cyl",
                Operation::Cylinder {
                    radius: "radius".into(),
                    height: "height".into(),
                },
                vec![
                    ("radius".into(), NodeRef::Parameter(r)),
                    ("height".into(), NodeRef::Parameter(h)),
                ],
            )
            .expect("no cycle");
        (pig, op)
    }

    #[test]
    fn root_nodes_are_parameters_and_input_free_operations() {
        let (pig, _op) = cylinder_pig();
        let roots = pig.root_nodes();
        assert!(roots.contains(&NodeRef::Parameter(0)));
        assert!(roots.contains(&NodeRef::Parameter(1)));
        assert!(!roots.contains(&NodeRef::Operation(0)));
    }

    #[test]
    fn execution_order_is_a_valid_topo_sort() {
        let (pig, op) = cylinder_pig();
        assert_eq!(pig.execution_order(), &[op]);
    }

    #[test]
    fn update_parameter_returns_affected_closure_once_each() {
        let (mut pig, op) = cylinder_pig();
        let affected = pig
            .update_parameter("radius", ParamValue::Numeric(15.0))
            .expect("valid update");
        assert_eq!(affected, vec![op]);
    }

    #[test]
    fn cycle_is_rejected_eagerly() {
        let mut pig = Pig::new();
        let op_a = pig
            .add_operation("a", Operation::FreeScript("a = 1".into()), vec![])
            .expect("no cycle");
        let op_b = pig
            .add_operation(
                "b",
                Operation::FreeScript("b = a".into()),
                vec![("a".into(), NodeRef::Operation(op_a))],
            )
            .expect("no cycle");
        let result = pig.add_operation(
            "a2",
            Operation::FreeScript("a = b".into()),
            vec![("b".into(), NodeRef::Operation(op_b))],
        );
        // op_a already depends indirectly on nothing, but rewriting op_a
        // (same name => same index) to depend on op_b, which depends on
        // op_a, must be rejected.
        assert!(matches!(result, Err(EngineError::CycleDetected)));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let (mut pig, _op) = cylinder_pig();
        let result = pig.update_parameter("radius", ParamValue::Text("oops".into()));
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let (mut pig, _op) = cylinder_pig();
        let snap = pig.snapshot();
        pig.update_parameter("radius", ParamValue::Numeric(99.0))
            .expect("valid update");
        pig.restore(snap.clone());
        assert_eq!(
            pig.parameter(0).expect("exists").value,
            ParamValue::Numeric(10.0)
        );
        assert_eq!(pig.snapshot().execution_order(), snap.execution_order());
    }

    proptest! {
        /// A chain of operations, each depending on the previous one, is
        /// always accepted (no false-positive cycle rejection) and its
        /// execution order always respects the dependency edges, however
        /// long the chain.
        #[test]
        fn linear_chains_stay_acyclic_and_topologically_sorted(len in 1usize..12) {
            let mut pig = Pig::new();
            let mut indices = Vec::with_capacity(len);
            for i in 0..len {
                let inputs = match indices.last() {
                    Some(&prev) => vec![("prev".to_string(), NodeRef::Operation(prev))],
                    None => vec![],
                };
                let idx = pig
                    .add_operation(&format!("op{i}"), Operation::FreeScript(format!("n{i} = 1")), inputs)
                    .expect("linear chain never cycles");
                indices.push(idx);
            }

            let order = pig.execution_order();
            prop_assert_eq!(order.len(), len);

            let position = |idx: usize| order.iter().position(|&o| o == idx).expect("present");
            for window in indices.windows(2) {
                let (prev, next) = (window[0], window[1]);
                prop_assert!(position(prev) < position(next));
            }
        }
    }
}
