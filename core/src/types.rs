//! Domain types shared across the planner, executor, PIG, and
//! orchestrator. Kept in one place so those modules don't need to
//! depend on each other just to pass a `Plan` or `ExecutionResult`
//! around.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pig::parameter::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryElementKind {
    Face,
    Edge,
    Vertex,
}

#[derive(Debug, Clone)]
pub struct GeometrySelection {
    pub element_kind: GeometryElementKind,
    pub element_id: String,
    pub coordinates: Option<[f64; 3]>,
    pub normal: Option<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionType {
    Creation,
    Modification,
    Query,
    MetaCommand,
    Error,
}

/// One node of an AST-style plan, as opposed to a flat `script`.
#[derive(Debug, Clone, Default)]
pub struct PlanAstNode {
    pub id: String,
    pub kind: String,
    pub operation: Option<String>,
    pub parameters: BTreeMap<String, ParamValue>,
    pub children: Vec<PlanAstNode>,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub id: String,
    pub description: String,
    /// Preferred: a complete DSL script defining `result`.
    pub script: Option<String>,
    /// Alternative structured form, used when `script` is absent.
    pub ast_nodes: Vec<PlanAstNode>,
    pub parameters: BTreeMap<String, ParamValue>,
    /// Advisory list of PIG node ids/names this plan is expected to touch.
    pub affected_operations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub intention_type: IntentionType,
    pub response_text: String,
    pub execution_plan: Option<Plan>,
    pub parameter_updates: BTreeMap<String, ParamValue>,
    pub requires_clarification: bool,
    pub clarification_questions: Vec<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<f64>,
    pub faces: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub elapsed: std::time::Duration,
    pub script: String,
    pub mesh: Option<Mesh>,
    pub bbox: Option<BoundingBox>,
    pub volume: Option<f64>,
    pub center_of_mass: Option<[f64; 3]>,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Explicit per-turn state machine, tracked for tracing and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Resolving,
    FastPath,
    Planning,
    Executing,
    Correcting,
    Absorbing,
    Responding,
    Done,
}
