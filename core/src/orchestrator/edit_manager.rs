//! Non-conversational entrypoints: loading a previously generated
//! script, direct script edits, batch parameter updates, checkpoints,
//! rollback, and edit history/validation queries.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::executor::{sandbox, script_builder};
use crate::pig::{HistoryEntry, HistoryEntryKind, NodeRef, ParamValue};
use crate::session::Session;
use crate::types::ExecutionResult;

pub struct EditManager<'a> {
    pub sandbox: &'a sandbox::Sandbox,
}

#[derive(Debug, Default)]
pub struct BatchUpdateReport {
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchUpdateReport {
    pub fn any_succeeded(&self) -> bool {
        !self.updated.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl<'a> EditManager<'a> {
    pub fn new(sandbox: &'a sandbox::Sandbox) -> Self {
        Self { sandbox }
    }

    /// Load the parameters/operations of a previously persisted script
    /// into the session's PIG. Values are parsed with a safe literal
    /// reader — the script is never evaluated as code.
    pub async fn load_previous(
        &self,
        session: &mut Session,
        path: &Path,
    ) -> EngineResult<()> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(EngineError::Io)?;

        let params = extract_parameters_block(&text);
        for (name, value) in &params {
            session.pig.add_parameter(name, value.clone());
        }

        session.history.push(HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            description: format!("loaded previous generation from {}", path.display()),
            kind: HistoryEntryKind::LoadPrevious {
                source: path.display().to_string(),
            },
        });

        Ok(())
    }

    /// Replace an operation's script directly. `infer_parameters`
    /// controls whether bare identifiers in the new script are
    /// auto-registered as parameters (off by default at the API layer;
    /// this entrypoint opts in for convenience, matching the source
    /// implementation's direct-edit behavior).
    pub async fn direct_edit(
        &self,
        session: &mut Session,
        op_name: &str,
        new_script: String,
        explicit_params: BTreeMap<String, ParamValue>,
        infer_parameters: bool,
        auto_regenerate: bool,
    ) -> EngineResult<Option<ExecutionResult>> {
        let op_idx = session
            .pig
            .find_operation(op_name)
            .ok_or_else(|| EngineError::OperationNotFound(op_name.to_string()))?;

        self.checkpoint(session, format!("before direct edit of {op_name}"));

        session
            .pig
            .edit_operation_script(op_idx, new_script, &explicit_params, infer_parameters)?;

        session.history.push(HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            description: format!("direct edit of {op_name}"),
            kind: HistoryEntryKind::DirectEdit {
                operation: op_name.to_string(),
            },
        });

        if auto_regenerate {
            Ok(Some(self.regenerate(session).await?))
        } else {
            Ok(None)
        }
    }

    /// Apply a map of parameter updates as one batch. Continues past
    /// individual failures; the batch is successful overall iff at
    /// least one parameter updated.
    pub async fn batch_parameter_update(
        &self,
        session: &mut Session,
        updates: BTreeMap<String, ParamValue>,
        auto_regenerate: bool,
    ) -> EngineResult<(BatchUpdateReport, Option<ExecutionResult>)> {
        self.checkpoint(session, "before batch parameter update".to_string());

        let mut report = BatchUpdateReport::default();
        for (name, value) in updates {
            match session.pig.update_parameter(&name, value) {
                Ok(_) => {
                    report.updated.push(name.clone());
                    session.history.push(HistoryEntry {
                        id: uuid::Uuid::new_v4().to_string(),
                        description: format!("batch-updated {name}"),
                        kind: HistoryEntryKind::ParameterUpdate { parameter: name },
                    });
                }
                Err(err) => report.failed.push((name, err.to_string())),
            }
        }

        if !report.any_succeeded() {
            return Ok((report, None));
        }

        if auto_regenerate {
            let result = self.regenerate(session).await?;
            Ok((report, Some(result)))
        } else {
            Ok((report, None))
        }
    }

    pub fn checkpoint(&self, session: &mut Session, description: String) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let snapshot = session.pig.snapshot();
        session.history.push_checkpoint(id.clone(), description, snapshot);
        id
    }

    /// Restore a checkpoint, first auto-checkpointing the current state
    /// so the rollback itself is reversible.
    pub async fn rollback(
        &self,
        session: &mut Session,
        checkpoint_id: &str,
        auto_regenerate: bool,
    ) -> EngineResult<Option<ExecutionResult>> {
        let snapshot = session
            .history
            .find_checkpoint(checkpoint_id)
            .cloned()
            .ok_or_else(|| EngineError::Config(format!("checkpoint '{checkpoint_id}' not found")))?;

        self.checkpoint(session, format!("before rollback to {checkpoint_id}"));
        session.pig.restore(snapshot);

        if auto_regenerate {
            Ok(Some(self.regenerate(session).await?))
        } else {
            Ok(None)
        }
    }

    pub fn edit_history(&self, session: &Session) -> &[HistoryEntry] {
        session.history.entries()
    }

    /// Validate a candidate script and/or parameter map without
    /// mutating any state.
    pub fn validate_edit(
        &self,
        session: &Session,
        script: Option<&str>,
        params: &BTreeMap<String, ParamValue>,
    ) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(script) = script {
            if !script.contains("result") {
                errors.push("script must define a 'result' value".to_string());
            }
            if let Err(err) = script_builder::check_forbidden_selectors(script) {
                errors.push(err.to_string());
            }
        }

        // A parameter referenced that doesn't exist yet is allowed (it will
        // be created on commit), so this is informational only.
        for name in params.keys() {
            if session.pig.find_parameter(name).is_none() && script.is_none() {
                warnings.push(format!("parameter '{name}' does not exist yet and will be created"));
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    async fn regenerate(&self, session: &mut Session) -> EngineResult<ExecutionResult> {
        let script = script_builder::assemble_script_from_pig(&session.pig);
        let result = self.sandbox.run(&script).await?;
        if result.is_success() {
            session.commit_execution(&result);
        }
        Ok(result)
    }
}

/// Parse the `# parameters` section of a persisted script, using a safe
/// literal reader rather than evaluating the script.
fn extract_parameters_block(script: &str) -> BTreeMap<String, ParamValue> {
    let mut params = BTreeMap::new();
    let mut in_block = false;
    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed == "# parameters" {
            in_block = true;
            continue;
        }
        if in_block {
            if trimmed.is_empty() || trimmed.starts_with('#') {
                break;
            }
            if let Some((name, value)) = trimmed.split_once('=') {
                let name = name.trim();
                let value = value.trim();
                if let Some(parsed) = parse_literal(value) {
                    params.insert(name.to_string(), parsed);
                }
            }
        }
    }
    params
}

fn parse_literal(text: &str) -> Option<ParamValue> {
    if let Ok(n) = text.parse::<f64>() {
        return Some(ParamValue::Numeric(n));
    }
    match text {
        "True" => return Some(ParamValue::Boolean(true)),
        "False" => return Some(ParamValue::Boolean(false)),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(ParamValue::Text(inner.to_string()));
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        let nums: Option<Vec<f64>> = inner.split(',').map(|p| p.trim().parse().ok()).collect();
        return nums.map(ParamValue::Vector);
    }
    None
}

#[allow(unused)]
fn unused_node_ref(_n: NodeRef) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> sandbox::Sandbox {
        sandbox::Sandbox::new("python3", Duration::from_secs(5))
    }

    #[test]
    fn extracts_parameters_block_with_safe_literal_parsing() {
        let script = "# parameters\nradius = 10\nheight = 20\nname = \"demo\"\nflag = True\n\n# operations\nresult = 1\n";
        let params = extract_parameters_block(script);
        assert_eq!(params.get("radius"), Some(&ParamValue::Numeric(10.0)));
        assert_eq!(params.get("name"), Some(&ParamValue::Text("demo".into())));
        assert_eq!(params.get("flag"), Some(&ParamValue::Boolean(true)));
    }

    #[test]
    fn validate_edit_rejects_script_without_result() {
        let session = Session::new("s1");
        let sandbox = manager();
        let manager = EditManager::new(&sandbox);
        let report = manager.validate_edit(&session, Some("x = 1"), &BTreeMap::new());
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("result")));
    }

    #[test]
    fn validate_edit_accepts_well_formed_script() {
        let session = Session::new("s1");
        let sandbox = manager();
        let manager = EditManager::new(&sandbox);
        let report = manager.validate_edit(&session, Some("result = 1"), &BTreeMap::new());
        assert!(report.is_valid);
    }

    #[tokio::test]
    async fn checkpoint_then_rollback_restores_parameters() {
        let mut session = Session::new("s1");
        session.pig.add_parameter("radius", ParamValue::Numeric(10.0));
        let sandbox = manager();
        let edit_manager = EditManager::new(&sandbox);

        let checkpoint_id = edit_manager.checkpoint(&mut session, "c1".to_string());
        session
            .pig
            .update_parameter("radius", ParamValue::Numeric(99.0))
            .expect("valid update");

        edit_manager
            .rollback(&mut session, &checkpoint_id, false)
            .await
            .expect("rollback succeeds");

        let idx = session.pig.find_parameter("radius").expect("exists");
        assert_eq!(
            session.pig.parameter(idx).expect("exists").value,
            ParamValue::Numeric(10.0)
        );
        // Rollback itself leaves an automatic pre-rollback checkpoint.
        assert!(session.history.entries().len() >= 2);
    }

    #[tokio::test]
    async fn batch_update_reports_partial_failures() {
        let mut session = Session::new("s1");
        session.pig.add_parameter("radius", ParamValue::Numeric(10.0));
        let sandbox = manager();
        let edit_manager = EditManager::new(&sandbox);

        let mut updates = BTreeMap::new();
        updates.insert("radius".to_string(), ParamValue::Numeric(15.0));
        updates.insert("missing".to_string(), ParamValue::Numeric(1.0));

        let (report, _) = edit_manager
            .batch_parameter_update(&mut session, updates, false)
            .await
            .expect("batch completes");
        assert_eq!(report.updated, vec!["radius".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.any_succeeded());
    }
}
