//! The engine: the single entrypoint a host (transport layer, CLI, test
//! harness) talks to. Owns the session table and wires a configured
//! [`Planner`]/[`Sandbox`] pair into a shared [`Orchestrator`], mirroring
//! the shape of the teacher's `ConversationManager` — a thin session
//! registry in front of a heavier per-turn machine, never the machine
//! itself.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::config::{EngineConfig, LlmProvider};
use crate::dialogue::DialogueMessage;
use crate::error::{EngineError, EngineResult};
use crate::executor::sandbox::Sandbox;
use crate::orchestrator::{BatchUpdateReport, EditManager, Orchestrator, TurnOutcome, ValidationReport};
use crate::pig::{HistoryEntry, ParamValue};
use crate::planner::{CloudBackend, LlmBackend, LocalBackend, Planner};
use crate::session::Session;
use crate::types::{BoundingBox, GeometrySelection};

/// Read-only view of a parameter, safe to hand back across the API
/// boundary without exposing the PIG's internal arena indices.
#[derive(Debug, Clone)]
pub struct ParameterView {
    pub name: String,
    pub value: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub units: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OperationView {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DialogueTurnView {
    pub speaker: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommittedModel {
    pub bbox: Option<BoundingBox>,
    pub volume: Option<f64>,
}

/// Full read-back of a session, as `get_session` in §6's API table.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: String,
    pub conversation: Vec<DialogueTurnView>,
    pub committed_model: CommittedModel,
    pub last_script: Option<String>,
    pub parameters: Vec<ParameterView>,
    pub operations: Vec<OperationView>,
}

/// The single entrypoint a host embeds: creates sessions, submits turns,
/// and exposes the non-conversational edit entrypoints.
///
/// Every session is independently lockable so turns on different
/// sessions run fully in parallel (§5); a second `submit_turn` on a
/// session already mid-turn fails fast with [`EngineError::Busy`]
/// instead of queuing behind the first.
pub struct Engine {
    config: EngineConfig,
    orchestrator: Arc<Orchestrator>,
    sessions: StdMutex<HashMap<String, Arc<AsyncMutex<Session>>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let backend: Arc<dyn LlmBackend> = build_backend(&config)?;
        let provider_name = match config.llm_provider {
            LlmProvider::Cloud => "cloud",
            LlmProvider::Local => "local",
        }
        .to_string();
        let model_name = config.llm_model.clone().unwrap_or_default();
        let planner = Planner::new(
            backend,
            provider_name,
            model_name,
            config.llm_responses_dir.clone(),
        );
        let sandbox = Sandbox::new(default_interpreter(), config.max_execution_time);
        let orchestrator = Orchestrator::new(planner, sandbox, config.scripts_dir.clone());

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            sessions: StdMutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a fresh, empty session and return its id.
    pub fn start_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.clone(), Arc::new(AsyncMutex::new(session)));
        id
    }

    /// Destroy a session; its state is not recoverable afterward.
    pub fn close_session(&self, session_id: &str) -> EngineResult<()> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
        removed
            .map(|_| ())
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    fn handle(&self, session_id: &str) -> EngineResult<Arc<AsyncMutex<Session>>> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Route one utterance through the orchestrator. `model_choice` is
    /// advisory only: the backend a session talks to is fixed at engine
    /// construction, so a per-turn override has no effect beyond being
    /// recorded in the turn's trace span (see DESIGN.md).
    pub async fn submit_turn(
        &self,
        session_id: &str,
        utterance: &str,
        selected_geometry: Option<&GeometrySelection>,
        model_choice: Option<&str>,
    ) -> EngineResult<TurnOutcome> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.try_lock().map_err(|_| EngineError::Busy)?;
        if let Some(model) = model_choice {
            tracing::debug!(model, "turn requested a model override (advisory only)");
        }
        self.orchestrator
            .submit_turn(&mut guard, utterance, selected_geometry)
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<SessionView> {
        let handle = self.handle(session_id)?;
        let guard = handle.lock().await;
        Ok(session_view(&guard))
    }

    pub async fn get_parameters(&self, session_id: &str) -> EngineResult<Vec<ParameterView>> {
        let handle = self.handle(session_id)?;
        let guard = handle.lock().await;
        Ok(parameter_views(&guard))
    }

    pub async fn get_operations(&self, session_id: &str) -> EngineResult<Vec<OperationView>> {
        let handle = self.handle(session_id)?;
        let guard = handle.lock().await;
        Ok(operation_views(&guard))
    }

    /// Direct parameter write outside the turn machinery: validates and
    /// updates the PIG, returning the affected operation ids. Does not
    /// re-execute the script; callers that want a refreshed model should
    /// follow up with `batch_parameter_update(..., auto_regenerate: true)`
    /// or rely on the conversational fast path in `submit_turn`.
    pub async fn update_parameter(
        &self,
        session_id: &str,
        name: &str,
        value: ParamValue,
    ) -> EngineResult<Vec<usize>> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        let affected = guard.pig.update_parameter(name, value)?;
        guard.history.push(HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            description: format!("set {name} via update_parameter"),
            kind: crate::pig::HistoryEntryKind::ParameterUpdate {
                parameter: name.to_string(),
            },
        });
        Ok(affected)
    }

    pub async fn load_previous(&self, session_id: &str, path: &Path) -> EngineResult<()> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        EditManager::new(&self.orchestrator.sandbox)
            .load_previous(&mut guard, path)
            .await
    }

    pub async fn direct_edit(
        &self,
        session_id: &str,
        op_name: &str,
        new_script: String,
        explicit_params: BTreeMap<String, ParamValue>,
        infer_parameters: bool,
        auto_regenerate: bool,
    ) -> EngineResult<Option<crate::types::ExecutionResult>> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        EditManager::new(&self.orchestrator.sandbox)
            .direct_edit(
                &mut guard,
                op_name,
                new_script,
                explicit_params,
                infer_parameters,
                auto_regenerate,
            )
            .await
    }

    pub async fn batch_parameter_update(
        &self,
        session_id: &str,
        updates: BTreeMap<String, ParamValue>,
        auto_regenerate: bool,
    ) -> EngineResult<(BatchUpdateReport, Option<crate::types::ExecutionResult>)> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        EditManager::new(&self.orchestrator.sandbox)
            .batch_parameter_update(&mut guard, updates, auto_regenerate)
            .await
    }

    pub async fn checkpoint(&self, session_id: &str, description: Option<String>) -> EngineResult<String> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        Ok(EditManager::new(&self.orchestrator.sandbox)
            .checkpoint(&mut guard, description.unwrap_or_else(|| "checkpoint".to_string())))
    }

    pub async fn rollback(
        &self,
        session_id: &str,
        checkpoint_id: &str,
        auto_regenerate: bool,
    ) -> EngineResult<Option<crate::types::ExecutionResult>> {
        let handle = self.handle(session_id)?;
        let mut guard = handle.lock().await;
        EditManager::new(&self.orchestrator.sandbox)
            .rollback(&mut guard, checkpoint_id, auto_regenerate)
            .await
    }

    pub async fn edit_history(&self, session_id: &str) -> EngineResult<Vec<HistoryEntry>> {
        let handle = self.handle(session_id)?;
        let guard = handle.lock().await;
        Ok(EditManager::new(&self.orchestrator.sandbox)
            .edit_history(&guard)
            .to_vec())
    }

    pub async fn validate_edit(
        &self,
        session_id: &str,
        script: Option<&str>,
        params: &BTreeMap<String, ParamValue>,
    ) -> EngineResult<ValidationReport> {
        let handle = self.handle(session_id)?;
        let guard = handle.lock().await;
        Ok(EditManager::new(&self.orchestrator.sandbox).validate_edit(&guard, script, params))
    }
}

fn session_view(session: &Session) -> SessionView {
    SessionView {
        id: session.id.clone(),
        conversation: session
            .dialogue
            .messages()
            .iter()
            .map(dialogue_turn_view)
            .collect(),
        committed_model: CommittedModel {
            bbox: session.committed_bbox,
            volume: session.committed_volume,
        },
        last_script: session.last_script.clone(),
        parameters: parameter_views(session),
        operations: operation_views(session),
    }
}

fn dialogue_turn_view(message: &DialogueMessage) -> DialogueTurnView {
    match message {
        DialogueMessage::User { content } => DialogueTurnView {
            speaker: "user".to_string(),
            content: content.clone(),
        },
        DialogueMessage::System { content } => DialogueTurnView {
            speaker: "system".to_string(),
            content: content.clone(),
        },
    }
}

fn parameter_views(session: &Session) -> Vec<ParameterView> {
    session
        .pig
        .parameters()
        .iter()
        .map(|p| ParameterView {
            name: p.name.clone(),
            value: p.value.clone(),
            min: p.min,
            max: p.max,
            units: p.units.clone(),
            description: p.description.clone(),
        })
        .collect()
}

fn operation_views(session: &Session) -> Vec<OperationView> {
    session
        .pig
        .operations()
        .iter()
        .map(|op| OperationView {
            name: op.name.clone(),
            kind: op.operation.kind().to_string(),
            description: op.description.clone(),
            inputs: op.inputs.keys().cloned().collect(),
        })
        .collect()
}

fn default_interpreter() -> PathBuf {
    which::which("python3")
        .or_else(|_| which::which("python"))
        .unwrap_or_else(|_| PathBuf::from("python3"))
}

fn build_backend(config: &EngineConfig) -> EngineResult<Arc<dyn LlmBackend>> {
    match config.llm_provider {
        LlmProvider::Cloud => {
            let api_key = config.llm_api_key.clone().ok_or_else(|| {
                EngineError::Config("LLM_API_KEY is required for the cloud provider".into())
            })?;
            let base_url = config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
            let model = config.llm_model.clone().unwrap_or_else(|| "gpt-4".to_string());
            Ok(Arc::new(CloudBackend::new(base_url, api_key, model, config.llm_timeout)))
        }
        LlmProvider::Local => {
            let base_url = config
                .llm_base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            let model = config.llm_model.clone().unwrap_or_else(|| "llama3".to_string());
            Ok(Arc::new(LocalBackend::new(base_url, model, config.llm_timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixtureBackend(&'static str);

    #[async_trait]
    impl LlmBackend for FixtureBackend {
        async fn call(&self, _prompt: &str) -> EngineResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn engine_with_fixture(response: &'static str) -> Engine {
        let config = EngineConfig {
            llm_responses_dir: std::env::temp_dir().join("intentcad-test-responses"),
            scripts_dir: std::env::temp_dir().join("intentcad-test-scripts"),
            ..EngineConfig::default()
        };
        let planner = Planner::new(
            Arc::new(FixtureBackend(response)),
            "fixture".to_string(),
            "fixture-model".to_string(),
            config.llm_responses_dir.clone(),
        );
        let sandbox = Sandbox::new(default_interpreter(), config.max_execution_time);
        let orchestrator = Orchestrator::new(planner, sandbox, config.scripts_dir.clone());
        Engine {
            config,
            orchestrator: Arc::new(orchestrator),
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    #[test]
    fn start_session_registers_a_fresh_empty_session() {
        let engine = engine_with_fixture("{}");
        let id = engine.start_session();
        assert!(engine.handle(&id).is_ok());
        assert!(engine.close_session(&id).is_ok());
        assert!(engine.handle(&id).is_err());
    }

    #[tokio::test]
    async fn update_parameter_rejects_unknown_session() {
        let engine = engine_with_fixture("{}");
        let result = engine
            .update_parameter("does-not-exist", "radius", ParamValue::Numeric(1.0))
            .await;
        assert!(matches!(result, Err(EngineError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn checkpoint_then_get_session_reflects_committed_parameters() {
        let engine = engine_with_fixture("{}");
        let id = engine.start_session();
        {
            let handle = engine.handle(&id).expect("session exists");
            let mut guard = handle.lock().await;
            guard.pig.add_parameter("radius", ParamValue::Numeric(10.0));
        }
        let checkpoint_id = engine
            .checkpoint(&id, Some("initial".to_string()))
            .await
            .expect("checkpoint succeeds");
        assert!(!checkpoint_id.is_empty());
        let view = engine.get_session(&id).await.expect("session readable");
        assert_eq!(view.parameters.len(), 1);
        assert_eq!(view.parameters[0].name, "radius");
    }
}
