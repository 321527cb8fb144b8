//! Per-turn state machine: resolve intent, try the fast parameter-edit
//! path, otherwise plan with the LLM, execute, and on failure retry
//! through the self-correction loop before giving up.

use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};
use crate::executor::{assemble_script, sandbox, script_builder};
use crate::pig::ParamValue;
use crate::planner::Planner;
use crate::resolver::{self, ResolvedHints};
use crate::session::Session;
use crate::types::{ExecutionResult, GeometrySelection, IntentionType, TurnState};

const MAX_CORRECTION_ATTEMPTS: u32 = 2;

pub struct TurnOutcome {
    pub response_text: String,
    pub execution: Option<ExecutionResult>,
    pub requires_clarification: bool,
    pub clarification_questions: Vec<String>,
}

pub struct Orchestrator {
    pub planner: Planner,
    pub sandbox: sandbox::Sandbox,
    pub scripts_dir: std::path::PathBuf,
}

impl Orchestrator {
    pub fn new(planner: Planner, sandbox: sandbox::Sandbox, scripts_dir: std::path::PathBuf) -> Self {
        Self {
            planner,
            sandbox,
            scripts_dir,
        }
    }

    #[instrument(skip_all, fields(session = %session.id))]
    pub async fn submit_turn(
        &self,
        session: &mut Session,
        utterance: &str,
        selected_geometry: Option<&GeometrySelection>,
    ) -> EngineResult<TurnOutcome> {
        if !session.try_begin_turn() {
            return Err(EngineError::Busy);
        }
        let outcome = self.run_turn(session, utterance, selected_geometry).await;
        session.end_turn();
        outcome
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        utterance: &str,
        selected_geometry: Option<&GeometrySelection>,
    ) -> EngineResult<TurnOutcome> {
        let mut state = TurnState::Received;
        session.dialogue.push_user(utterance);

        state = TurnState::Resolving;
        debug!(?state, "turn state");
        let resolved = resolver::resolve(utterance);

        if let (IntentionType::Modification, Some((name, value))) =
            (&resolved.intention_type, fast_path_edit(&resolved.hints))
        {
            if session.pig.find_parameter(&name).is_some() {
                state = TurnState::FastPath;
                debug!(?state, "turn state");
                return self.run_fast_path(session, &name, value, &mut state).await;
            }
        }

        state = TurnState::Planning;
        debug!(?state, "turn state");
        let response = self
            .planner
            .plan(utterance, &session.dialogue, &session.pig, selected_geometry)
            .await?;

        if response.requires_clarification {
            state = TurnState::Responding;
            debug!(?state, "turn state");
            session.dialogue.push_system(&response.response_text);
            return Ok(TurnOutcome {
                response_text: response.response_text,
                execution: None,
                requires_clarification: true,
                clarification_questions: response.clarification_questions,
            });
        }

        let Some(plan) = response.execution_plan else {
            state = TurnState::Responding;
            debug!(?state, "turn state");
            session.dialogue.push_system(&response.response_text);
            return Ok(TurnOutcome {
                response_text: response.response_text,
                execution: None,
                requires_clarification: false,
                clarification_questions: Vec::new(),
            });
        };

        state = TurnState::Executing;
        debug!(?state, "turn state");
        let mut script = assemble_script(&plan);
        let mut result = self.sandbox.run(&script).await?;
        let mut current_plan = plan;

        let mut attempts = 0;
        while !result.is_success() && attempts < MAX_CORRECTION_ATTEMPTS {
            state = TurnState::Correcting;
            debug!(?state, attempts, "turn state");
            let error_message = result.error.clone().unwrap_or_default();
            let traceback = result.traceback.clone().unwrap_or_default();
            let corrected = self
                .planner
                .correct(&script, &error_message, &traceback)
                .await?;
            let Some(plan) = corrected.execution_plan else {
                break;
            };
            current_plan = plan;
            script = assemble_script(&current_plan);
            result = self.sandbox.run(&script).await?;
            attempts += 1;
        }

        if !result.is_success() {
            state = TurnState::Done;
            debug!(?state, "turn state");
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string());
            session.dialogue.push_system(&message);
            return Ok(TurnOutcome {
                response_text: message,
                execution: Some(result),
                requires_clarification: false,
                clarification_questions: Vec::new(),
            });
        }

        state = TurnState::Absorbing;
        debug!(?state, "turn state");
        session.pig.absorb_plan(&current_plan)?;
        session.commit_execution(&result);

        let _ = script_builder::check_forbidden_selectors(&script);
        let _ = sandbox::persist_script(
            &self.scripts_dir,
            "new_instruction",
            &session.id,
            &current_plan.id,
            &script,
            chrono::Utc::now(),
        )
        .await;

        state = TurnState::Responding;
        debug!(?state, "turn state");
        session.dialogue.push_system(&response.response_text);
        state = TurnState::Done;
        debug!(?state, "turn state");

        Ok(TurnOutcome {
            response_text: response.response_text,
            execution: Some(result),
            requires_clarification: false,
            clarification_questions: Vec::new(),
        })
    }

    async fn run_fast_path(
        &self,
        session: &mut Session,
        name: &str,
        value: f64,
        state: &mut TurnState,
    ) -> EngineResult<TurnOutcome> {
        let affected = session
            .pig
            .update_parameter(name, ParamValue::Numeric(value))?;

        session.history.push(crate::pig::HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            description: format!("set {name} = {value}"),
            kind: crate::pig::HistoryEntryKind::ParameterUpdate {
                parameter: name.to_string(),
            },
        });

        if affected.is_empty() {
            *state = TurnState::Done;
            let message = format!("Updated {name} to {value}.");
            session.dialogue.push_system(&message);
            return Ok(TurnOutcome {
                response_text: message,
                execution: None,
                requires_clarification: false,
                clarification_questions: Vec::new(),
            });
        }

        *state = TurnState::Executing;
        debug!(state = ?*state, "turn state");
        let script = script_builder::assemble_script_from_pig(&session.pig);
        let result = self.sandbox.run(&script).await?;

        if result.is_success() {
            session.commit_execution(&result);
        }

        *state = TurnState::Done;
        let message = format!("Updated {name} to {value}.");
        session.dialogue.push_system(&message);
        Ok(TurnOutcome {
            response_text: message,
            execution: Some(result),
            requires_clarification: false,
            clarification_questions: Vec::new(),
        })
    }
}

fn fast_path_edit(hints: &ResolvedHints) -> Option<(String, f64)> {
    hints.parameter_edit.clone()
}
