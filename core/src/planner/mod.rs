//! Planner: builds prompts, calls the configured LLM backend, salvages
//! and validates the response, and produces a `Plan` (or a
//! clarification request) for the orchestrator.

pub mod backend;
pub mod logging;
pub mod prompt;
pub mod response;
pub mod salvage;
pub mod validate;

pub use backend::{CloudBackend, LlmBackend, LocalBackend};

use std::path::PathBuf;
use std::sync::Arc;

use crate::dialogue::Dialogue;
use crate::error::{EngineError, EngineResult};
use crate::pig::Pig;
use crate::types::{GeometrySelection, LlmResponse};

pub struct Planner {
    backend: Arc<dyn LlmBackend>,
    provider_name: String,
    model_name: String,
    responses_dir: PathBuf,
}

impl Planner {
    pub fn new(backend: Arc<dyn LlmBackend>, provider_name: String, model_name: String, responses_dir: PathBuf) -> Self {
        Self {
            backend,
            provider_name,
            model_name,
            responses_dir,
        }
    }

    async fn call_and_parse(&self, prompt: &str, context: &str) -> EngineResult<LlmResponse> {
        let raw = self.backend.call(prompt).await?;

        let _ = logging::persist_response(
            &self.responses_dir,
            context,
            &self.provider_name,
            &self.model_name,
            prompt,
            &raw,
            chrono::Utc::now(),
        )
        .await;

        let value = salvage::salvage_json(&raw);

        let schema_errors = validate::validate_schema(&value);
        if !schema_errors.is_empty() {
            return Err(EngineError::PlanInvalid {
                errors: schema_errors,
            });
        }

        let parsed = response::parse_llm_response(&value)?;

        if let Some(plan) = &parsed.execution_plan {
            let semantic_errors = validate::validate_plan_semantics(plan);
            if !semantic_errors.is_empty() {
                return Err(EngineError::PlanInvalid {
                    errors: semantic_errors,
                });
            }
        }

        Ok(parsed)
    }

    pub async fn plan(
        &self,
        utterance: &str,
        dialogue: &Dialogue,
        pig: &Pig,
        selected_geometry: Option<&GeometrySelection>,
    ) -> EngineResult<LlmResponse> {
        let schema = validate::response_schema();
        let ctx = prompt::PromptContext {
            utterance,
            dialogue,
            pig,
            selected_geometry,
            schema: &schema,
        };
        let rendered = prompt::build_plan_prompt(&ctx);
        self.call_and_parse(&rendered, "new_instruction").await
    }

    pub async fn correct(
        &self,
        prior_script: &str,
        error_message: &str,
        traceback: &str,
    ) -> EngineResult<LlmResponse> {
        let rendered = prompt::build_correction_prompt(prior_script, error_message, traceback);
        self.call_and_parse(&rendered, "error_correction").await
    }
}
