//! Builds the structured prompt sent to the chat model: role preamble,
//! recent dialogue, current model/PIG state, a DSL cheatsheet, the
//! response schema, and a couple of worked examples.

use crate::dialogue::Dialogue;
use crate::pig::Pig;
use crate::types::GeometrySelection;

const DSL_CHEATSHEET: &str = r#"
Available operations (always bind the final shape to `result`):
  cq.Workplane("XY").box(length, width, height)
  cq.Workplane("XY").cylinder(height, radius)
  cq.Workplane("XY").sphere(radius)
  <solid>.extrude(distance)
  <solid>.cut(<tool>)
  <solid>.union(<other>)
  <solid>.edges().fillet(radius)      # never select edges with |X/|Y/|Z
  <solid>.edges().chamfer(distance)
  <solid>.faces(">Z").workplane().hole(diameter)   # contextual hole on a face
Always declare every dimension as a named parameter; never hardcode a
literal directly into an operation call.
"#;

const FEW_SHOT_EXAMPLES: &str = r#"
Example:
User: "Create a cylinder with radius 10 and height 20"
Response:
{
  "intention_type": "creation",
  "response_text": "Created a 10mm-radius, 20mm-tall cylinder.",
  "execution_plan": {
    "id": "plan-1",
    "description": "cylinder primitive",
    "cadquery_code": "result = cq.Workplane(\"XY\").cylinder(cylinder_height, cylinder_radius)",
    "parameters": {"cylinder_radius": 10, "cylinder_height": 20}
  },
  "parameter_updates": {},
  "requires_clarification": false,
  "clarification_questions": [],
  "confidence": 0.95
}
"#;

pub struct PromptContext<'a> {
    pub utterance: &'a str,
    pub dialogue: &'a Dialogue,
    pub pig: &'a Pig,
    pub selected_geometry: Option<&'a GeometrySelection>,
    pub schema: &'a serde_json::Value,
}

fn render_pig_state(pig: &Pig) -> String {
    let mut out = String::from("Current parameters:\n");
    for param in pig.parameters() {
        out.push_str(&format!("  {} = {}\n", param.name, param.value));
    }
    out.push_str("Current operations:\n");
    for op in pig.operations() {
        out.push_str(&format!("  {} ({})\n", op.name, op.operation.kind()));
    }
    out
}

fn render_selected_geometry(selection: Option<&GeometrySelection>) -> String {
    match selection {
        Some(sel) => format!(
            "User has selected a {:?} (id={}) on the current model.\n",
            sel.element_kind, sel.element_id
        ),
        None => String::new(),
    }
}

/// Build the initial plan-request prompt for a turn.
pub fn build_plan_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        "You are an expert parametric CAD design assistant.\n\n\
         Conversation so far:\n{history}\n\n\
         User request: {utterance}\n\n\
         {selection}\
         {pig_state}\n\
         {cheatsheet}\n\
         {examples}\n\
         Respond with a single JSON object matching this schema, and \
         nothing else (no prose, no markdown fences):\n{schema}\n",
        history = ctx.dialogue.render_recent(5),
        utterance = ctx.utterance,
        selection = render_selected_geometry(ctx.selected_geometry),
        pig_state = render_pig_state(ctx.pig),
        cheatsheet = DSL_CHEATSHEET,
        examples = FEW_SHOT_EXAMPLES,
        schema = ctx.schema,
    )
}

/// Build the self-correction prompt: the prior plan, the error it
/// produced, and a short table of common fixes.
pub fn build_correction_prompt(prior_script: &str, error_message: &str, traceback: &str) -> String {
    format!(
        "The following CadQuery script failed to execute.\n\n\
         Script:\n{prior_script}\n\n\
         Error: {error_message}\n\
         Traceback:\n{traceback}\n\n\
         Common fixes:\n\
         - Fillet/chamfer failures: select edges with `.edges()` with no \
           directional selector, never `.edges(\"|Z\")`.\n\
         - Missing parameter errors: every dimension used in the script \
           must appear in the parameters block.\n\
         - Invalid object references: only reference variables defined \
           earlier in the same script.\n\n\
         {cheatsheet}\n\
         Return a corrected JSON response in the same schema as before.\n",
        cheatsheet = DSL_CHEATSHEET,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pig::ParamValue;

    #[test]
    fn prompt_includes_utterance_and_pig_state() {
        let mut pig = Pig::new();
        pig.add_parameter("radius", ParamValue::Numeric(10.0));
        let dialogue = Dialogue::new("session-1");
        let schema = serde_json::json!({"type": "object"});
        let ctx = PromptContext {
            utterance: "make it bigger",
            dialogue: &dialogue,
            pig: &pig,
            selected_geometry: None,
            schema: &schema,
        };
        let prompt = build_plan_prompt(&ctx);
        assert!(prompt.contains("make it bigger"));
        assert!(prompt.contains("radius = 10"));
    }

    #[test]
    fn correction_prompt_carries_the_error() {
        let prompt = build_correction_prompt("result = 1", "edge selector failed", "trace");
        assert!(prompt.contains("edge selector failed"));
        assert!(prompt.contains(".edges()"));
    }
}
