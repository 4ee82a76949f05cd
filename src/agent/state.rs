//! Workflow state threaded through the engine.
//!
//! A [`WorkflowState`] lives only while its job is PROCESSING; it is owned by
//! the single executing worker task and never shared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::jobs::{ChatMessage, JobRequest};
use crate::tools::{ToolDescriptor, ToolFailure, ToolOutput};

/// The classifier's verdict on a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Conversation,
    SingleTool,
    MultiStep,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Conversation => "conversation",
            IntentType::SingleTool => "single_tool",
            IntentType::MultiStep => "multi_step",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "conversation" => Some(IntentType::Conversation),
            "single_tool" => Some(IntentType::SingleTool),
            "multi_step" => Some(IntentType::MultiStep),
            _ => None,
        }
    }
}

/// One entry in a workflow plan.
///
/// Parameter values of the exact shape `{key}` are context references,
/// resolved at execution time against earlier steps' output keys or the
/// well-known state fields `document_content` and `conversation_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position in the plan.
    pub step: u32,

    /// Name of a tool in the registry.
    pub tool: String,

    pub parameters: serde_json::Map<String, serde_json::Value>,

    /// Informational only; ordering is given by the sequence itself.
    #[serde(default)]
    pub depends_on: Option<u32>,

    /// Symbolic name by which later steps reference this step's result.
    pub output_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Result of one executed step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Ok(ToolOutput),
    Err(ToolFailure),
}

/// A step's recorded result, kept under its 1-based step number.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub tool: String,
    pub output_key: String,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, StepOutcome::Ok(_))
    }

    /// The text a later step sees when it references this step's output key:
    /// the markdown content on success, a stringified error otherwise.
    pub fn context_content(&self) -> String {
        match &self.outcome {
            StepOutcome::Ok(output) => output.content.clone(),
            StepOutcome::Err(failure) => {
                format!("Tool {} failed: {}", self.tool, failure.message)
            }
        }
    }
}

/// Live workflow record for one job.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub user_input: String,
    pub document_content: String,
    pub conversation_history: Vec<ChatMessage>,
    pub available_tools: Vec<ToolDescriptor>,
    pub workflow_plan: Vec<Step>,
    /// Step number of the step just completed; 0 before any step.
    pub current_step: u32,
    pub step_results: BTreeMap<u32, StepRecord>,
    pub intent_type: Option<IntentType>,
    pub final_response: String,
}

impl WorkflowState {
    pub fn new(request: &JobRequest, available_tools: Vec<ToolDescriptor>) -> Self {
        Self {
            user_input: request.message.clone(),
            document_content: request.document_content.clone(),
            conversation_history: request.chat_history.clone(),
            available_tools,
            ..Default::default()
        }
    }

    /// Conversation history as plain text, for prompt and context use.
    pub fn rendered_history(&self) -> String {
        self.conversation_history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Count of successfully completed steps.
    pub fn completed_steps(&self) -> usize {
        self.step_results.values().filter(|r| r.is_ok()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_type_round_trips_as_snake_case() {
        assert_eq!(IntentType::SingleTool.as_str(), "single_tool");
        assert_eq!(IntentType::parse("multi_step"), Some(IntentType::MultiStep));
        assert_eq!(IntentType::parse("nonsense"), None);
        assert_eq!(
            serde_json::to_string(&IntentType::MultiStep).unwrap(),
            "\"multi_step\""
        );
    }

    #[test]
    fn step_deserializes_from_plan_json() {
        let json = r#"{
            "step": 2,
            "tool": "claim_drafting_tool",
            "parameters": {"user_query": "draft claims", "context": "{r1}"},
            "depends_on": 1,
            "output_key": "r2",
            "description": "Draft claims from the search results"
        }"#;

        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.step, 2);
        assert_eq!(step.tool, "claim_drafting_tool");
        assert_eq!(step.depends_on, Some(1));
        assert_eq!(step.parameters["context"], "{r1}");
    }

    #[test]
    fn step_requires_core_fields() {
        // Missing output_key must be a hard parse failure.
        let json = r#"{"step": 1, "tool": "x", "parameters": {}}"#;
        assert!(serde_json::from_str::<Step>(json).is_err());
    }

    #[test]
    fn record_context_content_stringifies_errors() {
        let ok = StepRecord {
            tool: "web_search_tool".to_string(),
            output_key: "r1".to_string(),
            outcome: StepOutcome::Ok(ToolOutput::new("# Results")),
        };
        assert_eq!(ok.context_content(), "# Results");

        let err = StepRecord {
            tool: "web_search_tool".to_string(),
            output_key: "r1".to_string(),
            outcome: StepOutcome::Err(ToolFailure::new("rate limited")),
        };
        assert_eq!(
            err.context_content(),
            "Tool web_search_tool failed: rate limited"
        );
    }

    #[test]
    fn rendered_history_joins_role_and_content() {
        let state = WorkflowState {
            conversation_history: vec![
                ChatMessage {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                },
                ChatMessage {
                    role: "assistant".to_string(),
                    content: "hello".to_string(),
                },
            ],
            ..Default::default()
        };

        assert_eq!(state.rendered_history(), "user: hi\nassistant: hello");
    }
}
