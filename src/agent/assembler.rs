//! Response assembly.
//!
//! Deliberately dumb: step outputs are concatenated under fixed headings, in
//! plan order, with no reformatting, re-ordering, or LLM involvement. Given
//! the step outputs, the final response is deterministic.

use super::state::{IntentType, StepOutcome, WorkflowState};

pub const CONVERSATION_REPLY: &str =
    "I'm here to help! How can I assist you with your patent-related tasks?";

const NO_STEPS_REPLY: &str =
    "I'm not sure how to help with that request. Could you please provide more details?";

const NO_CONTENT_REPLY: &str = "I completed the workflow but didn't get any results.";

/// Heading for a tool's section of the response. Unknown tools use their raw
/// name.
fn section_heading(tool: &str) -> String {
    match tool {
        crate::tools::prior_art::NAME => "Prior Art Search Results".to_string(),
        crate::tools::claim_drafting::NAME => "Draft Claims".to_string(),
        crate::tools::claim_analysis::NAME => "Claim Analysis".to_string(),
        crate::tools::web_search::NAME => "Web Search Results".to_string(),
        other => format!("{other} Results"),
    }
}

/// Combine step outputs into the single user-facing markdown response.
pub fn assemble_response(state: &WorkflowState) -> String {
    if state.intent_type == Some(IntentType::Conversation) {
        return CONVERSATION_REPLY.to_string();
    }

    if state.step_results.is_empty() {
        return NO_STEPS_REPLY.to_string();
    }

    let mut sections = Vec::new();
    let mut failures = Vec::new();

    for step in &state.workflow_plan {
        let Some(record) = state.step_results.get(&step.step) else {
            continue;
        };
        match &record.outcome {
            StepOutcome::Ok(output) => {
                sections.push(format!(
                    "**{}:**\n{}",
                    section_heading(&step.tool),
                    output.content
                ));
            }
            StepOutcome::Err(failure) => {
                failures.push(format!(
                    "Step {} ({}) failed: {}.",
                    step.step, step.tool, failure.message
                ));
            }
        }
    }

    if !failures.is_empty() {
        let mut response = String::new();
        if !sections.is_empty() {
            response.push_str(&sections.join("\n\n"));
            response.push_str("\n\n");
        }
        response.push_str("I completed some steps but encountered issues with others. ");
        response.push_str(&failures.join(" "));
        return response;
    }

    if sections.is_empty() {
        return NO_CONTENT_REPLY.to_string();
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{Step, StepRecord};
    use crate::tools::{ToolFailure, ToolOutput};
    use serde_json::json;

    fn plan_step(n: u32, tool: &str) -> Step {
        Step {
            step: n,
            tool: tool.to_string(),
            parameters: json!({}).as_object().unwrap().clone(),
            depends_on: None,
            output_key: format!("r{n}"),
            description: None,
        }
    }

    fn ok_record(tool: &str, key: &str, content: &str) -> StepRecord {
        StepRecord {
            tool: tool.to_string(),
            output_key: key.to_string(),
            outcome: StepOutcome::Ok(ToolOutput::new(content)),
        }
    }

    fn err_record(tool: &str, key: &str, message: &str) -> StepRecord {
        StepRecord {
            tool: tool.to_string(),
            output_key: key.to_string(),
            outcome: StepOutcome::Err(ToolFailure::new(message)),
        }
    }

    #[test]
    fn conversation_intent_gets_canned_reply() {
        let state = WorkflowState {
            intent_type: Some(IntentType::Conversation),
            ..Default::default()
        };
        assert_eq!(assemble_response(&state), CONVERSATION_REPLY);
    }

    #[test]
    fn no_steps_with_tool_intent_gets_unable_reply() {
        let state = WorkflowState {
            intent_type: Some(IntentType::SingleTool),
            ..Default::default()
        };
        assert_eq!(assemble_response(&state), NO_STEPS_REPLY);
    }

    #[test]
    fn single_prior_art_step_leads_with_heading() {
        let mut state = WorkflowState {
            intent_type: Some(IntentType::SingleTool),
            workflow_plan: vec![plan_step(1, "prior_art_search_tool")],
            ..Default::default()
        };
        state.step_results.insert(
            1,
            ok_record("prior_art_search_tool", "r1", "# Report\nPatents..."),
        );

        let response = assemble_response(&state);
        assert!(response.starts_with("**Prior Art Search Results:**"));
        assert!(response.contains("Patents..."));
    }

    #[test]
    fn multi_step_sections_follow_plan_order() {
        let mut state = WorkflowState {
            intent_type: Some(IntentType::MultiStep),
            workflow_plan: vec![
                plan_step(1, "web_search_tool"),
                plan_step(2, "claim_drafting_tool"),
            ],
            ..Default::default()
        };
        state
            .step_results
            .insert(1, ok_record("web_search_tool", "r1", "search content"));
        state
            .step_results
            .insert(2, ok_record("claim_drafting_tool", "r2", "claim content"));

        let response = assemble_response(&state);
        let search_idx = response.find("**Web Search Results:**").unwrap();
        let draft_idx = response.find("**Draft Claims:**").unwrap();
        assert!(search_idx < draft_idx);
        assert!(response.contains("search content"));
        assert!(response.contains("claim content"));
    }

    #[test]
    fn failure_summary_follows_successful_sections() {
        let mut state = WorkflowState {
            intent_type: Some(IntentType::MultiStep),
            workflow_plan: vec![
                plan_step(1, "web_search_tool"),
                plan_step(2, "claim_drafting_tool"),
            ],
            ..Default::default()
        };
        state
            .step_results
            .insert(1, ok_record("web_search_tool", "r1", "found things"));
        state
            .step_results
            .insert(2, err_record("claim_drafting_tool", "r2", "LLM unavailable"));

        let response = assemble_response(&state);
        assert!(response.contains("found things"));
        assert!(response.contains("Step 2 (claim_drafting_tool) failed: LLM unavailable."));
        // Successful content precedes the failure summary.
        assert!(
            response.find("found things").unwrap()
                < response.find("encountered issues").unwrap()
        );
    }

    #[test]
    fn first_step_failure_still_mentions_failed() {
        let mut state = WorkflowState {
            intent_type: Some(IntentType::SingleTool),
            workflow_plan: vec![plan_step(1, "web_search_tool")],
            ..Default::default()
        };
        state
            .step_results
            .insert(1, err_record("web_search_tool", "r1", "boom"));

        let response = assemble_response(&state);
        assert!(response.contains("failed"));
        assert!(response.contains("boom"));
    }

    #[test]
    fn unknown_tool_uses_raw_name_heading() {
        let mut state = WorkflowState {
            intent_type: Some(IntentType::SingleTool),
            workflow_plan: vec![plan_step(1, "bespoke_tool")],
            ..Default::default()
        };
        state
            .step_results
            .insert(1, ok_record("bespoke_tool", "r1", "output"));

        let response = assemble_response(&state);
        assert!(response.starts_with("**bespoke_tool Results:**"));
    }
}
