//! Workflow planning.
//!
//! The LLM is asked for a JSON plan matching the [`Step`] schema. Anything
//! that fails strict parsing or validation (including a single unknown tool)
//! rejects the whole plan and falls back to a deterministic heuristic, so
//! planning never fails outright.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{CompletionOptions, LlmClient};
use crate::tools::ToolDescriptor;

use super::decode;
use super::intent::{extract_search_query, IntentDetection};
use super::state::{IntentType, Step};

const SYSTEM_PROMPT: &str = "You are an AI workflow planner that creates execution plans for a \
patent drafting assistant. You respond with JSON only.";

/// Fallback tool preference, most generally useful first.
const PREFERRED_TOOLS: [&str; 4] = [
    crate::tools::web_search::NAME,
    crate::tools::prior_art::NAME,
    crate::tools::claim_drafting::NAME,
    crate::tools::claim_analysis::NAME,
];

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    workflow_plan: Vec<Step>,
}

pub struct WorkflowPlanner {
    llm: Option<Arc<dyn LlmClient>>,
}

impl WorkflowPlanner {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// Produce an ordered plan for the user's request (empty for
    /// conversation).
    pub async fn plan(
        &self,
        user_input: &str,
        tools: &[ToolDescriptor],
        hint: &IntentDetection,
    ) -> Vec<Step> {
        if hint.intent == IntentType::Conversation || tools.is_empty() {
            return Vec::new();
        }

        if let Some(llm) = &self.llm {
            let prompt = build_prompt(user_input, tools);
            match llm
                .complete(
                    SYSTEM_PROMPT,
                    &prompt,
                    CompletionOptions {
                        max_tokens: 2048,
                        temperature: 0.2,
                    },
                )
                .await
            {
                Ok(reply) => {
                    if let Some(plan) = parse_plan(&reply, tools) {
                        tracing::debug!(steps = plan.len(), "LLM produced workflow plan");
                        return plan;
                    }
                    tracing::warn!("LLM workflow plan invalid, using heuristic fallback");
                }
                Err(e) => {
                    tracing::warn!("LLM workflow planning failed: {e}, using heuristic fallback");
                }
            }
        }

        heuristic_plan(user_input, tools, hint)
    }
}

fn build_prompt(user_input: &str, tools: &[ToolDescriptor]) -> String {
    let tools_text = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Available tools:
{tools_text}

User query: "{user_input}"

Create a step-by-step execution plan. Consider what information must be
gathered first and how each step's output feeds the next.

Respond with a JSON object of this exact structure:
{{
  "workflow_plan": [
    {{
      "step": 1,
      "tool": "tool_name",
      "parameters": {{"param1": "value1"}},
      "depends_on": null,
      "output_key": "r1",
      "description": "What this step accomplishes"
    }},
    {{
      "step": 2,
      "tool": "tool_name",
      "parameters": {{"param1": "value1", "context": "{{r1}}"}},
      "depends_on": 1,
      "output_key": "r2",
      "description": "What this step accomplishes"
    }}
  ]
}}

Rules:
- A step's parameters may reference any earlier step's output by its output_key wrapped in braces, like "{{r1}}".
- The keys "{{document_content}}" and "{{conversation_history}}" are always available.
- At most one tool per step; use available tools only.
- For search tools, extract the actual search terms from the user input."#
    )
}

/// Parse and validate an LLM plan. Any unknown tool rejects the entire plan.
fn parse_plan(reply: &str, tools: &[ToolDescriptor]) -> Option<Vec<Step>> {
    let json_str = decode::extract_json_object(reply)?;
    let document: PlanDocument = serde_json::from_str(json_str).ok()?;

    let mut plan = document.workflow_plan;
    if plan.is_empty() {
        return None;
    }
    if plan
        .iter()
        .any(|step| !tools.iter().any(|t| t.name == step.tool))
    {
        tracing::warn!("plan references unknown tool, rejecting");
        return None;
    }
    if plan.iter().any(|step| step.output_key.trim().is_empty()) {
        return None;
    }

    plan.sort_by_key(|step| step.step);
    // Step numbers must be a contiguous 1..N sequence; models occasionally
    // emit gaps. depends_on stays as emitted (informational only).
    for (index, step) in plan.iter_mut().enumerate() {
        step.step = (index + 1) as u32;
    }
    Some(plan)
}

/// Deterministic fallback planning from the user input and intent hint.
fn heuristic_plan(
    user_input: &str,
    tools: &[ToolDescriptor],
    hint: &IntentDetection,
) -> Vec<Step> {
    let lower = user_input.to_lowercase();
    let available = |name: &str| tools.iter().any(|t| t.name == name);

    let has_search_verb =
        lower.contains("find") || lower.contains("search") || lower.contains("prior art");
    let wants_draft = lower.contains("draft");
    let wants_analysis = lower.contains("analyze") || lower.contains("analysis");

    // Search verb plus a draft/analyze verb: wire a two-step plan.
    if has_search_verb && (wants_draft || wants_analysis) {
        let search_tool = if lower.contains("prior art") && available(crate::tools::prior_art::NAME)
        {
            Some(crate::tools::prior_art::NAME)
        } else if available(crate::tools::web_search::NAME) {
            Some(crate::tools::web_search::NAME)
        } else if available(crate::tools::prior_art::NAME) {
            Some(crate::tools::prior_art::NAME)
        } else {
            None
        };

        let second_tool = if wants_draft && available(crate::tools::claim_drafting::NAME) {
            Some(crate::tools::claim_drafting::NAME)
        } else if available(crate::tools::claim_analysis::NAME) {
            Some(crate::tools::claim_analysis::NAME)
        } else {
            None
        };

        if let (Some(search_tool), Some(second_tool)) = (search_tool, second_tool) {
            let query = extract_search_query(user_input, &lower);

            let mut search_params = serde_json::Map::new();
            search_params.insert("query".to_string(), json!(query));

            let mut second_params = serde_json::Map::new();
            second_params.insert("user_query".to_string(), json!(user_input));
            second_params.insert("context".to_string(), json!("{r1}"));
            second_params.insert("document_reference".to_string(), json!("{document_content}"));

            return vec![
                Step {
                    step: 1,
                    tool: search_tool.to_string(),
                    parameters: search_params,
                    depends_on: None,
                    output_key: "r1".to_string(),
                    description: None,
                },
                Step {
                    step: 2,
                    tool: second_tool.to_string(),
                    parameters: second_params,
                    depends_on: Some(1),
                    output_key: "r2".to_string(),
                    description: None,
                },
            ];
        }
    }

    // Single step: honor the classifier's guess when it names a known tool,
    // otherwise fall through the fixed preference order.
    let tool = hint
        .tool
        .as_deref()
        .filter(|name| available(name))
        .or_else(|| PREFERRED_TOOLS.into_iter().find(|name| available(name)))
        .map(String::from)
        .or_else(|| tools.first().map(|t| t.name.clone()));

    let Some(tool) = tool else {
        return Vec::new();
    };

    let parameters = if hint.tool.as_deref() == Some(tool.as_str()) && !hint.parameters.is_empty() {
        hint.parameters.clone()
    } else {
        default_parameters(&tool, user_input, &lower)
    };

    vec![Step {
        step: 1,
        tool,
        parameters,
        depends_on: None,
        output_key: "r1".to_string(),
        description: None,
    }]
}

fn default_parameters(
    tool: &str,
    user_input: &str,
    lower: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut parameters = serde_json::Map::new();
    match tool {
        crate::tools::web_search::NAME | crate::tools::prior_art::NAME => {
            parameters.insert(
                "query".to_string(),
                json!(extract_search_query(user_input, lower)),
            );
        }
        _ => {
            parameters.insert("user_query".to_string(), json!(user_input));
        }
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intent::keyword_fallback;
    use serde_json::json;

    fn descriptors(names: &[&str]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .map(|name| ToolDescriptor {
                name: name.to_string(),
                description: format!("{name} description"),
                input_schema: json!({"type": "object"}),
            })
            .collect()
    }

    fn all_tools() -> Vec<ToolDescriptor> {
        descriptors(&[
            "prior_art_search_tool",
            "web_search_tool",
            "claim_drafting_tool",
            "claim_analysis_tool",
        ])
    }

    // =========================================================================
    // Plan parsing and validation
    // =========================================================================

    mod parse_plan_tests {
        use super::*;

        #[test]
        fn parses_two_step_plan() {
            let reply = r#"Here's the plan:
            {"workflow_plan": [
                {"step": 1, "tool": "web_search_tool", "parameters": {"query": "X"}, "depends_on": null, "output_key": "r1"},
                {"step": 2, "tool": "claim_drafting_tool", "parameters": {"user_query": "draft", "context": "{r1}"}, "depends_on": 1, "output_key": "r2"}
            ]}"#;

            let plan = parse_plan(reply, &all_tools()).unwrap();
            assert_eq!(plan.len(), 2);
            assert_eq!(plan[0].tool, "web_search_tool");
            assert_eq!(plan[1].parameters["context"], "{r1}");
            assert_eq!(plan[1].depends_on, Some(1));
        }

        #[test]
        fn unknown_tool_rejects_whole_plan() {
            let reply = r#"{"workflow_plan": [
                {"step": 1, "tool": "web_search_tool", "parameters": {}, "output_key": "r1"},
                {"step": 2, "tool": "teleport_tool", "parameters": {}, "output_key": "r2"}
            ]}"#;

            assert!(parse_plan(reply, &all_tools()).is_none());
        }

        #[test]
        fn missing_required_field_rejects_plan() {
            // No output_key on step 1.
            let reply = r#"{"workflow_plan": [
                {"step": 1, "tool": "web_search_tool", "parameters": {}}
            ]}"#;
            assert!(parse_plan(reply, &all_tools()).is_none());
        }

        #[test]
        fn empty_plan_rejected() {
            assert!(parse_plan(r#"{"workflow_plan": []}"#, &all_tools()).is_none());
            assert!(parse_plan("total gibberish", &all_tools()).is_none());
        }

        #[test]
        fn out_of_order_steps_are_sorted() {
            let reply = r#"{"workflow_plan": [
                {"step": 2, "tool": "claim_drafting_tool", "parameters": {}, "output_key": "r2"},
                {"step": 1, "tool": "web_search_tool", "parameters": {}, "output_key": "r1"}
            ]}"#;

            let plan = parse_plan(reply, &all_tools()).unwrap();
            assert_eq!(plan[0].step, 1);
            assert_eq!(plan[0].tool, "web_search_tool");
            assert_eq!(plan[1].step, 2);
        }

        #[test]
        fn gappy_step_numbers_are_renumbered() {
            let reply = r#"{"workflow_plan": [
                {"step": 2, "tool": "web_search_tool", "parameters": {}, "output_key": "r1"},
                {"step": 5, "tool": "claim_drafting_tool", "parameters": {}, "output_key": "r2"}
            ]}"#;

            let plan = parse_plan(reply, &all_tools()).unwrap();
            assert_eq!(plan[0].step, 1);
            assert_eq!(plan[1].step, 2);
        }
    }

    // =========================================================================
    // Heuristic fallback
    // =========================================================================

    mod heuristic_tests {
        use super::*;

        #[test]
        fn search_then_draft_becomes_two_steps() {
            let input = "find prior art for AI patents and draft claims";
            let hint = keyword_fallback(input, &all_tools());
            let plan = heuristic_plan(input, &all_tools(), &hint);

            assert_eq!(plan.len(), 2);
            assert_eq!(plan[0].tool, "prior_art_search_tool");
            assert_eq!(plan[0].output_key, "r1");
            assert_eq!(plan[0].parameters["query"], "AI patents");
            assert_eq!(plan[1].tool, "claim_drafting_tool");
            assert_eq!(plan[1].parameters["context"], "{r1}");
            assert_eq!(plan[1].parameters["document_reference"], "{document_content}");
            assert_eq!(plan[1].depends_on, Some(1));
        }

        #[test]
        fn web_search_then_draft_uses_web_search() {
            let input = "web search ramy atawia, then draft 3 claims";
            let hint = keyword_fallback(input, &all_tools());
            let plan = heuristic_plan(input, &all_tools(), &hint);

            assert_eq!(plan.len(), 2);
            assert_eq!(plan[0].tool, "web_search_tool");
            assert_eq!(plan[1].tool, "claim_drafting_tool");
        }

        #[test]
        fn search_then_analyze_uses_analysis_tool() {
            let input = "search for blockchain patents and analyze them";
            let hint = keyword_fallback(input, &all_tools());
            let plan = heuristic_plan(input, &all_tools(), &hint);

            assert_eq!(plan.len(), 2);
            assert_eq!(plan[1].tool, "claim_analysis_tool");
        }

        #[test]
        fn single_step_honors_classifier_guess() {
            let input = "find prior art for AI patents";
            let hint = keyword_fallback(input, &all_tools());
            let plan = heuristic_plan(input, &all_tools(), &hint);

            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].tool, "prior_art_search_tool");
            assert_eq!(plan[0].parameters["query"], "AI patents");
            assert_eq!(plan[0].output_key, "r1");
        }

        #[test]
        fn single_step_prefers_web_search_without_hint() {
            let hint = IntentDetection {
                intent: IntentType::SingleTool,
                tool: None,
                parameters: serde_json::Map::new(),
            };
            let plan = heuristic_plan("look into widgets", &all_tools(), &hint);

            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].tool, "web_search_tool");
        }

        #[test]
        fn falls_back_to_first_available_tool() {
            let tools = descriptors(&["bespoke_tool"]);
            let hint = IntentDetection {
                intent: IntentType::SingleTool,
                tool: None,
                parameters: serde_json::Map::new(),
            };
            let plan = heuristic_plan("do the thing", &tools, &hint);

            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].tool, "bespoke_tool");
            assert_eq!(plan[0].parameters["user_query"], "do the thing");
        }
    }

    mod planner_tests {
        use super::*;

        #[tokio::test]
        async fn conversation_intent_plans_nothing() {
            let planner = WorkflowPlanner::new(None);
            let hint = IntentDetection {
                intent: IntentType::Conversation,
                tool: None,
                parameters: serde_json::Map::new(),
            };

            let plan = planner.plan("hello", &all_tools(), &hint).await;
            assert!(plan.is_empty());
        }

        #[tokio::test]
        async fn no_tools_plans_nothing() {
            let planner = WorkflowPlanner::new(None);
            let hint = IntentDetection {
                intent: IntentType::SingleTool,
                tool: None,
                parameters: serde_json::Map::new(),
            };

            let plan = planner.plan("search something", &[], &hint).await;
            assert!(plan.is_empty());
        }

        #[tokio::test]
        async fn without_llm_uses_heuristic() {
            let planner = WorkflowPlanner::new(None);
            let input = "find prior art for AI patents";
            let hint = keyword_fallback(input, &all_tools());

            let plan = planner.plan(input, &all_tools(), &hint).await;
            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].tool, "prior_art_search_tool");
        }
    }
}
