//! Intent detection.
//!
//! The LLM path asks for a structured reply and parses it line-by-line; the
//! keyword fallback is not merely for resilience, it is the correctness
//! floor: no user input may fail to classify.

use std::sync::Arc;

use crate::llm::{CompletionOptions, LlmClient};
use crate::tools::ToolDescriptor;

use super::decode;
use super::state::IntentType;

const SYSTEM_PROMPT: &str = "You are an AI assistant that analyzes user queries for a patent \
drafting assistant and determines whether they need a single tool, a multi-step workflow, or \
plain conversation.";

/// Action verbs counted by the multi-step heuristic.
const ACTION_VERBS: [&str; 6] = ["find", "search", "draft", "analyze", "create", "then"];

/// Classifier output: the verdict plus a tentative tool and parameter guess
/// (absent for conversation).
#[derive(Debug, Clone)]
pub struct IntentDetection {
    pub intent: IntentType,
    pub tool: Option<String>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl IntentDetection {
    fn conversation() -> Self {
        Self {
            intent: IntentType::Conversation,
            tool: None,
            parameters: serde_json::Map::new(),
        }
    }
}

pub struct IntentClassifier {
    llm: Option<Arc<dyn LlmClient>>,
}

impl IntentClassifier {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// Classify a user message against the available tool catalog.
    pub async fn classify(&self, user_input: &str, tools: &[ToolDescriptor]) -> IntentDetection {
        if let Some(llm) = &self.llm {
            let prompt = build_prompt(user_input, tools);
            match llm
                .complete(SYSTEM_PROMPT, &prompt, CompletionOptions::default())
                .await
            {
                Ok(reply) => {
                    if let Some(detection) = parse_reply(&reply, tools) {
                        tracing::debug!(
                            intent = detection.intent.as_str(),
                            tool = detection.tool.as_deref().unwrap_or(""),
                            "LLM intent detection"
                        );
                        return detection;
                    }
                    tracing::warn!("LLM intent reply unparsable, using keyword fallback");
                }
                Err(e) => {
                    tracing::warn!("LLM intent detection failed: {e}, using keyword fallback");
                }
            }
        }

        keyword_fallback(user_input, tools)
    }
}

fn build_prompt(user_input: &str, tools: &[ToolDescriptor]) -> String {
    let tools_text = if tools.is_empty() {
        "No tools available".to_string()
    } else {
        tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Available tools:
{tools_text}

User query: "{user_input}"

Analyze whether this query requires multiple steps, a single tool, or no tool at all.

Multi-step indicators:
- Multiple actions: "find X and then draft Y"
- Sequential dependencies: "search for prior art, then analyze it, then draft claims"

Respond in this exact format:
WORKFLOW_TYPE: [single_tool, multi_step, or conversation]
INTENT: [brief description of intent]
TOOLS: [comma-separated list of tools needed, or empty for conversation]
PARAMETERS: [JSON object with parameters for the first tool, or empty object {{}}]

Examples:
- "find prior art for AI patents" -> WORKFLOW_TYPE: single_tool, TOOLS: prior_art_search_tool, PARAMETERS: {{"query": "AI patents"}}
- "find prior art and draft 5 claims" -> WORKFLOW_TYPE: multi_step, TOOLS: prior_art_search_tool,claim_drafting_tool
- "hello how are you" -> WORKFLOW_TYPE: conversation, TOOLS: , PARAMETERS: {{}}"#
    )
}

/// Parse the structured LLM reply. `None` sends the caller to the fallback.
fn parse_reply(reply: &str, tools: &[ToolDescriptor]) -> Option<IntentDetection> {
    let fields = decode::parse_tagged_lines(reply);

    let intent = IntentType::parse(fields.get("WORKFLOW_TYPE")?)?;
    if intent == IntentType::Conversation {
        return Some(IntentDetection::conversation());
    }

    let tool = fields
        .get("TOOLS")
        .map(|t| t.split(',').next().unwrap_or("").trim().to_string())
        .filter(|t| !t.is_empty());

    // A named tool must exist in the catalog; otherwise the reply is junk.
    if let Some(name) = &tool {
        if !tools.iter().any(|t| &t.name == name) {
            return None;
        }
    }

    let parameters = fields
        .get("PARAMETERS")
        .and_then(|p| decode::extract_json_object(p))
        .and_then(|p| serde_json::from_str::<serde_json::Value>(p).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    Some(IntentDetection {
        intent,
        tool,
        parameters,
    })
}

/// Keyword-based classification used when the LLM is unavailable or its
/// reply is unparsable.
pub fn keyword_fallback(user_input: &str, tools: &[ToolDescriptor]) -> IntentDetection {
    let lower = user_input.to_lowercase();

    let verb_count = ACTION_VERBS
        .iter()
        .filter(|verb| lower.contains(*verb))
        .count();
    if verb_count >= 2 || lower.contains("and then") {
        return IntentDetection {
            intent: IntentType::MultiStep,
            tool: None,
            parameters: serde_json::Map::new(),
        };
    }

    let domain_hit = ["search", "prior art", "draft", "claim", "analyze"]
        .iter()
        .any(|kw| lower.contains(kw));
    if !domain_hit && !lower.contains("find") {
        return IntentDetection::conversation();
    }

    let (tool, parameters) = guess_tool(user_input, &lower, tools);
    IntentDetection {
        intent: IntentType::SingleTool,
        tool,
        parameters,
    }
}

/// Pick the single tool a query most likely wants, with a parameter guess.
fn guess_tool(
    user_input: &str,
    lower: &str,
    tools: &[ToolDescriptor],
) -> (Option<String>, serde_json::Map<String, serde_json::Value>) {
    let available = |name: &str| tools.iter().any(|t| t.name == name);

    let query_params = |query: String| {
        let mut map = serde_json::Map::new();
        map.insert("query".to_string(), serde_json::Value::String(query));
        map
    };
    let user_query_params = || {
        let mut map = serde_json::Map::new();
        map.insert(
            "user_query".to_string(),
            serde_json::Value::String(user_input.to_string()),
        );
        map
    };

    if (lower.contains("prior art") || lower.contains("patent"))
        && available(crate::tools::prior_art::NAME)
    {
        let query = extract_search_query(user_input, lower);
        return (
            Some(crate::tools::prior_art::NAME.to_string()),
            query_params(query),
        );
    }

    if (lower.contains("search") || lower.contains("find"))
        && available(crate::tools::web_search::NAME)
    {
        let query = extract_search_query(user_input, lower);
        return (
            Some(crate::tools::web_search::NAME.to_string()),
            query_params(query),
        );
    }

    if (lower.contains("analyze") || lower.contains("analysis"))
        && available(crate::tools::claim_analysis::NAME)
    {
        return (
            Some(crate::tools::claim_analysis::NAME.to_string()),
            user_query_params(),
        );
    }

    if (lower.contains("draft") || lower.contains("claim"))
        && available(crate::tools::claim_drafting::NAME)
    {
        return (
            Some(crate::tools::claim_drafting::NAME.to_string()),
            user_query_params(),
        );
    }

    (None, serde_json::Map::new())
}

/// Pull the actual search terms out of a search-shaped request, e.g.
/// "find prior art for AI patents" -> "AI patents".
pub(crate) fn extract_search_query(user_input: &str, lower: &str) -> String {
    for marker in ["prior art", "web search", "search", "find"] {
        if let Some(idx) = lower.find(marker) {
            let mut remaining = user_input[idx + marker.len()..].trim();

            loop {
                let mut stripped = false;
                for connector in ["and ", "then ", "for ", "about ", "on ", "me "] {
                    if let Some(rest) = remaining.strip_prefix(connector) {
                        remaining = rest.trim_start();
                        stripped = true;
                    }
                }
                if !stripped {
                    break;
                }
            }

            if !remaining.is_empty() {
                return remaining.to_string();
            }
        }
    }

    user_input.to_string()
}
