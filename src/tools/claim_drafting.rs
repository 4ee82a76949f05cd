//! Patent claim drafting tool.

use std::sync::Arc;

use serde_json::json;

use crate::llm::{CompletionOptions, LlmClient};

use super::{str_param, Tool, ToolFailure, ToolOutput, ToolParams};

pub const NAME: &str = "claim_drafting_tool";

const SYSTEM_PROMPT: &str = "You are a senior patent attorney drafting claims. Produce a \
numbered claim set in standard USPTO format: independent claims first, then dependent claims \
referencing them. Use precise antecedent basis and consistent terminology. Output markdown.";

/// Tool for drafting patent claims from an invention description.
pub struct ClaimDraftingTool {
    llm: Option<Arc<dyn LlmClient>>,
}

impl ClaimDraftingTool {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Tool for ClaimDraftingTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Draft patent claims based on an invention description using an LLM"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "user_query": {
                    "type": "string",
                    "description": "User query describing what claims to draft",
                    "minLength": 3,
                    "maxLength": 1000
                },
                "conversation_context": {
                    "type": "string",
                    "description": "Additional context from conversation history or prior steps",
                    "maxLength": 5000
                },
                "document_reference": {
                    "type": "string",
                    "description": "Reference to existing document content",
                    "maxLength": 10000
                }
            },
            "required": ["user_query"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
        let user_query = str_param(parameters, "user_query")
            .or_else(|| str_param(parameters, "query"))
            .unwrap_or_default()
            .trim();

        if user_query.len() < 3 {
            return Err(ToolFailure::new(
                "Invalid user query - must be at least 3 characters long",
            ));
        }

        let llm = self.llm.as_ref().ok_or_else(|| {
            ToolFailure::new("Claim drafting not available - no LLM endpoint configured")
        })?;

        let mut prompt = format!("Drafting request: {user_query}\n");
        // Planner-wired context arrives as "context"; clients send
        // "conversation_context".
        let context = str_param(parameters, "conversation_context")
            .or_else(|| str_param(parameters, "context"));
        if let Some(context) = context {
            if !context.trim().is_empty() {
                prompt.push_str(&format!("\nContext from earlier research:\n{context}\n"));
            }
        }
        if let Some(document) = str_param(parameters, "document_reference") {
            if !document.trim().is_empty() {
                prompt.push_str(&format!("\nDocument content:\n{document}\n"));
            }
        }
        prompt.push_str(
            "\nDraft the requested claims. If the request names a claim count, honor it; \
             otherwise draft one independent claim and two dependent claims.",
        );

        tracing::info!(query = user_query, "executing claim drafting");

        let claims = llm
            .complete(
                SYSTEM_PROMPT,
                &prompt,
                CompletionOptions {
                    max_tokens: 2048,
                    temperature: 0.3,
                },
            )
            .await
            .map_err(|e| ToolFailure::retriable(format!("Claim drafting failed: {e}")))?;

        Ok(ToolOutput::new(claims.trim().to_string()))
    }
}
