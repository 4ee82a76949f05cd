//! Patent claim analysis tool.

use std::sync::Arc;

use serde_json::json;

use crate::llm::{CompletionOptions, LlmClient};

use super::{str_param, Tool, ToolFailure, ToolOutput, ToolParams};

pub const NAME: &str = "claim_analysis_tool";

const ANALYSIS_TYPES: [&str; 3] = ["basic", "comprehensive", "expert"];

const SYSTEM_PROMPT: &str = "You are a patent claim analyst. Assess the supplied claims for \
validity risks, clarity, claim scope, and improvement opportunities. Organize the output as a \
markdown report with quality assessment, risk assessment, and recommendations sections.";

/// Tool for analyzing patent claims for validity, quality, and improvement
/// opportunities.
pub struct ClaimAnalysisTool {
    llm: Option<Arc<dyn LlmClient>>,
}

impl ClaimAnalysisTool {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Tool for ClaimAnalysisTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Analyze patent claims for validity, quality, and improvement opportunities using an LLM"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "claims": {
                    "type": "string",
                    "description": "Patent claims to analyze, or context containing them"
                },
                "user_query": {
                    "type": "string",
                    "description": "What the user wants analyzed"
                },
                "analysis_type": {
                    "type": "string",
                    "description": "Type of analysis to perform",
                    "enum": ANALYSIS_TYPES,
                    "default": "comprehensive"
                }
            },
            "required": ["claims"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
        // The claims text may arrive directly, via a context substitution, or
        // folded into the user query.
        let claims = str_param(parameters, "claims")
            .or_else(|| str_param(parameters, "context"))
            .or_else(|| str_param(parameters, "conversation_context"))
            .or_else(|| str_param(parameters, "user_query"))
            .unwrap_or_default()
            .trim();

        if claims.len() < 3 {
            return Err(ToolFailure::new(
                "No claims supplied - provide claims text or a user query",
            ));
        }

        let analysis_type = str_param(parameters, "analysis_type")
            .filter(|t| ANALYSIS_TYPES.contains(t))
            .unwrap_or("comprehensive");

        let llm = self.llm.as_ref().ok_or_else(|| {
            ToolFailure::new("Claim analysis not available - no LLM endpoint configured")
        })?;

        let mut prompt = format!("Analysis type: {analysis_type}\n\nClaims to analyze:\n{claims}\n");
        if let Some(query) = str_param(parameters, "user_query") {
            if !query.trim().is_empty() && query.trim() != claims {
                prompt.push_str(&format!("\nUser request: {}\n", query.trim()));
            }
        }

        tracing::info!(analysis_type, "executing claim analysis");

        let report = llm
            .complete(
                SYSTEM_PROMPT,
                &prompt,
                CompletionOptions {
                    max_tokens: 2048,
                    temperature: 0.2,
                },
            )
            .await
            .map_err(|e| ToolFailure::retriable(format!("Claim analysis failed: {e}")))?;

        Ok(ToolOutput::new(report.trim().to_string())
            .with_metadata("analysis_type", json!(analysis_type)))
    }
}
