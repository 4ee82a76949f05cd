//! Web search tool backed by Tavily's search API.

use serde_json::json;

use super::{str_param, u64_param, Tool, ToolFailure, ToolOutput, ToolParams};

pub const NAME: &str = "web_search_tool";

const DEFAULT_MAX_RESULTS: u64 = 10;

/// Web search tool for finding information on the internet.
pub struct WebSearchTool {
    /// Tavily API key (None if not configured)
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        match &api_key {
            Some(key) if !key.is_empty() => {
                tracing::info!("Tavily API key found, web search available");
            }
            _ => {
                tracing::debug!("Tavily API key not set, web search will be unavailable");
            }
        }

        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Search the web for information"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": DEFAULT_MAX_RESULTS,
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
        let query = str_param(parameters, "query").unwrap_or_default().trim();
        if query.len() < 2 {
            return Err(ToolFailure::new(
                "Query parameter is required and must be at least 2 characters long",
            ));
        }

        let api_key = self.api_key.clone().ok_or_else(|| {
            ToolFailure::new("Web search not available - Tavily API key not configured")
        })?;

        let max_results = u64_param(parameters, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 10);

        let request = tavily::SearchRequest {
            api_key,
            query: query.to_string(),
            search_depth: Some("basic".to_string()),
            include_answer: Some(true),
            include_images: Some(false),
            include_raw_content: Some(false),
            max_results: Some(max_results as i32),
            include_domains: None,
            exclude_domains: None,
        };

        let response = tavily::search(request)
            .await
            .map_err(|e| ToolFailure::retriable(format!("Web search failed: {e}")))?;

        let mut report = format!("# Web Search Results for: {query}\n\n");

        if let Some(answer) = response.answer.as_deref().filter(|a| !a.is_empty()) {
            report.push_str(&format!("**Answer**: {answer}\n\n"));
        }

        if response.results.is_empty() {
            report.push_str("No search results found.\n");
        }

        for (i, result) in response.results.iter().enumerate() {
            report.push_str(&format!("## {}. {}\n", i + 1, result.title));
            report.push_str(&format!("**URL**: {}\n", result.url));
            report.push_str(&format!("**Snippet**: {}\n\n", result.content));
        }

        let count = response.results.len();
        Ok(ToolOutput::new(report).with_metadata("results_found", json!(count)))
    }
}
