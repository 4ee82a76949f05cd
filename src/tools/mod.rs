//! Tool adapter layer.
//!
//! Every capability the workflow engine can invoke implements [`Tool`]: a
//! uniform JSON-parameters-in, markdown-out contract. The registry is the only
//! place that knows how tools are addressed; the engine receives handles and
//! descriptors, never URLs.
//!
//! Tools may perform I/O and may fail, but never mutate orchestrator state.

pub mod claim_analysis;
pub mod claim_drafting;
pub mod prior_art;
pub mod web_search;

pub use claim_analysis::ClaimAnalysisTool;
pub use claim_drafting::ClaimDraftingTool;
pub use prior_art::PriorArtSearchTool;
pub use web_search::WebSearchTool;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters passed to a tool, already context-substituted.
pub type ToolParams = serde_json::Map<String, serde_json::Value>;

/// Successful tool output: markdown content suitable for direct inclusion in
/// the final response, plus optional metadata.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A failed tool invocation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
    pub retriable: bool,
}

impl ToolFailure {
    /// A permanent failure (bad parameters, missing configuration).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: false,
        }
    }

    /// A transient failure (network, upstream service).
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retriable: true,
        }
    }
}

/// An external capability addressable by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-Schema-like description of the accepted parameters. The
    /// orchestrator treats this as opaque and only forwards it to the intent
    /// classifier and planner prompts.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure>;
}

/// Static description of a tool, handed to the classifier and planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Name-addressed collection of tools.
///
/// Safe for concurrent calls from distinct jobs; individual tools are
/// responsible for their own concurrency.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for every registered tool, in stable name order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Dispatch a call to the named tool.
    pub async fn execute(
        &self,
        name: &str,
        parameters: &ToolParams,
    ) -> Result<ToolOutput, ToolFailure> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolFailure::new(format!("Unknown tool: {name}")))?;

        tracing::debug!(tool = name, "executing tool");
        tool.execute(parameters).await
    }
}

/// Read a string parameter, if present.
pub(crate) fn str_param<'a>(parameters: &'a ToolParams, key: &str) -> Option<&'a str> {
    parameters.get(key).and_then(|v| v.as_str())
}

/// Read an integer parameter, if present.
pub(crate) fn u64_param(parameters: &ToolParams, key: &str) -> Option<u64> {
    parameters.get(key).and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo_tool"
        }

        fn description(&self) -> &str {
            "Echoes its input back"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
            let text = str_param(parameters, "text").unwrap_or_default();
            Ok(ToolOutput::new(text))
        }
    }

    fn params(value: serde_json::Value) -> ToolParams {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let output = registry
            .execute("echo_tool", &params(json!({"text": "hello"})))
            .await
            .unwrap();

        assert_eq!(output.content, "hello");
    }

    #[tokio::test]
    async fn registry_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", &ToolParams::new())
            .await
            .unwrap_err();

        assert!(err.message.contains("Unknown tool"));
        assert!(!err.retriable);
    }

    #[test]
    fn descriptors_are_name_ordered() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "echo_tool");
        assert!(descriptors[0].input_schema.is_object());
    }

    #[test]
    fn param_helpers_read_values() {
        let p = params(json!({"text": "x", "n": 5, "flag": true}));
        assert_eq!(str_param(&p, "text"), Some("x"));
        assert_eq!(str_param(&p, "n"), None);
        assert_eq!(u64_param(&p, "n"), Some(5));
        assert_eq!(u64_param(&p, "missing"), None);
    }

    #[test]
    fn tool_failure_constructors() {
        assert!(!ToolFailure::new("x").retriable);
        assert!(ToolFailure::retriable("y").retriable);
    }
}
