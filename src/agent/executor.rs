//! Sequential plan execution with context substitution.
//!
//! Steps run strictly in order. Cancellation is checked before the first
//! step, between steps, and before every progress write; an in-flight tool
//! call is raced against the job's cancellation token so a cancel interrupts
//! the I/O and its result is never recorded.

use tokio_util::sync::CancellationToken;

use crate::jobs::ProgressTracker;
use crate::tools::{ToolParams, ToolRegistry};

use super::state::{StepOutcome, StepRecord, WorkflowState};

/// Run every step of the plan, recording results into
/// `state.step_results`.
///
/// Returns `false` when execution was cut short by cancellation. A step
/// failure is not a cancellation: the error is recorded, later steps are
/// skipped, and `true` is returned so the workflow can still conclude.
pub async fn execute_plan(
    registry: &ToolRegistry,
    state: &mut WorkflowState,
    progress: &mut ProgressTracker,
    cancel: &CancellationToken,
) -> bool {
    let total_steps = state.workflow_plan.len();
    let plan = state.workflow_plan.clone();

    for (index, step) in plan.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(step = step.step, "cancelled before step");
            return false;
        }

        let (start_pct, end_pct) = ProgressTracker::step_bounds(index + 1, total_steps);
        progress.set_bounds(start_pct, end_pct);
        if !progress.update(0) {
            return false;
        }

        let parameters = substitute_parameters(&step.parameters, state);

        tracing::debug!(step = step.step, tool = %step.tool, "executing step");

        // Biased: a result that is already complete wins over a simultaneous
        // cancel; a cancel landing while the call is in flight interrupts it
        // and its eventual result is never recorded.
        let result = tokio::select! {
            biased;
            result = registry.execute(&step.tool, &parameters) => result,
            _ = cancel.cancelled() => {
                tracing::info!(step = step.step, "cancelled during tool call");
                return false;
            }
        };

        match result {
            Ok(output) => {
                state.step_results.insert(
                    step.step,
                    StepRecord {
                        tool: step.tool.clone(),
                        output_key: step.output_key.clone(),
                        outcome: StepOutcome::Ok(output),
                    },
                );
                state.current_step = step.step;
                if !progress.finish_step() {
                    return false;
                }
            }
            Err(failure) => {
                tracing::error!(step = step.step, tool = %step.tool, error = %failure,
                    "step failed, skipping remaining steps");
                state.step_results.insert(
                    step.step,
                    StepRecord {
                        tool: step.tool.clone(),
                        output_key: step.output_key.clone(),
                        outcome: StepOutcome::Err(failure),
                    },
                );
                break;
            }
        }
    }

    true
}

/// Resolve `{key}` context references in a step's parameters.
///
/// Substitution is intentionally shallow: only string values that are a
/// whole-string `{key}` match are resolved, against earlier steps' output
/// keys and the well-known state fields. Everything else passes through
/// byte-for-byte.
pub fn substitute_parameters(
    parameters: &serde_json::Map<String, serde_json::Value>,
    state: &WorkflowState,
) -> ToolParams {
    let mut prepared = ToolParams::new();

    for (key, value) in parameters {
        let resolved = match value.as_str().and_then(context_key) {
            Some(reference) => match resolve_reference(reference, state) {
                Some(content) => serde_json::Value::String(content),
                None => value.clone(),
            },
            None => value.clone(),
        };
        prepared.insert(key.clone(), resolved);
    }

    prepared
}

/// `{key}` -> `key`, for whole-string matches only. Nested or embedded
/// braces disqualify the value; templating is single-level by contract.
fn context_key(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains('{') || inner.contains('}') {
        return None;
    }
    Some(inner)
}

fn resolve_reference(reference: &str, state: &WorkflowState) -> Option<String> {
    if reference == "document_content" {
        return Some(state.document_content.clone());
    }
    if reference == "conversation_history" {
        return Some(state.rendered_history());
    }

    state
        .step_results
        .values()
        .find(|record| record.output_key == reference)
        .map(|record| record.context_content())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::Step;
    use crate::jobs::store::{JobStore, JobStoreConfig};
    use crate::jobs::{JobRequest, JobStatus};
    use crate::tools::{Tool, ToolFailure, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every invocation; echoes back its parameters.
    struct RecordingTool {
        name: &'static str,
        calls: Mutex<Vec<ToolParams>>,
    }

    impl RecordingTool {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ToolParams> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records calls"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(&self, parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
            self.calls.lock().unwrap().push(parameters.clone());
            Ok(ToolOutput::new(format!("{} output", self.name)))
        }
    }

    /// Fails every invocation.
    struct FailingTool {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing_tool"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _parameters: &ToolParams) -> Result<ToolOutput, ToolFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolFailure::retriable("upstream is down"))
        }
    }

    fn step(n: u32, tool: &str, parameters: serde_json::Value, output_key: &str) -> Step {
        Step {
            step: n,
            tool: tool.to_string(),
            parameters: parameters.as_object().unwrap().clone(),
            depends_on: if n > 1 { Some(n - 1) } else { None },
            output_key: output_key.to_string(),
            description: None,
        }
    }

    fn harness() -> (
        Arc<JobStore>,
        String,
        ProgressTracker,
        CancellationToken,
        tokio::sync::mpsc::Receiver<crate::jobs::QueuedJob>,
    ) {
        let (store, rx) = JobStore::new(JobStoreConfig::default());
        let store = Arc::new(store);
        let job_id = store
            .submit(
                "general_chat",
                JobRequest {
                    message: "test".to_string(),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        store.update_progress(&job_id, 0, Some(JobStatus::Processing));
        let token = store.cancel_token(&job_id).unwrap();
        let tracker = ProgressTracker::new(store.clone(), job_id.clone(), Duration::ZERO);
        (store, job_id, tracker, token, rx)
    }

    // =========================================================================
    // Step execution
    // =========================================================================

    #[tokio::test]
    async fn executes_steps_in_order_with_context_flow() {
        let search = RecordingTool::new("search_tool");
        let draft = RecordingTool::new("draft_tool");
        let mut registry = ToolRegistry::new();
        registry.register(search.clone());
        registry.register(draft.clone());

        let mut state = WorkflowState {
            workflow_plan: vec![
                step(1, "search_tool", json!({"query": "widgets"}), "r1"),
                step(
                    2,
                    "draft_tool",
                    json!({"user_query": "draft", "context": "{r1}"}),
                    "r2",
                ),
            ],
            ..Default::default()
        };

        let (_store, _job_id, mut tracker, token, _rx) = harness();
        let finished = execute_plan(&registry, &mut state, &mut tracker, &token).await;

        assert!(finished);
        assert_eq!(state.step_results.len(), 2);
        assert_eq!(state.current_step, 2);
        assert!(state.step_results[&1].is_ok());
        assert!(state.step_results[&2].is_ok());

        // Step 2 saw step 1's output in place of the {r1} token.
        let draft_calls = draft.calls();
        assert_eq!(draft_calls.len(), 1);
        assert_eq!(draft_calls[0]["context"], "search_tool output");
        assert_eq!(draft_calls[0]["user_query"], "draft");
    }

    #[tokio::test]
    async fn step_failure_stops_execution() {
        let search = RecordingTool::new("search_tool");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool {
            calls: AtomicU32::new(0),
        }));
        registry.register(search.clone());

        let mut state = WorkflowState {
            workflow_plan: vec![
                step(1, "failing_tool", json!({}), "r1"),
                step(2, "search_tool", json!({"query": "x"}), "r2"),
            ],
            ..Default::default()
        };

        let (_store, _job_id, mut tracker, token, _rx) = harness();
        let finished = execute_plan(&registry, &mut state, &mut tracker, &token).await;

        // A step failure is a conclusion, not a cancellation.
        assert!(finished);
        assert_eq!(state.step_results.len(), 1);
        assert!(!state.step_results[&1].is_ok());
        assert!(search.calls().is_empty());
        // current_step only advances on success.
        assert_eq!(state.current_step, 0);
    }

    #[tokio::test]
    async fn cancellation_before_first_step_runs_nothing() {
        let search = RecordingTool::new("search_tool");
        let mut registry = ToolRegistry::new();
        registry.register(search.clone());

        let mut state = WorkflowState {
            workflow_plan: vec![step(1, "search_tool", json!({"query": "x"}), "r1")],
            ..Default::default()
        };

        let (store, job_id, mut tracker, token, _rx) = harness();
        store.cancel(&job_id);

        let finished = execute_plan(&registry, &mut state, &mut tracker, &token).await;

        assert!(!finished);
        assert!(state.step_results.is_empty());
        assert!(search.calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_between_steps_keeps_exactly_completed_results() {
        // A tool that cancels the job as a side effect of running, simulating
        // a cancel API call landing mid-workflow.
        struct CancellingTool {
            store: Arc<JobStore>,
            job_id: String,
        }

        #[async_trait]
        impl Tool for CancellingTool {
            fn name(&self) -> &str {
                "cancelling_tool"
            }
            fn description(&self) -> &str {
                "cancels its own job"
            }
            fn input_schema(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn execute(&self, _: &ToolParams) -> Result<ToolOutput, ToolFailure> {
                self.store.cancel(&self.job_id);
                Ok(ToolOutput::new("done before cancel landed"))
            }
        }

        let (store, job_id, mut tracker, token, _rx) = harness();

        let never_called = RecordingTool::new("search_tool");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CancellingTool {
            store: store.clone(),
            job_id: job_id.clone(),
        }));
        registry.register(never_called.clone());

        let mut state = WorkflowState {
            workflow_plan: vec![
                step(1, "cancelling_tool", json!({}), "r1"),
                step(2, "search_tool", json!({"query": "x"}), "r2"),
            ],
            ..Default::default()
        };

        let finished = execute_plan(&registry, &mut state, &mut tracker, &token).await;

        assert!(!finished);
        // Exactly the steps completed before the cancel have results.
        assert_eq!(state.step_results.len(), 1);
        assert!(never_called.calls().is_empty());
    }

    // =========================================================================
    // Context substitution
    // =========================================================================

    mod substitution_tests {
        use super::*;
        use crate::agent::state::{StepOutcome, StepRecord};

        fn state_with_result(output_key: &str, content: &str) -> WorkflowState {
            let mut state = WorkflowState {
                document_content: "the document".to_string(),
                ..Default::default()
            };
            state.step_results.insert(
                1,
                StepRecord {
                    tool: "search_tool".to_string(),
                    output_key: output_key.to_string(),
                    outcome: StepOutcome::Ok(ToolOutput::new(content)),
                },
            );
            state
        }

        #[test]
        fn resolves_output_key_reference() {
            let state = state_with_result("r1", "search results");
            let params = json!({"context": "{r1}"}).as_object().unwrap().clone();

            let prepared = substitute_parameters(&params, &state);
            assert_eq!(prepared["context"], "search results");
        }

        #[test]
        fn resolves_well_known_state_fields() {
            let mut state = state_with_result("r1", "x");
            state.conversation_history = vec![crate::jobs::ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }];

            let params = json!({
                "doc": "{document_content}",
                "history": "{conversation_history}"
            })
            .as_object()
            .unwrap()
            .clone();

            let prepared = substitute_parameters(&params, &state);
            assert_eq!(prepared["doc"], "the document");
            assert_eq!(prepared["history"], "user: hi");
        }

        #[test]
        fn failed_step_reference_substitutes_stringified_error() {
            let mut state = WorkflowState::default();
            state.step_results.insert(
                1,
                StepRecord {
                    tool: "search_tool".to_string(),
                    output_key: "r1".to_string(),
                    outcome: StepOutcome::Err(ToolFailure::new("no results")),
                },
            );

            let params = json!({"context": "{r1}"}).as_object().unwrap().clone();
            let prepared = substitute_parameters(&params, &state);
            assert_eq!(prepared["context"], "Tool search_tool failed: no results");
        }

        #[test]
        fn unknown_reference_passes_through_unchanged() {
            let state = state_with_result("r1", "x");
            let params = json!({"context": "{r99}"}).as_object().unwrap().clone();

            let prepared = substitute_parameters(&params, &state);
            assert_eq!(prepared["context"], "{r99}");
        }

        #[test]
        fn non_reference_values_pass_through() {
            let state = state_with_result("r1", "x");
            let params = json!({
                "literal": "plain text with {r1} inside",
                "number": 42,
                "flag": true,
                "nested": {"a": "{r1}"},
                "json_like": "{\"a\": 1}"
            })
            .as_object()
            .unwrap()
            .clone();

            let prepared = substitute_parameters(&params, &state);
            // Embedded references are not templated; only whole-string matches.
            assert_eq!(prepared["literal"], "plain text with {r1} inside");
            assert_eq!(prepared["number"], 42);
            assert_eq!(prepared["flag"], true);
            // Nested structures are not walked.
            assert_eq!(prepared["nested"], json!({"a": "{r1}"}));
            // Brace-wrapped strings with inner braces are not references.
            assert_eq!(prepared["json_like"], "{\"a\": 1}");
        }

        #[test]
        fn context_key_shapes() {
            assert_eq!(context_key("{r1}"), Some("r1"));
            assert_eq!(context_key("{document_content}"), Some("document_content"));
            assert_eq!(context_key("{}"), None);
            assert_eq!(context_key("r1"), None);
            assert_eq!(context_key("{r1} extra"), None);
            assert_eq!(context_key("{{r1}}"), None);
        }

        proptest::proptest! {
            /// Non-reference strings survive substitution byte-for-byte.
            #[test]
            fn non_brace_strings_are_preserved(value in "[^{}]*") {
                let state = state_with_result("r1", "replacement");
                let mut params = ToolParams::new();
                params.insert("p".to_string(), serde_json::Value::String(value.clone()));

                let prepared = substitute_parameters(&params, &state);
                proptest::prop_assert_eq!(prepared["p"].as_str().unwrap(), value.as_str());
            }
        }
    }
}
