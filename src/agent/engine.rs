//! The workflow engine.
//!
//! Routes a user message through intent detection, plan synthesis, sequential
//! step execution, and response assembly. Implements [`WorkflowRunner`] so
//! the job worker can drive it (and tests can substitute a scripted runner).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::jobs::{
    Job, JobOutcome, PlanEntry, ProgressTracker, WorkflowRunner, WorkflowSummary,
};
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

use super::assembler::assemble_response;
use super::executor::execute_plan;
use super::intent::IntentClassifier;
use super::planner::WorkflowPlanner;
use super::state::{IntentType, WorkflowState};

pub struct WorkflowEngine {
    tools: Arc<ToolRegistry>,
    classifier: IntentClassifier,
    planner: WorkflowPlanner,
}

impl WorkflowEngine {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            classifier: IntentClassifier::new(llm.clone()),
            planner: WorkflowPlanner::new(llm),
        }
    }
}

#[async_trait]
impl WorkflowRunner for WorkflowEngine {
    async fn run(
        &self,
        job: &Job,
        mut progress: ProgressTracker,
        cancel: CancellationToken,
    ) -> anyhow::Result<Option<JobOutcome>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut state = WorkflowState::new(&job.request, self.tools.descriptors());

        let hint = self
            .classifier
            .classify(&state.user_input, &state.available_tools)
            .await;
        state.intent_type = Some(hint.intent);

        tracing::info!(
            job_id = %job.id,
            intent = hint.intent.as_str(),
            "intent detected"
        );

        state.workflow_plan = self
            .planner
            .plan(&state.user_input, &state.available_tools, &hint)
            .await;

        if !state.workflow_plan.is_empty() {
            let finished =
                execute_plan(&self.tools, &mut state, &mut progress, &cancel).await;
            if !finished {
                return Ok(None);
            }
        }

        state.final_response = assemble_response(&state);

        let plan = state
            .workflow_plan
            .iter()
            .map(|step| PlanEntry {
                step: step.step,
                tool: step.tool.clone(),
            })
            .collect();

        let completed_steps = state.completed_steps();
        let any_failed = state.step_results.values().any(|r| !r.is_ok());

        Ok(Some(JobOutcome {
            response: state.final_response.clone(),
            intent_type: state
                .intent_type
                .unwrap_or(IntentType::Conversation)
                .as_str()
                .to_string(),
            success: !any_failed,
            error: None,
            workflow: WorkflowSummary {
                workflow_type: state
                    .intent_type
                    .unwrap_or(IntentType::Conversation)
                    .as_str()
                    .to_string(),
                total_steps: state.workflow_plan.len(),
                completed_steps,
                plan,
            },
        }))
    }
}
