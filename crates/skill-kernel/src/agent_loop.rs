//! Agent Loop (§4.K): executes a routed Mission Brief via a bounded
//! ReAct-style `Observe -> Orient -> Act` loop.
//!
//! Grounded on `router.rs`'s collaborator-composition shape (same
//! dependency set: Sniffer, KnowledgeStore, Inference, Dispatch) and on
//! the spec's step-budget/cancellation requirements, generalized from the
//! teacher's single-shot skill execution into an explicit multi-step state
//! machine — the teacher had no agent loop of its own to ground this on
//! directly, since its WASM skills were one-shot function calls.

use crate::dispatch::Dispatch;
use crate::errors::{KernelError, Result};
use crate::inference::{Inference, Message, ToolDescriptor};
use crate::knowledge::{KnowledgeStore, HARVESTED_INSIGHT_DOMAIN};
use crate::sniffer::ContextSniffer;
use crate::types::{DispatchOutcome, RoutingResult, Skill};
use std::sync::Arc;
use std::time::Duration;

/// Default step budget (§4.K: "the loop as a whole has a step budget
/// (default 5)").
pub const DEFAULT_STEP_BUDGET: usize = 5;

const STATIC_PERSONA: &str = "You are an executing agent. Use the available tools to carry out \
the mission brief, then respond with a terminal answer when the task is complete.";

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_id: String,
    pub args: serde_json::Value,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub final_text: Option<String>,
    pub reason: Option<String>,
    pub steps_taken: usize,
    pub trace: Vec<ToolInvocation>,
}

impl AgentResult {
    fn budget_exceeded(steps_taken: usize, trace: Vec<ToolInvocation>) -> Self {
        Self {
            success: false,
            final_text: None,
            reason: Some("step_budget".to_string()),
            steps_taken,
            trace,
        }
    }
}

/// Optional reviewer collaborator (§4.K): approves or rejects the final
/// artifact after the loop terminates successfully.
#[async_trait::async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, original_query: &str, artifact: &str) -> anyhow::Result<bool>;
}

pub struct AgentLoop {
    sniffer: Arc<ContextSniffer>,
    knowledge: Arc<dyn KnowledgeStore>,
    inference: Arc<dyn Inference>,
    dispatch: Arc<Dispatch>,
    reviewer: Option<Arc<dyn Reviewer>>,
    feedback: Arc<crate::feedback::FeedbackStore>,
    step_budget: usize,
    step_timeout: Duration,
}

impl AgentLoop {
    pub fn new(
        sniffer: Arc<ContextSniffer>,
        knowledge: Arc<dyn KnowledgeStore>,
        inference: Arc<dyn Inference>,
        dispatch: Arc<Dispatch>,
        feedback: Arc<crate::feedback::FeedbackStore>,
    ) -> Self {
        Self {
            sniffer,
            knowledge,
            inference,
            dispatch,
            reviewer: None,
            feedback,
            step_budget: DEFAULT_STEP_BUDGET,
            step_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_step_budget(mut self, budget: usize) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Run the loop for a single routed request, dispatching against the
    /// routed skill's commands (and, at the caller's discretion, any other
    /// loaded skill's commands passed in `extra_tools`).
    pub async fn run(
        &self,
        original_query: &str,
        routing: &RoutingResult,
        skill: &Skill,
        extra_tools: &[Skill],
    ) -> Result<AgentResult> {
        let tools = self.tool_descriptors(skill, extra_tools);
        let mut trace = Vec::new();
        let mut history = vec![Message::system(STATIC_PERSONA)];

        for step in 0..self.step_budget {
            // Observe.
            let snapshot = tokio::time::timeout(self.step_timeout, self.sniffer.get_snapshot())
                .await
                .map_err(|_| KernelError::Timeout(self.step_timeout))??;

            // Orient: static persona ⊕ snapshot ⊕ retrieved knowledge ⊕
            // skill lessons ⊕ the mission brief.
            let lessons = self
                .knowledge
                .lookup(original_query, HARVESTED_INSIGHT_DOMAIN, 3)
                .await
                .unwrap_or_default();
            let orientation = build_orientation(&snapshot, &lessons, &routing.task_brief, step);
            history.push(Message::user(orientation));

            // Act.
            let response = tokio::time::timeout(
                self.step_timeout,
                self.inference.complete(&history, &tools, None),
            )
            .await
            .map_err(|_| KernelError::Timeout(self.step_timeout))??;

            if response.tool_calls.is_empty() {
                let success = true;
                self.record_final_feedback(original_query, &routing.target_skill, &response.text, success).await;
                return Ok(AgentResult {
                    success,
                    final_text: Some(response.text),
                    reason: None,
                    steps_taken: step + 1,
                    trace,
                });
            }

            for call in response.tool_calls {
                let (skill_name, command_name) = split_tool_id(&call.tool_id);
                let outcome = self
                    .dispatch
                    .execute(original_query, &skill_name, &command_name, call.arguments.clone(), self.step_timeout)
                    .await;
                history.push(Message::assistant(format!(
                    "called {} with {} -> {}",
                    call.tool_id,
                    call.arguments,
                    describe_outcome(&outcome)
                )));
                trace.push(ToolInvocation { tool_id: call.tool_id, args: call.arguments, outcome });
            }
        }

        Ok(AgentResult::budget_exceeded(self.step_budget, trace))
    }

    fn tool_descriptors(&self, skill: &Skill, extra_tools: &[Skill]) -> Vec<ToolDescriptor> {
        std::iter::once(skill)
            .chain(extra_tools.iter())
            .flat_map(|s| {
                s.commands.iter().map(move |c| ToolDescriptor {
                    id: format!("{}.{}", s.name, c.name),
                    description: c.description.clone(),
                    parameters_schema: parameters_schema(c),
                })
            })
            .collect()
    }

    async fn record_final_feedback(&self, query: &str, skill: &str, artifact: &str, loop_success: bool) {
        if let Some(reviewer) = &self.reviewer {
            match reviewer.review(query, artifact).await {
                Ok(true) => {
                    let _ = self.feedback.record(query, skill, true).await;
                }
                Ok(false) => {}
                Err(_) => {}
            }
        } else if loop_success {
            let _ = self.feedback.record(query, skill, true).await;
        }
    }
}

fn parameters_schema(command: &crate::types::Command) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = command
        .parameters
        .iter()
        .map(|p| (p.name.clone(), serde_json::json!({"type": p.param_type})))
        .collect();
    let required: Vec<&str> = command
        .parameters
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    serde_json::json!({"type": "object", "properties": properties, "required": required})
}

fn split_tool_id(id: &str) -> (String, String) {
    match id.split_once('.') {
        Some((skill, command)) => (skill.to_string(), command.to_string()),
        None => (id.to_string(), String::new()),
    }
}

fn describe_outcome(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Ok { payload } => format!("ok: {payload}"),
        DispatchOutcome::Error { kind, message } => format!("error[{kind}]: {message}"),
    }
}

fn build_orientation(
    snapshot: &crate::types::EnvironmentSnapshot,
    lessons: &[crate::knowledge::KnowledgeEntry],
    task_brief: &str,
    step: usize,
) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = writeln!(out, "Step {step}");
    let _ = writeln!(out, "Environment: {}", snapshot.to_prompt_string());
    if !lessons.is_empty() {
        let _ = writeln!(out, "Lessons:");
        for lesson in lessons {
            let _ = writeln!(out, "- {}: {}", lesson.title, lesson.content);
        }
    }
    let _ = writeln!(out, "Mission brief: {task_brief}");
    out
}
