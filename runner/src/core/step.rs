//! Step records and their rendering into model messages.
//!
//! Rendering is pure: the same step always renders to the same messages, so a
//! history renders identically no matter how often it is asked.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{Message, Timing, TokenUsage, ToolCall};
use crate::error::StepError;

/// Fixed follow-up sent after a plan so the model starts acting on it.
pub const PLAN_FOLLOW_UP: &str = "Now proceed and carry out this plan.";

/// Discriminant of a [`Step`], used to route callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Action,
    Planning,
    FinalAnswer,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Task => "task",
            StepType::Action => "action",
            StepType::Planning => "planning",
            StepType::FinalAnswer => "final_answer",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record in the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Task(TaskStep),
    Action(ActionStep),
    Planning(PlanningStep),
    FinalAnswer(FinalAnswerStep),
}

impl Step {
    pub fn step_type(&self) -> StepType {
        match self {
            Step::Task(_) => StepType::Task,
            Step::Action(_) => StepType::Action,
            Step::Planning(_) => StepType::Planning,
            Step::FinalAnswer(_) => StepType::FinalAnswer,
        }
    }

    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            Step::Task(step) => step.to_messages(),
            Step::Action(step) => step.to_messages(),
            Step::Planning(step) => step.to_messages(),
            Step::FinalAnswer(_) => Vec::new(),
        }
    }

    /// Token usage attributed to this step, if it called the model.
    pub fn token_usage(&self) -> Option<TokenUsage> {
        match self {
            Step::Action(step) => step.token_usage,
            Step::Planning(step) => step.token_usage,
            Step::Task(_) | Step::FinalAnswer(_) => None,
        }
    }
}

/// The task handed to the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub task: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Vec<u8>>,
}

impl TaskStep {
    fn to_messages(&self) -> Vec<Message> {
        vec![Message::user(format!("Task:\n{}", self.task)).with_images(self.images.clone())]
    }
}

/// One model turn and the effect of acting on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub step_number: u32,
    pub timing: Timing,
    pub model_output: Option<String>,
    pub code_action: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub observations: Option<String>,
    pub error: Option<StepError>,
    pub token_usage: Option<TokenUsage>,
    pub is_final: bool,
}

impl ActionStep {
    /// Start an empty step at the current instant.
    pub fn begin(step_number: u32) -> Self {
        Self {
            step_number,
            timing: Timing::open(SystemTime::now()),
            model_output: None,
            code_action: None,
            tool_calls: Vec::new(),
            observations: None,
            error: None,
            token_usage: None,
            is_final: false,
        }
    }

    /// Close the step's timing span.
    pub fn finish(&mut self) {
        self.timing = Timing::since(self.timing.start);
    }

    fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(text) = self.model_output.as_deref().filter(|t| !t.is_empty()) {
            messages.push(Message::assistant(text));
        }
        if !self.tool_calls.is_empty() {
            messages.push(Message::assistant(format_tool_calls(&self.tool_calls)));
        }
        if let Some(observations) = self.observations.as_deref().filter(|o| !o.is_empty()) {
            messages.push(Message::user(format!("Observation:\n{observations}")));
        }
        if let Some(err) = &self.error {
            messages.push(Message::user(format!(
                "Error:\n{err}\nPlease try again or use another approach."
            )));
        }
        messages
    }
}

/// Tool calls rendered as text for the history transcript.
pub fn format_tool_calls(tool_calls: &[ToolCall]) -> String {
    let calls = Value::Array(
        tool_calls
            .iter()
            .map(ToolCall::to_transcript_value)
            .collect(),
    );
    format!("Calling tools:\n{calls}")
}

/// A plan produced ahead of acting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningStep {
    pub plan: String,
    pub timing: Timing,
    pub token_usage: Option<TokenUsage>,
}

impl PlanningStep {
    fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::assistant(self.plan.clone()),
            Message::user(PLAN_FOLLOW_UP),
        ]
    }
}

/// Terminal marker carrying the run output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswerStep {
    pub output: Value,
}
