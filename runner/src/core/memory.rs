//! Append-only run history.

use std::fmt::Write as _;

use crate::core::step::{ActionStep, Step};
use crate::core::types::{Message, TokenUsage};

const PREVIEW_CHARS: usize = 50;

/// System prompt plus the ordered steps of the current conversation.
///
/// Owned by exactly one runner; mutation is limited to [`Memory::append`] and
/// [`Memory::reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    system_prompt: String,
    steps: Vec<Step>,
}

impl Memory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            steps: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn append(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Drop every step; the system prompt survives.
    pub fn reset(&mut self) {
        self.steps.clear();
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn action_steps(&self) -> impl Iterator<Item = &ActionStep> {
        self.steps.iter().filter_map(|step| match step {
            Step::Action(action) => Some(action),
            _ => None,
        })
    }

    /// Render the model input: system message, then each step in order.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt.clone())];
        messages.extend(self.steps.iter().flat_map(Step::to_messages));
        messages
    }

    /// Sum of Action and Planning token usage.
    pub fn total_tokens(&self) -> TokenUsage {
        self.steps
            .iter()
            .filter_map(Step::token_usage)
            .fold(TokenUsage::default(), |acc, usage| acc + usage)
    }

    /// Human-readable digest of the history, one line per step.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Memory: {} steps", self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let line = match step {
                Step::Task(task) => format!("Task: {}", preview(&task.task)),
                Step::Action(action) => {
                    format!("Action #{}: {}", action.step_number, action_status(action))
                }
                Step::Planning(plan) => format!("Planning: {}", preview(&plan.plan)),
                Step::FinalAnswer(_) => "Final Answer".to_string(),
            };
            let _ = writeln!(out, "  [{index}] {line}");
        }
        let tokens = self.total_tokens();
        let _ = writeln!(
            out,
            "Total tokens: {} (in: {}, out: {})",
            tokens.total(),
            tokens.input_tokens,
            tokens.output_tokens
        );
        out
    }
}

fn action_status(action: &ActionStep) -> &'static str {
    if action.is_final {
        "final"
    } else if action.error.is_some() {
        "error"
    } else if action.observations.as_deref().is_some_and(|o| !o.is_empty()) {
        "done"
    } else {
        "pending"
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
