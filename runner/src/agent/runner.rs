//! The step loop shared by the tool-calling and code variants.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use anyhow::{Result, bail};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::agent::callbacks::{CallbackRegistry, CallbackScope};
use crate::agent::prompts::PromptEngine;
use crate::agent::{Agent, RunOptions, RunResult, RunState};
use crate::core::memory::Memory;
use crate::core::parse::{extract_code_block, invokes_final_answer};
use crate::core::protocol::FINAL_ANSWER;
use crate::core::step::{ActionStep, FinalAnswerStep, PlanningStep, Step, TaskStep};
use crate::core::types::{Message, Timing};
use crate::error::{RunCancelled, StepError};
use crate::io::executor::{CodeExecutor, ExecutionState};
use crate::model::{GenerateOptions, Model};
use crate::tools::Toolbox;

/// Where the code variant asks the model to stop generating.
pub const CODE_STOP_SEQUENCES: [&str; 2] = ["Observation:", "</code>"];

/// How one step's model output is acted on.
pub(crate) enum ActionMode {
    ToolCalling,
    Code(Box<dyn CodeExecutor>),
}

/// State owned by one runner and touched only under its lock.
pub(crate) struct RunnerState {
    pub(crate) memory: Memory,
    pub(crate) exec_state: ExecutionState,
}

/// An agent driven by a [`Model`], acting through tools or code.
///
/// Build one with [`AgentBuilder`](crate::agent::AgentBuilder). At most one run
/// is in flight per instance; concurrent callers block until it finishes.
pub struct AgentRunner {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) model: Arc<dyn Model>,
    pub(crate) toolbox: Toolbox,
    pub(crate) mode: ActionMode,
    pub(crate) max_steps: u32,
    pub(crate) planning_interval: Option<u32>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) prompts: PromptEngine,
    pub(crate) state: Mutex<RunnerState>,
    pub(crate) active: Mutex<Option<ThreadId>>,
}

/// Marks the runner busy on the current thread for the life of the guard.
struct ActiveRun<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> ActiveRun<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
        *relock(slot) = Some(thread);
        Self { slot }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *relock(self.slot) = None;
    }
}

// A panicking callback poisons the lock; the state is still consistent
// step-wise, so keep using it.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AgentRunner {
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn is_code_agent(&self) -> bool {
        matches!(self.mode, ActionMode::Code(_))
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    pub fn system_prompt(&self) -> String {
        relock(&self.state).memory.system_prompt().to_string()
    }

    /// Snapshot of the history. Blocks while a run is in flight.
    pub fn memory(&self) -> Memory {
        relock(&self.state).memory.clone()
    }

    /// Snapshot of the code variant's execution state.
    pub fn execution_state(&self) -> ExecutionState {
        relock(&self.state).exec_state.clone()
    }

    /// Register a handler, invoked after each Action step is appended.
    ///
    /// Only Action steps are dispatched, so a handler scoped to another step
    /// type never fires.
    pub fn on_step<F>(&mut self, scope: impl Into<CallbackScope>, handler: F)
    where
        F: Fn(&Step) + Send + Sync + 'static,
    {
        self.callbacks.register(scope, handler);
    }

    /// Register a handler by tag (`"task"`, `"action"`, `"planning"`,
    /// `"final_answer"` or `"all"`).
    pub fn on_step_tag<F>(&mut self, tag: &str, handler: F) -> Result<()>
    where
        F: Fn(&Step) + Send + Sync + 'static,
    {
        let scope: CallbackScope = tag.parse()?;
        self.callbacks.register(scope, handler);
        Ok(())
    }

    #[instrument(skip_all, fields(agent = %self.name, max_steps = tracing::field::Empty))]
    fn run_locked(
        &self,
        state: &mut RunnerState,
        task: &str,
        options: RunOptions,
    ) -> Result<RunResult> {
        let max_steps = options.max_steps.unwrap_or(self.max_steps);
        tracing::Span::current().record("max_steps", max_steps);
        let started = SystemTime::now();

        if options.reset {
            state.memory.reset();
            state.exec_state.clear();
        }
        state.exec_state.extend(options.extra_args.clone());

        let task_text = describe_task(task, &options.extra_args, self.is_code_agent());
        state.memory.append(Step::Task(TaskStep {
            task: task_text.clone(),
            images: options.images,
        }));

        let mut output = None;
        for step_number in 1..=max_steps {
            if options.cancel.is_cancelled() {
                warn!(step = step_number, "run cancelled");
                return Err(RunCancelled { step: step_number }.into());
            }
            if self.plans_before(step_number) {
                self.plan(&mut state.memory, &task_text);
            }

            let mut action = ActionStep::begin(step_number);
            let final_output = match &self.mode {
                ActionMode::ToolCalling => self.tool_calling_step(&state.memory, &mut action),
                ActionMode::Code(executor) => self.code_step(
                    &state.memory,
                    &state.exec_state,
                    executor.as_ref(),
                    &mut action,
                ),
            };
            action.finish();
            debug!(
                step = step_number,
                is_final = action.is_final,
                error = action.error.as_ref().map(tracing::field::display),
                "step finished"
            );
            self.record_action(&mut state.memory, action);

            if let Some(value) = final_output {
                state.memory.append(Step::FinalAnswer(FinalAnswerStep {
                    output: value.clone(),
                }));
                output = Some(value);
                break;
            }
        }

        let run_state = if output.is_some() {
            info!(steps = state.memory.len(), "run completed");
            RunState::Success
        } else {
            info!(max_steps, "step budget exhausted");
            RunState::MaxStepsError
        };

        Ok(RunResult {
            output,
            state: run_state,
            steps: state.memory.steps().to_vec(),
            token_usage: state.memory.total_tokens(),
            timing: Timing::since(started),
        })
    }

    /// Append an Action step, then notify callbacks with it.
    fn record_action(&self, memory: &mut Memory, action: ActionStep) {
        memory.append(Step::Action(action));
        if let Some(step) = memory.last_step() {
            self.callbacks.trigger(step);
        }
    }

    fn plans_before(&self, step_number: u32) -> bool {
        match self.planning_interval {
            Some(interval) if interval > 0 => (step_number - 1) % interval == 0,
            _ => false,
        }
    }

    /// Ask the model for a plan. Failures cost nothing but a log line.
    fn plan(&self, memory: &mut Memory, task: &str) {
        let started = SystemTime::now();
        let previous = (memory.len() > 1).then(|| memory.summary());
        let prompt = match self.prompts.render_planning(task, previous.as_deref()) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "planning prompt failed to render");
                return;
            }
        };
        let mut messages = memory.to_messages();
        messages.push(Message::user(prompt));
        match self.model.generate(&messages, &GenerateOptions::default()) {
            Ok(response) => memory.append(Step::Planning(PlanningStep {
                plan: response.content,
                timing: Timing::since(started),
                token_usage: response.token_usage,
            })),
            Err(err) => warn!(error = %format!("{err:#}"), "planning generation failed"),
        }
    }

    /// Call the model; on failure record it on the step and return `None`.
    fn generate(
        &self,
        memory: &Memory,
        options: &GenerateOptions,
        action: &mut ActionStep,
    ) -> Option<Message> {
        match self.model.generate(&memory.to_messages(), options) {
            Ok(response) => {
                action.model_output = Some(response.content.clone()).filter(|text| !text.is_empty());
                action.token_usage = response.token_usage;
                Some(response)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(step = action.step_number, error = %message, "generation failed");
                action.error = Some(StepError::Generation(message));
                None
            }
        }
    }

    /// Returns the run output when the step called `final_answer`.
    fn tool_calling_step(&self, memory: &Memory, action: &mut ActionStep) -> Option<Value> {
        let options = GenerateOptions::default().with_tools(self.toolbox.schemas());
        let response = self.generate(memory, &options, action)?;
        if response.tool_calls.is_empty() {
            return None;
        }

        let mut observations = Vec::with_capacity(response.tool_calls.len());
        let mut final_output = None;
        for call in &response.tool_calls {
            match self.toolbox.dispatch(call) {
                Ok(value) => {
                    observations.push(render_value(&value));
                    if call.name == FINAL_ANSWER {
                        final_output = Some(value);
                    }
                }
                Err(err) => {
                    debug!(tool = %call.name, error = %err, "tool call failed");
                    observations.push(format!("Error executing {}: {err}", call.name));
                }
            }
        }

        action.tool_calls = response.tool_calls;
        action.observations = Some(observations.join("\n"));
        action.is_final = final_output.is_some();
        final_output
    }

    /// Returns the run output when the executed code called `final_answer`
    /// and finished without error.
    fn code_step(
        &self,
        memory: &Memory,
        exec_state: &ExecutionState,
        executor: &dyn CodeExecutor,
        action: &mut ActionStep,
    ) -> Option<Value> {
        let options = GenerateOptions::default().with_stop_sequences(CODE_STOP_SEQUENCES);
        let response = self.generate(memory, &options, action)?;
        let Some(code) = extract_code_block(&response.content) else {
            action.error = Some(StepError::NoCodeBlock);
            return None;
        };

        let outcome = executor.execute(&code, exec_state);
        action.observations = Some(outcome.logs).filter(|logs| !logs.is_empty());
        let is_final = invokes_final_answer(&code);
        action.code_action = Some(code);

        if let Some(err) = outcome.error {
            action.error = Some(err.into());
            return None;
        }
        if !is_final {
            return None;
        }
        action.is_final = true;
        Some(outcome.output.unwrap_or(Value::Null))
    }
}

impl Agent for AgentRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, task: &str, options: RunOptions) -> Result<RunResult> {
        let current = thread::current().id();
        if *relock(&self.active) == Some(current) {
            bail!("agent {} is already running on this thread", self.name);
        }
        let mut state = relock(&self.state);
        let _active = ActiveRun::enter(&self.active, current);
        self.run_locked(&mut state, task, options)
    }
}

/// Observation text for a tool result.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Task text as recorded in history, with a note about extra arguments.
fn describe_task(task: &str, extra_args: &Map<String, Value>, code_mode: bool) -> String {
    if extra_args.is_empty() {
        return task.to_string();
    }
    if code_mode {
        let keys: Vec<&str> = extra_args.keys().map(String::as_str).collect();
        format!(
            "{task}\n\nYou have been provided with these additional arguments, available as variables in your code: {}.",
            keys.join(", ")
        )
    } else {
        format!(
            "{task}\n\nYou have been provided with these additional arguments:\n{}",
            Value::Object(extra_args.clone())
        )
    }
}
