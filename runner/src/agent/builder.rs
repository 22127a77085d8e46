//! Construction of [`AgentRunner`]s.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use crate::agent::Agent;
use crate::agent::callbacks::{CallbackRegistry, CallbackScope};
use crate::agent::prompts::{DEFAULT_AUTHORIZED_IMPORTS, PromptEngine};
use crate::agent::runner::{ActionMode, AgentRunner, RunnerState};
use crate::core::memory::Memory;
use crate::core::step::Step;
use crate::io::config::EngineConfig;
use crate::io::executor::{CodeExecutor, ExecutionState};
use crate::model::Model;
use crate::tools::{Tool, ToolRegistry, Toolbox};

pub const DEFAULT_MAX_STEPS: u32 = 20;

/// Builder shared by both agent variants.
///
/// The registry always contains `final_answer`. Without an explicit system
/// prompt, one is rendered from the tools and managed agents at build time.
pub struct AgentBuilder {
    model: Arc<dyn Model>,
    name: String,
    description: String,
    tools: ToolRegistry,
    managed_agents: Vec<Arc<dyn Agent>>,
    max_steps: u32,
    planning_interval: Option<u32>,
    system_prompt: Option<String>,
    authorized_imports: Vec<String>,
    callbacks: CallbackRegistry,
}

impl AgentBuilder {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            name: "agent".to_string(),
            description: "A helpful agent".to_string(),
            tools: ToolRegistry::with_final_answer(),
            managed_agents: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            planning_interval: None,
            system_prompt: None,
            authorized_imports: DEFAULT_AUTHORIZED_IMPORTS
                .iter()
                .map(|module| module.to_string())
                .collect(),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a tool; a later tool with the same name replaces it.
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register_arc(tool);
        self
    }

    /// Expose another agent as a tool taking a single `task` argument.
    pub fn managed_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.managed_agents.push(agent);
        self
    }

    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn planning_interval(mut self, interval: u32) -> Self {
        self.planning_interval = Some(interval);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Modules listed as importable in the default code prompt.
    pub fn authorized_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_imports = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_step<F>(mut self, scope: impl Into<CallbackScope>, handler: F) -> Self
    where
        F: Fn(&Step) + Send + Sync + 'static,
    {
        self.callbacks.register(scope, handler);
        self
    }

    /// Apply the step budget and planning interval from `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.max_steps = config.max_steps;
        self.planning_interval = config.planning_interval;
        self
    }

    /// Agent that acts through structured tool calls.
    pub fn build_tool_calling(self) -> Result<AgentRunner> {
        self.build(ActionMode::ToolCalling)
    }

    /// Agent that acts by writing code run through `executor`.
    pub fn build_code(self, executor: Box<dyn CodeExecutor>) -> Result<AgentRunner> {
        self.build(ActionMode::Code(executor))
    }

    fn build(self, mode: ActionMode) -> Result<AgentRunner> {
        if self.max_steps == 0 {
            bail!("max_steps must be > 0");
        }
        if self.planning_interval == Some(0) {
            bail!("planning_interval must be > 0 when set");
        }
        if self.name.trim().is_empty() {
            bail!("agent name must not be empty");
        }

        let mut toolbox = Toolbox::new(self.tools);
        for agent in self.managed_agents {
            toolbox.add_managed_agent(agent);
        }

        let prompts = PromptEngine::new();
        let system_prompt = match (self.system_prompt, &mode) {
            (Some(prompt), _) => prompt,
            (None, ActionMode::ToolCalling) => {
                prompts.render_tool_calling(&toolbox.to_code_prompt())?
            }
            (None, ActionMode::Code(_)) => {
                prompts.render_code_agent(&toolbox.to_code_prompt(), &self.authorized_imports)?
            }
        };

        Ok(AgentRunner {
            name: self.name,
            description: self.description,
            model: self.model,
            toolbox,
            mode,
            max_steps: self.max_steps,
            planning_interval: self.planning_interval,
            callbacks: self.callbacks,
            prompts,
            state: Mutex::new(RunnerState {
                memory: Memory::new(system_prompt),
                exec_state: ExecutionState::new(),
            }),
            active: Mutex::new(None),
        })
    }
}
