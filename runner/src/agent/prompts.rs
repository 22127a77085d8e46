//! Default system and planning prompts.

use anyhow::Result;
use minijinja::{Environment, context};

const TOOL_CALLING_TEMPLATE: &str = include_str!("prompts/tool_calling.md");
const CODE_AGENT_TEMPLATE: &str = include_str!("prompts/code_agent.md");
const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");

/// Modules the default code prompt allows.
pub const DEFAULT_AUTHORIZED_IMPORTS: &[&str] = &["math", "json", "datetime", "re", "collections"];

/// Template engine wrapper around minijinja.
pub(crate) struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub(crate) fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("tool_calling", TOOL_CALLING_TEMPLATE)
            .expect("tool_calling template should be valid");
        env.add_template("code_agent", CODE_AGENT_TEMPLATE)
            .expect("code_agent template should be valid");
        env.add_template("planning", PLANNING_TEMPLATE)
            .expect("planning template should be valid");
        Self { env }
    }

    /// `tools` is the Python-style signature listing of every callable tool.
    pub(crate) fn render_tool_calling(&self, tools: &str) -> Result<String> {
        let template = self.env.get_template("tool_calling")?;
        Ok(template.render(context! { tools => tools })?)
    }

    pub(crate) fn render_code_agent(&self, tools: &str, authorized_imports: &[String]) -> Result<String> {
        let template = self.env.get_template("code_agent")?;
        Ok(template.render(context! {
            tools => tools,
            authorized_imports => authorized_imports,
        })?)
    }

    pub(crate) fn render_planning(&self, task: &str, previous: Option<&str>) -> Result<String> {
        let template = self.env.get_template("planning")?;
        Ok(template.render(context! {
            task => task.trim(),
            previous => previous.map(str::trim).filter(|s| !s.is_empty()),
        })?)
    }
}
