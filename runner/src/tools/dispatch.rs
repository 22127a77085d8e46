//! Resolution of a tool call to a managed agent or a registered tool.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::agent::Agent;
use crate::core::types::ToolCall;
use crate::error::ToolError;
use crate::tools::schema::{code_signatures, validate_arguments};
use crate::tools::{ManagedAgent, Tool, ToolRegistry, ToolSchema};

/// Everything an agent can invoke: its tool registry plus managed agents.
#[derive(Clone, Default)]
pub struct Toolbox {
    registry: ToolRegistry,
    managed: BTreeMap<String, ManagedAgent>,
}

impl Toolbox {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            managed: BTreeMap::new(),
        }
    }

    pub fn add_managed_agent(&mut self, agent: Arc<dyn Agent>) {
        self.managed
            .insert(agent.name().to_string(), ManagedAgent::new(agent));
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Registered tools followed by managed agents.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self.registry.schemas();
        schemas.extend(self.managed.values().map(Tool::schema));
        schemas
    }

    pub fn to_code_prompt(&self) -> String {
        code_signatures(&self.schemas())
    }

    /// Execute one call. Managed agents shadow registered tools of the same name.
    #[instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    pub fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool: &dyn Tool = match self.managed.get(&call.name) {
            Some(agent) => agent,
            None => self
                .registry
                .get(&call.name)
                .map(|tool| &**tool)
                .ok_or_else(|| ToolError::Unknown(call.name.clone()))?,
        };
        validate_arguments(&tool.inputs(), &call.arguments).map_err(ToolError::InvalidArguments)?;
        let value = tool.execute(&call.arguments).map_err(ToolError::Failed)?;
        debug!("tool call succeeded");
        Ok(value)
    }
}
