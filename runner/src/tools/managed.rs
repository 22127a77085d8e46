//! Nested agents exposed to a parent agent as callable tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::agent::{Agent, RunOptions};
use crate::core::types::Arguments;
use crate::tools::{Tool, ToolInput, ToolInputs};

/// Wraps an [`Agent`] so it can be dispatched like any other tool.
///
/// Invoking it runs the nested agent to completion on the caller's thread.
/// Nothing prevents an agent from (transitively) managing itself; such a cycle
/// recurses until a step budget or the nested runner's lock stops it.
#[derive(Clone)]
pub struct ManagedAgent {
    agent: Arc<dyn Agent>,
}

impl ManagedAgent {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

impl Tool for ManagedAgent {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn description(&self) -> &str {
        self.agent.description()
    }

    fn inputs(&self) -> ToolInputs {
        BTreeMap::from([(
            "task".to_string(),
            ToolInput::required("string", "Task for this agent"),
        )])
    }

    fn output_type(&self) -> &str {
        "string"
    }

    #[instrument(skip_all, fields(agent = %self.agent.name()))]
    fn execute(&self, args: &Arguments) -> Result<Value> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing required argument: task"))?;
        let result = self.agent.run(task, RunOptions::default())?;
        debug!(state = ?result.state, steps = result.steps.len(), "managed agent finished");
        Ok(result.output.unwrap_or(Value::Null))
    }
}
