//! Tool contract and the built-in tools every agent carries.
//!
//! Tools are an open capability set addressed by name. The runner never
//! inspects concrete tool types; it resolves a name through a [`Toolbox`] and
//! calls [`Tool::execute`].

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::protocol::FINAL_ANSWER;
use crate::core::types::Arguments;

pub mod dispatch;
pub mod managed;
pub mod registry;
pub mod schema;

pub use dispatch::Toolbox;
pub use managed::ManagedAgent;
pub use registry::ToolRegistry;

/// One declared input of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl ToolInput {
    pub fn required(kind: &str, description: &str) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(kind: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(kind, description)
        }
    }
}

/// Declared inputs keyed by field name.
pub type ToolInputs = BTreeMap<String, ToolInput>;

/// Structural description of a tool, as presented to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub inputs: ToolInputs,
    pub output_type: String,
}

/// A named capability the model can invoke.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn inputs(&self) -> ToolInputs;
    fn output_type(&self) -> &str;
    fn execute(&self, args: &Arguments) -> Result<Value>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            inputs: self.inputs(),
            output_type: self.output_type().to_string(),
        }
    }
}

/// Built-in tool whose result ends the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinalAnswerTool;

impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER
    }

    fn description(&self) -> &str {
        "Provides a final answer to the given problem."
    }

    fn inputs(&self) -> ToolInputs {
        BTreeMap::from([(
            "answer".to_string(),
            ToolInput::required("any", "The final answer to the problem"),
        )])
    }

    fn output_type(&self) -> &str {
        "any"
    }

    fn execute(&self, args: &Arguments) -> Result<Value> {
        args.get("answer")
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: answer"))
    }
}

type ToolFn = dyn Fn(&Arguments) -> Result<Value> + Send + Sync;

/// Tool backed by a closure.
pub struct FunctionTool {
    name: String,
    description: String,
    inputs: ToolInputs,
    output_type: String,
    func: Box<ToolFn>,
}

impl FunctionTool {
    pub fn new<F>(
        name: &str,
        description: &str,
        inputs: ToolInputs,
        output_type: &str,
        func: F,
    ) -> Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            inputs,
            output_type: output_type.to_string(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("output_type", &self.output_type)
            .finish_non_exhaustive()
    }
}

impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn inputs(&self) -> ToolInputs {
        self.inputs.clone()
    }

    fn output_type(&self) -> &str {
        &self.output_type
    }

    fn execute(&self, args: &Arguments) -> Result<Value> {
        (self.func)(args)
    }
}
