//! Name-keyed tool registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tools::schema::{code_signatures, function_schema};
use crate::tools::{FinalAnswerTool, Tool, ToolSchema};

/// Registered tools keyed by name; the last registration of a name wins.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-seeded with the built-in `final_answer` tool.
    pub fn with_final_answer() -> Self {
        let mut registry = Self::new();
        registry.register(FinalAnswerTool);
        registry
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.all().map(|tool| tool.schema()).collect()
    }

    pub fn to_json_schema(&self) -> Vec<Value> {
        self.schemas().iter().map(function_schema).collect()
    }

    pub fn to_code_prompt(&self) -> String {
        code_signatures(&self.schemas())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FunctionTool, ToolInputs};
    use serde_json::json;

    fn constant(name: &str, value: i64) -> FunctionTool {
        FunctionTool::new(name, "constant", ToolInputs::new(), "integer", move |_| {
            Ok(json!(value))
        })
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(constant("seven", 1));
        registry.register(constant("seven", 7));
        assert_eq!(registry.len(), 1);
        let tool = registry.get("seven").expect("registered");
        assert_eq!(tool.execute(&Default::default()).expect("run"), json!(7));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ToolRegistry::with_final_answer();
        registry.register(constant("zeta", 0));
        registry.register(constant("alpha", 0));
        assert_eq!(registry.names(), vec!["alpha", "final_answer", "zeta"]);
    }

    #[test]
    fn missing_tool_is_none() {
        assert!(ToolRegistry::new().get("nope").is_none());
    }

    #[test]
    fn json_schema_has_entry_per_tool() {
        let registry = ToolRegistry::with_final_answer();
        let schemas = registry.to_json_schema();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["function"]["name"], "final_answer");
        assert!(registry.to_code_prompt().contains("def final_answer(answer: Any) -> Any:"));
    }
}
