//! Schema exports for presenting tools to a model, and argument validation
//! against the same schema.

use std::fmt::Write as _;

use jsonschema::validator_for;
use serde_json::{Map, Value, json};

use crate::core::types::Arguments;
use crate::tools::{ToolInputs, ToolSchema};

const JSON_TYPES: [&str; 7] = [
    "string", "integer", "number", "boolean", "array", "object", "null",
];

/// JSON Schema `object` describing a tool's inputs.
///
/// Inputs whose declared type is not a JSON type (e.g. `any`) are left
/// unconstrained.
pub fn parameters_schema(inputs: &ToolInputs) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, input) in inputs {
        let mut property = Map::new();
        if JSON_TYPES.contains(&input.kind.as_str()) {
            property.insert("type".to_string(), json!(input.kind));
        }
        property.insert("description".to_string(), json!(input.description));
        properties.insert(name.clone(), Value::Object(property));
        if input.required {
            required.push(json!(name));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// OpenAI-style function-calling entry for one tool.
pub fn function_schema(schema: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": parameters_schema(&schema.inputs),
        },
    })
}

/// Python-style signatures used by the code-agent prompt.
pub fn code_signatures(schemas: &[ToolSchema]) -> String {
    let mut out = String::new();
    for schema in schemas {
        let params: Vec<String> = schema
            .inputs
            .iter()
            .map(|(name, input)| format!("{name}: {}", python_type(&input.kind)))
            .collect();
        let _ = writeln!(
            out,
            "def {}({}) -> {}:",
            schema.name,
            params.join(", "),
            python_type(&schema.output_type)
        );
        let _ = writeln!(out, "    \"\"\"{}\"\"\"\n", schema.description);
    }
    out
}

/// Map a declared input type to its Python annotation.
pub fn python_type(kind: &str) -> &'static str {
    match kind {
        "string" => "str",
        "integer" => "int",
        "number" => "float",
        "boolean" => "bool",
        "array" => "list",
        "object" => "dict",
        _ => "Any",
    }
}

/// Check call arguments against the tool's parameter schema.
///
/// Returns every violation joined into one message.
pub fn validate_arguments(inputs: &ToolInputs, args: &Arguments) -> Result<(), String> {
    let schema = parameters_schema(inputs);
    let validator = validator_for(&schema).map_err(|err| format!("invalid tool schema: {err}"))?;
    let instance = Value::Object(args.clone());
    let messages: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages.join("; "))
    }
}
