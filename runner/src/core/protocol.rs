//! Names and line format shared between the engine and every code executor.
//!
//! Both executor realizations run the same harness, so these strings are the
//! whole interchange contract.

use serde_json::Value;

/// Prefix of the log line carrying the final value as JSON.
pub const RESULT_PREFIX: &str = "__RESULT__:";

/// Name of the reserved final-answer tool and code primitive.
pub const FINAL_ANSWER: &str = "final_answer";

/// Global holding the injected execution state inside the harness.
pub const STATE_VAR: &str = "__state__";

/// Split captured stdout into the final value (if any) and the remaining logs.
///
/// Only the last non-empty line is inspected. Without the sentinel the logs are
/// returned untouched and the output is absent. A payload that is not valid JSON
/// is kept as a plain string.
pub fn split_result_line(logs: &str) -> (Option<Value>, String) {
    let lines: Vec<&str> = logs.lines().collect();
    let Some(index) = lines.iter().rposition(|line| !line.trim().is_empty()) else {
        return (None, logs.to_string());
    };
    let Some(payload) = lines[index].trim_end().strip_prefix(RESULT_PREFIX) else {
        return (None, logs.to_string());
    };
    let value = serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
    (Some(value), lines[..index].join("\n"))
}
