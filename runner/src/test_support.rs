//! Deterministic doubles for driving runs in tests.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::types::{Arguments, Message, TokenUsage, ToolCall};
use crate::io::config::{EngineConfig, write_config};
use crate::io::executor::{CodeExecutor, CodeOutcome, ExecutionState};
use crate::model::{GenerateOptions, Model};
use crate::tools::{Tool, ToolInput, ToolInputs};

/// One queued model response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Message(Message),
    Error(String),
}

impl ScriptedReply {
    pub fn text(content: &str) -> Self {
        ScriptedReply::Message(Message::assistant(content))
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        ScriptedReply::Message(Message::assistant("").with_tool_calls(calls))
    }

    pub fn error(message: &str) -> Self {
        ScriptedReply::Error(message.to_string())
    }

    /// Attach token usage to a message reply; errors are left as is.
    pub fn with_usage(self, input_tokens: u64, output_tokens: u64) -> Self {
        match self {
            ScriptedReply::Message(message) => ScriptedReply::Message(
                message.with_token_usage(TokenUsage::new(input_tokens, output_tokens)),
            ),
            error => error,
        }
    }
}

/// A request the model received.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub options: GenerateOptions,
}

/// Model that replays queued replies in order and records every request.
///
/// Once the queue is empty it returns the fallback reply, or an error if none
/// was set.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<ScriptedReply>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl Model for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<Message> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(ModelRequest {
                messages: messages.to_vec(),
                options: options.clone(),
            });
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("scripted model has no replies left"))?;
        match reply {
            ScriptedReply::Message(message) => Ok(message),
            ScriptedReply::Error(message) => Err(anyhow!(message)),
        }
    }
}

/// Code passed to a [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCode {
    pub code: String,
    pub state: ExecutionState,
}

/// Executor that replays queued outcomes and records what it was asked to run.
///
/// Clones share the queue and the record, so a test can keep one handle while
/// the agent owns another. An empty queue yields an empty successful outcome.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: Arc<Mutex<VecDeque<CodeOutcome>>>,
    executed: Arc<Mutex<Vec<ExecutedCode>>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<CodeOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed(&self) -> Vec<ExecutedCode> {
        self.executed.lock().expect("executed lock").clone()
    }
}

impl CodeExecutor for ScriptedExecutor {
    fn execute(&self, code: &str, state: &ExecutionState) -> CodeOutcome {
        self.executed
            .lock()
            .expect("executed lock")
            .push(ExecutedCode {
                code: code.to_string(),
                state: state.clone(),
            });
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or_default()
    }
}

/// Successful outcome with the given output and logs.
pub fn outcome(output: Option<Value>, logs: &str) -> CodeOutcome {
    CodeOutcome {
        output,
        logs: logs.to_string(),
        error: None,
    }
}

/// Returns its `text` argument.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes the given text"
    }

    fn inputs(&self) -> ToolInputs {
        BTreeMap::from([(
            "text".to_string(),
            ToolInput::required("string", "Text to echo"),
        )])
    }

    fn output_type(&self) -> &str {
        "string"
    }

    fn execute(&self, args: &Arguments) -> Result<Value> {
        args.get("text")
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: text"))
    }
}

/// Always fails with "tool exploded".
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTool;

impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn inputs(&self) -> ToolInputs {
        ToolInputs::new()
    }

    fn output_type(&self) -> &str {
        "string"
    }

    fn execute(&self, _args: &Arguments) -> Result<Value> {
        Err(anyhow!("tool exploded"))
    }
}

/// Build a tool call from a JSON object of arguments.
pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    let arguments = match arguments {
        Value::Object(map) => map,
        _ => Arguments::new(),
    };
    ToolCall::new(id, name, arguments)
}

pub fn final_answer_call(id: &str, answer: Value) -> ToolCall {
    let mut arguments = Arguments::new();
    arguments.insert("answer".to_string(), answer);
    ToolCall::new(id, crate::core::protocol::FINAL_ANSWER, arguments)
}

/// Write `config` into a fresh temp dir and return both.
pub fn temp_config(config: &EngineConfig) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("agent-runner.toml");
    write_config(&path, config)?;
    Ok((dir, path))
}
