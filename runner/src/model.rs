//! Contract with the language-model collaborator.
//!
//! The engine renders history into messages and hands them over together with
//! generation options; transport and request marshaling live behind [`Model`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::types::Message;
use crate::tools::ToolSchema;

/// Per-request generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub stop_sequences: Vec<String>,
    /// Tools the model may call; empty for the code variant.
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn with_stop_sequences<I, S>(mut self, sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = sequences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat-completion backend.
///
/// `generate` returns the assistant message, with any structured tool calls and
/// the token usage of the request attached.
pub trait Model: Send + Sync {
    fn model_id(&self) -> &str;
    fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<Message>;
}
