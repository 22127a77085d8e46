//! Step callbacks.

use std::fmt;
use std::str::FromStr;

use anyhow::{Error, anyhow};

use crate::core::step::{Step, StepType};

/// Which steps a callback fires for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackScope {
    Only(StepType),
    All,
}

impl CallbackScope {
    fn matches(self, step_type: StepType) -> bool {
        match self {
            CallbackScope::Only(wanted) => wanted == step_type,
            CallbackScope::All => true,
        }
    }
}

impl From<StepType> for CallbackScope {
    fn from(step_type: StepType) -> Self {
        CallbackScope::Only(step_type)
    }
}

impl FromStr for CallbackScope {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Ok(match tag {
            "all" => CallbackScope::All,
            "task" => CallbackScope::Only(StepType::Task),
            "action" => CallbackScope::Only(StepType::Action),
            "planning" => CallbackScope::Only(StepType::Planning),
            "final_answer" => CallbackScope::Only(StepType::FinalAnswer),
            other => return Err(anyhow!("unknown step type tag: {other}")),
        })
    }
}

pub type StepCallback = Box<dyn Fn(&Step) + Send + Sync>;

/// Handlers keyed by step type, invoked synchronously on the run's thread.
///
/// For a given step, handlers registered for its type run first, then the
/// catch-all handlers, each group in registration order.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: Vec<(CallbackScope, StepCallback)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, scope: impl Into<CallbackScope>, handler: F)
    where
        F: Fn(&Step) + Send + Sync + 'static,
    {
        self.handlers.push((scope.into(), Box::new(handler)));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn trigger(&self, step: &Step) {
        let step_type = step.step_type();
        let specific = self
            .handlers
            .iter()
            .filter(|(scope, _)| *scope != CallbackScope::All && scope.matches(step_type));
        let catch_all = self
            .handlers
            .iter()
            .filter(|(scope, _)| *scope == CallbackScope::All);
        for (_, handler) in specific.chain(catch_all) {
            handler(step);
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
