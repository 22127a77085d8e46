//! Full runs of the tool-calling variant against a scripted model.

use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use agent_runner::agent::{
    Agent, AgentBuilder, AgentRunner, CallbackScope, CancelToken, RunOptions, RunResult, RunState,
};
use agent_runner::core::step::{ActionStep, Step, StepType};
use agent_runner::core::types::{Role, TokenUsage};
use agent_runner::error::{RunCancelled, StepError};
use agent_runner::model::Model;
use agent_runner::test_support::{
    EchoTool, FailingTool, ScriptedModel, ScriptedReply, final_answer_call, tool_call,
};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};

fn shared(model: &Arc<ScriptedModel>) -> Arc<dyn Model> {
    model.clone()
}

fn agent(model: &Arc<ScriptedModel>) -> AgentBuilder {
    AgentBuilder::new(shared(model))
        .tool(EchoTool)
        .tool(FailingTool)
}

fn action_steps(steps: &[Step]) -> Vec<&ActionStep> {
    steps
        .iter()
        .filter_map(|step| match step {
            Step::Action(action) => Some(action),
            _ => None,
        })
        .collect()
}

fn step_types(steps: &[Step]) -> Vec<StepType> {
    steps.iter().map(Step::step_type).collect()
}

#[test]
fn exhausts_budget_without_final_answer() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("still thinking")),
    );
    let runner = agent(&model).max_steps(3).build_tool_calling().expect("build");

    let result = runner.run("count to ten", RunOptions::default()).expect("run");

    assert_eq!(result.state, RunState::MaxStepsError);
    assert_eq!(result.output, None);
    assert_eq!(action_steps(&result.steps).len(), 3);
    assert_eq!(result.steps.len(), 4);
    assert_eq!(model.request_count(), 3);
    let numbers: Vec<u32> = action_steps(&result.steps)
        .iter()
        .map(|step| step.step_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn immediate_final_answer_completes_in_one_step() {
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        final_answer_call("c1", json!("Paris")),
    ])]));
    let runner = agent(&model).build_tool_calling().expect("build");

    let result = runner
        .run("capital of France?", RunOptions::default())
        .expect("run");

    assert!(result.is_success());
    assert_eq!(result.output, Some(json!("Paris")));
    assert_eq!(
        step_types(&result.steps),
        vec![StepType::Task, StepType::Action, StepType::FinalAnswer]
    );
    let action = action_steps(&result.steps)[0];
    assert!(action.is_final);
    assert_eq!(action.observations.as_deref(), Some("Paris"));
}

#[test]
fn failing_calls_do_not_abort_the_batch() {
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        tool_call("c1", "missing", json!({})),
        tool_call("c2", "echo", json!({"text": "hi"})),
        tool_call("c3", "fail", json!({})),
        tool_call("c4", "echo", json!({})),
    ])]));
    let runner = agent(&model).max_steps(1).build_tool_calling().expect("build");

    let result = runner.run("try things", RunOptions::default()).expect("run");

    assert_eq!(result.state, RunState::MaxStepsError);
    let action = action_steps(&result.steps)[0];
    assert_eq!(action.tool_calls.len(), 4);
    let observations = action.observations.as_deref().expect("observations");
    let lines: Vec<&str> = observations.lines().collect();
    assert_eq!(lines[0], "Error executing missing: unknown tool: missing");
    assert_eq!(lines[1], "hi");
    assert_eq!(lines[2], "Error executing fail: tool exploded");
    assert!(lines[3].starts_with("Error executing echo: invalid arguments:"));
    assert_eq!(action.error, None);
}

#[test]
fn last_final_answer_in_a_batch_wins() {
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        final_answer_call("c1", json!("first")),
        tool_call("c2", "echo", json!({"text": "between"})),
        final_answer_call("c3", json!("second")),
    ])]));
    let runner = agent(&model).build_tool_calling().expect("build");

    let result = runner.run("answer twice", RunOptions::default()).expect("run");

    assert_eq!(result.output, Some(json!("second")));
    let action = action_steps(&result.steps)[0];
    assert_eq!(
        action.observations.as_deref(),
        Some("first\nbetween\nsecond")
    );
    match result.steps.last() {
        Some(Step::FinalAnswer(step)) => assert_eq!(step.output, json!("second")),
        other => panic!("expected final answer step, got {other:?}"),
    }
}

#[test]
fn generation_failure_costs_one_step() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::error("rate limited"),
        ScriptedReply::calls(vec![final_answer_call("c1", json!(3))]),
    ]));
    let runner = agent(&model).build_tool_calling().expect("build");

    let result = runner.run("add 1 and 2", RunOptions::default()).expect("run");

    assert_eq!(result.output, Some(json!(3)));
    let actions = action_steps(&result.steps);
    assert_eq!(actions.len(), 2);
    assert_eq!(
        actions[0].error,
        Some(StepError::Generation("rate limited".to_string()))
    );
    assert_eq!(actions[0].model_output, None);

    let retry = &model.requests()[1];
    let last = retry.messages.last().expect("messages");
    assert_eq!(last.role, Role::User);
    assert_eq!(
        last.content,
        "Error:\nmodel generation failed: rate limited\nPlease try again or use another approach."
    );
}

#[test]
fn requests_carry_history_and_tool_schemas() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::calls(vec![tool_call("c1", "echo", json!({"text": "pong"}))]),
        ScriptedReply::calls(vec![final_answer_call("c2", json!("pong"))]),
    ]));
    let runner = agent(&model).build_tool_calling().expect("build");

    runner.run("ping", RunOptions::default()).expect("run");

    let requests = model.requests();
    let tool_names: Vec<&str> = requests[0]
        .options
        .tools
        .iter()
        .map(|schema| schema.name.as_str())
        .collect();
    assert_eq!(tool_names, vec!["echo", "fail", "final_answer"]);
    assert!(requests[0].options.stop_sequences.is_empty());

    let first = &requests[0].messages;
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].role, Role::System);
    assert_eq!(first[1].content, "Task:\nping");

    let second: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(second.len(), 4);
    assert!(second[2].starts_with("Calling tools:\n"));
    assert_eq!(second[3], "Observation:\npong");
}

#[test]
fn token_usage_sums_over_steps() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text("hmm").with_usage(10, 5),
        ScriptedReply::calls(vec![final_answer_call("c1", json!("ok"))]).with_usage(7, 3),
    ]));
    let runner = agent(&model).build_tool_calling().expect("build");

    let result = runner.run("go", RunOptions::default()).expect("run");

    assert_eq!(result.token_usage, TokenUsage::new(17, 8));
    assert_eq!(result.token_usage.total(), 25);
}

#[test]
fn cancellation_before_first_step_records_nothing() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("working")),
    );
    let runner = agent(&model).build_tool_calling().expect("build");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = runner
        .run("never starts", RunOptions::default().with_cancel(cancel))
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<RunCancelled>(),
        Some(&RunCancelled { step: 1 })
    );
    assert_eq!(model.request_count(), 0);
    let memory = runner.memory();
    assert_eq!(step_types(memory.steps()), vec![StepType::Task]);
}

#[test]
fn cancellation_is_honored_at_the_next_step_boundary() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("working")),
    );
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let runner = agent(&model)
        .max_steps(5)
        .on_step(StepType::Action, move |_| trigger.cancel())
        .build_tool_calling()
        .expect("build");

    let err = runner
        .run("stop soon", RunOptions::default().with_cancel(cancel))
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<RunCancelled>(),
        Some(&RunCancelled { step: 2 })
    );
    assert_eq!(model.request_count(), 1);
    assert_eq!(action_steps(runner.memory().steps()).len(), 1);
}

#[test]
fn reset_false_continues_the_conversation() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::calls(vec![final_answer_call("c1", json!("one"))]),
        ScriptedReply::calls(vec![final_answer_call("c2", json!("two"))]),
        ScriptedReply::calls(vec![final_answer_call("c3", json!("three"))]),
    ]));
    let runner = agent(&model).build_tool_calling().expect("build");

    runner.run("first", RunOptions::default()).expect("run 1");
    let second = runner
        .run("second", RunOptions::default().with_reset(false))
        .expect("run 2");

    assert_eq!(second.output, Some(json!("two")));
    assert_eq!(second.steps.len(), 6);
    let contents: Vec<String> = model.requests()[1]
        .messages
        .iter()
        .map(|message| message.content.clone())
        .collect();
    assert!(contents.contains(&"Task:\nfirst".to_string()));
    assert_eq!(contents.last().map(String::as_str), Some("Task:\nsecond"));

    let third = runner.run("third", RunOptions::default()).expect("run 3");
    assert_eq!(third.steps.len(), 3);
}

#[test]
fn run_option_budget_overrides_builder() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("...")),
    );
    let runner = agent(&model).max_steps(10).build_tool_calling().expect("build");

    let result = runner
        .run("short", RunOptions::default().with_max_steps(2))
        .expect("run");

    assert_eq!(action_steps(&result.steps).len(), 2);
}

#[test]
fn extra_args_are_described_in_the_task() {
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        final_answer_call("c1", json!("ok")),
    ])]));
    let runner = agent(&model).build_tool_calling().expect("build");

    let result = runner
        .run(
            "use the city",
            RunOptions::default().with_extra_arg("city", json!("Oslo")),
        )
        .expect("run");

    match &result.steps[0] {
        Step::Task(task) => {
            assert!(task.task.starts_with("use the city\n\n"));
            assert!(task.task.contains(r#"{"city":"Oslo"}"#));
        }
        other => panic!("expected task step, got {other:?}"),
    }
}

#[test]
fn managed_agent_runs_as_a_tool() {
    let child_model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        final_answer_call("k1", json!("child says hi")),
    ])]));
    let child = AgentBuilder::new(shared(&child_model))
        .name("researcher")
        .description("Looks things up")
        .build_tool_calling()
        .expect("build child");

    let parent_model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::calls(vec![tool_call(
            "c1",
            "researcher",
            json!({"task": "look it up"}),
        )]),
        ScriptedReply::calls(vec![final_answer_call("c2", json!("done"))]),
    ]));
    let parent = AgentBuilder::new(shared(&parent_model))
        .managed_agent(Arc::new(child))
        .build_tool_calling()
        .expect("build parent");

    let result = parent.run("delegate", RunOptions::default()).expect("run");

    assert_eq!(result.output, Some(json!("done")));
    assert_eq!(
        action_steps(&result.steps)[0].observations.as_deref(),
        Some("child says hi")
    );
    let child_request = &child_model.requests()[0];
    assert_eq!(
        child_request.messages.last().map(|m| m.content.as_str()),
        Some("Task:\nlook it up")
    );
    let advertised: Vec<String> = parent_model.requests()[0]
        .options
        .tools
        .iter()
        .map(|schema| schema.name.clone())
        .collect();
    assert!(advertised.contains(&"researcher".to_string()));
}

#[test]
fn exhausted_managed_agent_yields_null() {
    let child_model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("no idea")),
    );
    let child = AgentBuilder::new(shared(&child_model))
        .name("helper")
        .max_steps(1)
        .build_tool_calling()
        .expect("build child");
    let parent_model = Arc::new(ScriptedModel::new(vec![ScriptedReply::calls(vec![
        tool_call("c1", "helper", json!({"task": "help"})),
    ])]));
    let parent = AgentBuilder::new(shared(&parent_model))
        .managed_agent(Arc::new(child))
        .max_steps(1)
        .build_tool_calling()
        .expect("build parent");

    let result = parent.run("ask", RunOptions::default()).expect("run");

    assert_eq!(
        action_steps(&result.steps)[0].observations.as_deref(),
        Some("null")
    );
}

/// Delegates to an agent supplied after construction, so a cycle can be wired.
struct LateBound {
    name: String,
    target: OnceLock<Arc<dyn Agent>>,
}

impl Agent for LateBound {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Delegates to its bound agent"
    }

    fn run(&self, task: &str, options: RunOptions) -> Result<RunResult> {
        self.target
            .get()
            .ok_or_else(|| anyhow!("agent {} is not bound", self.name))?
            .run(task, options)
    }
}

/// Nested agent whose run always fails.
struct BrokenAgent;

impl Agent for BrokenAgent {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Never finishes"
    }

    fn run(&self, _task: &str, _options: RunOptions) -> Result<RunResult> {
        Err(anyhow!("nested run failed"))
    }
}

#[test]
fn agent_managing_itself_is_rejected_and_the_run_continues() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::calls(vec![tool_call("c1", "looper", json!({"task": "again"}))]),
        ScriptedReply::calls(vec![final_answer_call("c2", json!("escaped"))]),
    ]));
    let proxy = Arc::new(LateBound {
        name: "looper".to_string(),
        target: OnceLock::new(),
    });
    let proxy_agent: Arc<dyn Agent> = proxy.clone();
    let runner: Arc<AgentRunner> = Arc::new(
        AgentBuilder::new(shared(&model))
            .name("looper")
            .managed_agent(proxy_agent)
            .build_tool_calling()
            .expect("build"),
    );
    let target: Arc<dyn Agent> = runner.clone();
    assert!(proxy.target.set(target).is_ok());

    let result = runner.run("recurse", RunOptions::default()).expect("run");

    assert_eq!(result.output, Some(json!("escaped")));
    let actions = action_steps(&result.steps);
    assert_eq!(actions.len(), 2);
    assert_eq!(
        actions[0].observations.as_deref(),
        Some("Error executing looper: agent looper is already running on this thread")
    );
    assert_eq!(model.request_count(), 2);
}

#[test]
fn failed_nested_run_is_an_observation_and_siblings_still_run() {
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::calls(vec![
            tool_call("c1", "broken", json!({"task": "try"})),
            tool_call("c2", "echo", json!({"text": "after"})),
        ]),
        ScriptedReply::calls(vec![final_answer_call("c3", json!("recovered"))]),
    ]));
    let runner = agent(&model)
        .managed_agent(Arc::new(BrokenAgent))
        .build_tool_calling()
        .expect("build");

    let result = runner.run("delegate", RunOptions::default()).expect("run");

    assert_eq!(result.output, Some(json!("recovered")));
    let action = action_steps(&result.steps)[0];
    assert_eq!(action.tool_calls.len(), 2);
    assert_eq!(
        action.observations.as_deref(),
        Some("Error executing broken: nested run failed\nafter")
    );
    assert!(!action.is_final);
}

#[test]
fn callbacks_fire_only_after_action_steps() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text("plan: think, then answer"),
        ScriptedReply::error("overloaded"),
        ScriptedReply::text("plan again"),
        ScriptedReply::calls(vec![final_answer_call("c1", json!(1))]),
    ]));
    let mut runner = agent(&model)
        .planning_interval(1)
        .build_tool_calling()
        .expect("build");
    let all = Arc::clone(&seen);
    runner.on_step(CallbackScope::All, move |step| {
        let label = match step {
            Step::Action(action) => format!("all:action#{}", action.step_number),
            other => format!("all:{}", other.step_type()),
        };
        all.lock().expect("lock").push(label);
    });
    let actions = Arc::clone(&seen);
    runner
        .on_step_tag("action", move |_| {
            actions.lock().expect("lock").push("action".to_string());
        })
        .expect("tag");
    let planning = Arc::clone(&seen);
    runner
        .on_step_tag("planning", move |_| {
            planning.lock().expect("lock").push("planning".to_string());
        })
        .expect("tag");

    let result = runner.run("go", RunOptions::default()).expect("run");

    assert_eq!(
        step_types(&result.steps),
        vec![
            StepType::Task,
            StepType::Planning,
            StepType::Action,
            StepType::Planning,
            StepType::Action,
            StepType::FinalAnswer,
        ]
    );
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["action", "all:action#1", "action", "all:action#2"]
    );
}

#[test]
fn planning_runs_before_first_step_and_on_interval() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new()).with_fallback(ScriptedReply::text("plan or act")),
    );
    let runner = agent(&model)
        .max_steps(3)
        .planning_interval(2)
        .build_tool_calling()
        .expect("build");

    let result = runner.run("plan ahead", RunOptions::default()).expect("run");

    assert_eq!(
        step_types(&result.steps),
        vec![
            StepType::Task,
            StepType::Planning,
            StepType::Action,
            StepType::Action,
            StepType::Planning,
            StepType::Action,
        ]
    );
    let requests = model.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests[0].options.tools.is_empty());
    let first_plan_prompt = &requests[0].messages.last().expect("prompt").content;
    assert!(first_plan_prompt.starts_with("Before acting"));
    assert!(!first_plan_prompt.contains("Progress so far"));
    let second_plan_prompt = &requests[3].messages.last().expect("prompt").content;
    assert!(second_plan_prompt.contains("Progress so far"));
    assert!(!requests[1].options.tools.is_empty());

    // The plan is replayed to the model followed by the fixed follow-up.
    let contents: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(
        &contents[2..],
        &["plan or act", "Now proceed and carry out this plan."]
    );
}

#[test]
fn concurrent_runs_on_one_instance_serialize() {
    let model = Arc::new(
        ScriptedModel::new(Vec::new())
            .with_fallback(ScriptedReply::calls(vec![final_answer_call("c", json!(1))])),
    );
    let runner: Arc<AgentRunner> = Arc::new(agent(&model).build_tool_calling().expect("build"));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.run(&format!("task {i}"), RunOptions::default()))
        })
        .collect();
    for handle in handles {
        let result = handle.join().expect("join").expect("run");
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.output, Some(Value::from(1)));
    }
    assert_eq!(model.request_count(), 4);
}
