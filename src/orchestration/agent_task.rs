//! Autonomous sub-agent execution unit.
//!
//! A sub-agent is a delegated tool-calling loop running concurrently with the
//! main query loop. It holds a private transcript, sees every tool except the
//! agent-management ones (no recursive spawning), and publishes its final
//! answer through the supervisor like any other task.

use crate::config::ProviderConfig;
use crate::provider::{wire, ChatMessage, ProviderClient, ToolCall};
use crate::tools::{is_agent_tool, ToolRegistry};

use super::supervisor::TaskSupervisor;
use super::types::{TaskId, TaskKind, TaskStatus};

/// Hard cap on LLM round-trips per sub-agent.
const MAX_AGENT_ITERATIONS: usize = 15;

/// Spawn a sub-agent working on `task` with the given `role`.
///
/// Registers the agent as `Running` and returns its id immediately. The loop
/// runs on its own tokio task; its terminal state (final answer, error, or
/// cancellation) is published through the supervisor.
pub fn spawn_agent(
    supervisor: &TaskSupervisor,
    provider: ProviderConfig,
    registry: ToolRegistry,
    role: String,
    task: String,
) -> Result<TaskId, String> {
    let client = ProviderClient::new(provider).map_err(|e| e.to_string())?;

    let kind = TaskKind::Agent { role: role.clone(), task: task.clone() };
    let id = supervisor.allocate_id(&kind);
    let cancel_token = supervisor.child_token();
    supervisor.register(id.clone(), kind, cancel_token.clone());

    let task_id = id.clone();
    let task_supervisor = supervisor.clone();
    let handle = tokio::spawn(async move {
        run_agent(task_supervisor, task_id, client, registry, role, task, cancel_token).await;
    });
    supervisor.set_join_handle(&id, handle);

    Ok(id)
}

async fn run_agent(
    supervisor: TaskSupervisor,
    id: TaskId,
    client: ProviderClient,
    registry: ToolRegistry,
    role: String,
    task: String,
    cancel_token: tokio_util::sync::CancellationToken,
) {
    let system_prompt = agent_system_prompt(&role, &task);
    let base = vec![ChatMessage::system(&system_prompt), ChatMessage::user(&task)];
    let descriptors = registry.sub_agent_descriptors();

    let mut transcript: Vec<ChatMessage> = Vec::new();
    let mut total_tokens: u64 = 0;

    for _ in 0..MAX_AGENT_ITERATIONS {
        // Cancellation checkpoint: observed between LLM turns, never mid-call.
        if cancel_token.is_cancelled() {
            supervisor.finish(
                &id,
                TaskStatus::Cancelled,
                String::new(),
                "Cancelled by user".to_string(),
                total_tokens,
            );
            return;
        }

        let mut messages = base.clone();
        messages.extend(transcript.iter().cloned());

        let turn = match client.chat_turn(&messages, &descriptors).await {
            Ok(turn) => turn,
            Err(e) => {
                supervisor.finish(
                    &id,
                    TaskStatus::Failed(e.to_string()),
                    String::new(),
                    e.to_string(),
                    total_tokens,
                );
                return;
            }
        };
        total_tokens += turn.total_tokens;

        if turn.tool_calls.is_empty() {
            supervisor.finish(&id, TaskStatus::Completed, turn.text, String::new(), total_tokens);
            return;
        }

        let mut results = Vec::with_capacity(turn.tool_calls.len());
        for call in &turn.tool_calls {
            results.push(resolve_tool_call(&registry, call).await);
        }
        transcript.extend(wire::tool_exchange(Some(turn.text), turn.tool_calls, results));
    }

    supervisor.finish(
        &id,
        TaskStatus::Completed,
        "Agent reached maximum iterations without final response".to_string(),
        String::new(),
        total_tokens,
    );
}

/// Execute one tool call on the agent's behalf, always producing transcript
/// text. Agent-management tools are declined; structural dispatch errors are
/// folded into the result so the model can react to them.
pub(crate) async fn resolve_tool_call(registry: &ToolRegistry, call: &ToolCall) -> String {
    if is_agent_tool(&call.function.name) {
        return "Sub-agents cannot spawn other agents".to_string();
    }
    match registry.execute(&call.function.name, &call.function.arguments).await {
        Ok(result) => result,
        Err(e) => format!("Error: {e}"),
    }
}

fn agent_system_prompt(role: &str, task: &str) -> String {
    format!(
        "You are a focused sub-agent with role: {role}\n\n\
         Your task: {task}\n\n\
         You have access to tools for running commands, background tasks, \
         build watching, and knowledge recall.\n\
         Work autonomously to complete your task. Be thorough but efficient.\n\
         When done, provide a clear summary of what you accomplished or found."
    )
}
