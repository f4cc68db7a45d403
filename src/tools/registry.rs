//! Tool dispatch.
//!
//! [`ToolRegistry`] owns the collaborators every tool needs and routes model
//! tool calls to handlers. Only two failures are structural and surface as
//! `Err`: an unknown tool name, and argument JSON that does not deserialize
//! into the tool's typed argument struct. Everything a handler can say about
//! its own domain (a missing task id, a failed command, a rejected watcher
//! start) is returned as `Ok` text so the model can read it and react.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderConfig;
use crate::error::ToolError;
use crate::exec::execute_shell;
use crate::knowledge::KnowledgeStore;
use crate::orchestration::{
    agent_task, command_task, TaskKind, TaskSnapshot, TaskSupervisor, WaitOutcome,
};
use crate::text::truncate;
use crate::watch::WatchService;

use super::descriptor::ToolDescriptor;

/// Tools sub-agents must not see: agent management is reserved for the
/// top-level loop so delegation stays one level deep.
const AGENT_TOOLS: [&str; 5] = [
    "spawn_agent",
    "list_agents",
    "get_agent_result",
    "wait_for_agent",
    "cancel_agent",
];

pub fn is_agent_tool(name: &str) -> bool {
    AGENT_TOOLS.contains(&name)
}

const DEFAULT_WAIT_SECS: u64 = 120;

#[derive(Clone)]
pub struct ToolRegistry {
    supervisor: TaskSupervisor,
    watch: WatchService,
    knowledge: Arc<dyn KnowledgeStore>,
    provider: ProviderConfig,
    command_timeout: Duration,
    /// Project path used to scope knowledge entries.
    scope: String,
}

impl ToolRegistry {
    pub fn new(
        supervisor: TaskSupervisor,
        watch: WatchService,
        knowledge: Arc<dyn KnowledgeStore>,
        provider: ProviderConfig,
        command_timeout: Duration,
        root: &Path,
    ) -> Self {
        Self {
            supervisor,
            watch,
            knowledge,
            provider,
            command_timeout,
            scope: root.display().to_string(),
        }
    }

    /// All registered tool descriptors, for the top-level loop.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        all_descriptors()
    }

    /// Descriptors offered to sub-agents: everything except agent management.
    pub fn sub_agent_descriptors(&self) -> Vec<ToolDescriptor> {
        all_descriptors()
            .into_iter()
            .filter(|d| !is_agent_tool(&d.name))
            .collect()
    }

    /// Execute one tool call, returning model-readable result text.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        match name {
            "run_command" => {
                let args: RunCommandArgs = parse_args(name, arguments)?;
                Ok(self.run_command(&args.command).await)
            }
            "run_background" => {
                let args: RunBackgroundArgs = parse_args(name, arguments)?;
                Ok(self.run_background(args.command, args.description))
            }
            "check_task" => {
                let args: TaskIdArgs = parse_args(name, arguments)?;
                Ok(self.check_task(&args.task_id))
            }
            "list_tasks" => {
                let _: NoArgs = parse_args(name, arguments)?;
                Ok(self.list_tasks())
            }
            "kill_task" => {
                let args: TaskIdArgs = parse_args(name, arguments)?;
                Ok(self.kill_task(&args.task_id))
            }
            "spawn_agent" => {
                let args: SpawnAgentArgs = parse_args(name, arguments)?;
                Ok(self.spawn_agent(args.role, args.task))
            }
            "list_agents" => {
                let _: NoArgs = parse_args(name, arguments)?;
                Ok(self.list_agents())
            }
            "get_agent_result" => {
                let args: AgentIdArgs = parse_args(name, arguments)?;
                Ok(self.get_agent_result(&args.agent_id))
            }
            "wait_for_agent" => {
                let args: WaitForAgentArgs = parse_args(name, arguments)?;
                Ok(self.wait_for_agent(&args.agent_id, args.timeout_seconds).await)
            }
            "cancel_agent" => {
                let args: AgentIdArgs = parse_args(name, arguments)?;
                Ok(self.cancel_agent(&args.agent_id))
            }
            "start_watch" => {
                let args: StartWatchArgs = parse_args(name, arguments)?;
                Ok(self
                    .watch
                    .start(args.patterns, args.build_command, args.test_command))
            }
            "stop_watch" => {
                let _: NoArgs = parse_args(name, arguments)?;
                Ok(self.watch.stop())
            }
            "watch_status" => {
                let _: NoArgs = parse_args(name, arguments)?;
                Ok(self.watch.status())
            }
            "trigger_build" => {
                let args: TriggerBuildArgs = parse_args(name, arguments)?;
                Ok(self.watch.trigger_build(args.command).await)
            }
            "diagnose_error" => {
                let args: DiagnoseErrorArgs = parse_args(name, arguments)?;
                Ok(self.watch.diagnose(&args.error_text, args.auto_repair).await)
            }
            "remember_fact" => {
                let args: RememberFactArgs = parse_args(name, arguments)?;
                Ok(self.remember_fact(args))
            }
            "recall_knowledge" => {
                let args: RecallKnowledgeArgs = parse_args(name, arguments)?;
                Ok(self.recall_knowledge(&args.query, args.limit))
            }
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    async fn run_command(&self, command: &str) -> String {
        let exec = execute_shell(command, None, self.command_timeout).await;
        let mut result = exec.combined_output();
        if exec.timed_out {
            result.push_str(&format!(
                "\n[Command timed out after {}s - use run_background for long commands]",
                self.command_timeout.as_secs()
            ));
        } else if !exec.success() {
            match exec.exit_code {
                Some(code) => result.push_str(&format!("\n[Exit: {code}]")),
                None => result.push_str("\n[Exit: terminated by signal]"),
            }
        }
        result
    }

    fn run_background(&self, command: String, description: Option<String>) -> String {
        let description = description.unwrap_or_else(|| "Background task".to_string());
        match command_task::spawn_command(&self.supervisor, command.clone()) {
            Ok(id) => format!("Started background task {id}: {description}\nCommand: {command}"),
            Err(e) => e,
        }
    }

    fn check_task(&self, task_id: &str) -> String {
        match self.supervisor.snapshot(task_id) {
            Some(snap) => task_detail(&snap),
            None => format!("Task {task_id} not found"),
        }
    }

    fn list_tasks(&self) -> String {
        let tasks: Vec<TaskSnapshot> = self
            .supervisor
            .list()
            .into_iter()
            .filter(|s| matches!(s.kind, TaskKind::Command { .. }))
            .collect();
        if tasks.is_empty() {
            return "No background tasks".to_string();
        }
        let mut result = String::from("Background Tasks:\n");
        for task in &tasks {
            result.push_str(&task.summary_line());
            result.push('\n');
        }
        result
    }

    fn kill_task(&self, task_id: &str) -> String {
        match self.supervisor.cancel(task_id) {
            None => format!("Task {task_id} not found"),
            Some(snap) if snap.status.is_terminal() => {
                format!("Task {task_id} already finished with status: {}", snap.status.label())
            }
            Some(_) => format!("Task {task_id} killed"),
        }
    }

    fn spawn_agent(&self, role: Option<String>, task: String) -> String {
        let role = role.unwrap_or_else(|| "general".to_string());
        match agent_task::spawn_agent(
            &self.supervisor,
            self.provider.clone(),
            self.clone(),
            role.clone(),
            task.clone(),
        ) {
            Ok(id) => format!(
                "Spawned {id} (role: {role})\nTask: {}",
                truncate(&task, 100)
            ),
            Err(e) => e,
        }
    }

    fn list_agents(&self) -> String {
        let agents = self.supervisor.list_agents();
        if agents.is_empty() {
            return "No agents spawned".to_string();
        }
        let mut result = String::from("Agents:\n");
        for agent in &agents {
            result.push_str(&agent.summary_line());
            result.push('\n');
            if agent.tokens_used > 0 {
                result.push_str(&format!("    Tokens: {}\n", agent.tokens_used));
            }
        }
        result
    }

    fn get_agent_result(&self, agent_id: &str) -> String {
        match self.supervisor.snapshot(agent_id) {
            Some(snap) => agent_detail(&snap),
            None => format!("Agent {agent_id} not found"),
        }
    }

    async fn wait_for_agent(&self, agent_id: &str, timeout_seconds: Option<u64>) -> String {
        let timeout = timeout_seconds.unwrap_or(DEFAULT_WAIT_SECS);
        match self.supervisor.wait(agent_id, Duration::from_secs(timeout)).await {
            None => format!("Agent {agent_id} not found"),
            Some(WaitOutcome::Finished(snap)) => agent_detail(&snap),
            Some(WaitOutcome::TimedOut) => {
                format!("Timeout waiting for agent {agent_id} after {timeout} seconds")
            }
        }
    }

    fn cancel_agent(&self, agent_id: &str) -> String {
        match self.supervisor.cancel(agent_id) {
            None => format!("Agent {agent_id} not found"),
            Some(snap) if snap.status.is_terminal() => {
                format!("Agent {agent_id} already finished with status: {}", snap.status.label())
            }
            Some(_) => format!("Agent {agent_id} cancelled"),
        }
    }

    fn remember_fact(&self, args: RememberFactArgs) -> String {
        let scope = if args.project_scoped { self.scope.as_str() } else { "" };
        self.knowledge
            .upsert_fact(&args.category, &args.subject, &args.predicate, &args.object, scope);
        format!("Learned fact: {} {} {}", args.subject, args.predicate, args.object)
    }

    fn recall_knowledge(&self, query: &str, limit: Option<usize>) -> String {
        let facts = self.knowledge.recall(query, &self.scope, limit.unwrap_or(10));
        if facts.is_empty() {
            return format!("No knowledge found for '{query}'");
        }
        let mut result = String::from("Facts:\n");
        for fact in &facts {
            result.push_str(&format!(
                "  [{}] {} {} {}\n",
                fact.category, fact.subject, fact.predicate, fact.object
            ));
        }
        result
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &str) -> Result<T, ToolError> {
    let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunCommandArgs {
    command: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunBackgroundArgs {
    command: String,
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskIdArgs {
    task_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpawnAgentArgs {
    task: String,
    role: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentIdArgs {
    agent_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WaitForAgentArgs {
    agent_id: String,
    timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
struct StartWatchArgs {
    patterns: Vec<String>,
    build_command: Option<String>,
    test_command: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
struct TriggerBuildArgs {
    command: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DiagnoseErrorArgs {
    error_text: String,
    #[serde(default)]
    auto_repair: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RememberFactArgs {
    category: String,
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    project_scoped: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecallKnowledgeArgs {
    query: String,
    limit: Option<usize>,
}

fn task_detail(snap: &TaskSnapshot) -> String {
    let mut result = format!("Task: {}\nStatus: {}\n", snap.id, snap.status.label());
    if let TaskKind::Command { command } = &snap.kind {
        result.push_str(&format!("Command: {command}\n"));
    }
    result.push_str(&format!("Started: {}\n", snap.started_at));
    if let Some(ended) = &snap.ended_at {
        result.push_str(&format!("Ended: {ended}\n"));
        result.push_str(&format!("Duration: {:.1}s\n", snap.elapsed_secs));
        if !snap.error.is_empty() {
            result.push_str(&format!("Error: {}\n", snap.error));
        }
        if !snap.output.is_empty() {
            result.push_str(&format!("\nOutput:\n{}", snap.output));
        }
    } else {
        result.push_str(&format!("Running for: {:.1}s\n", snap.elapsed_secs));
    }
    result
}

fn agent_detail(snap: &TaskSnapshot) -> String {
    let mut result = format!("Agent: {}\n", snap.id);
    if let TaskKind::Agent { role, task } = &snap.kind {
        result.push_str(&format!("Role: {role}\n"));
        result.push_str(&format!("Status: {}\n", snap.status.label()));
        result.push_str(&format!("Task: {task}\n"));
    }
    if snap.ended_at.is_some() {
        result.push_str(&format!("Duration: {:.1}s\n", snap.elapsed_secs));
        result.push_str(&format!("Tokens: {}\n", snap.tokens_used));
        if !snap.error.is_empty() {
            result.push_str(&format!("Error: {}\n", snap.error));
        }
        if !snap.output.is_empty() {
            result.push_str(&format!("\nResult:\n{}", snap.output));
        }
    } else {
        result.push_str(&format!("Running for: {:.1}s\n", snap.elapsed_secs));
    }
    result
}

fn all_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "run_command",
            "Run a shell command and return its combined output. Short commands only; long-running work belongs in run_background.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Shell command to execute"}
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "run_background",
            "Start a long-running shell command as a background task and return its task id immediately.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Shell command to execute"},
                    "description": {"type": "string", "description": "Short human-readable label for the task"}
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "check_task",
            "Check the status and output of a background task.",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string", "description": "Task id returned by run_background"}
                },
                "required": ["task_id"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "list_tasks",
            "List all background tasks and their statuses.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
        ToolDescriptor::new(
            "kill_task",
            "Kill a running background task.",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string", "description": "Task id to kill"}
                },
                "required": ["task_id"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "spawn_agent",
            "Spawn an autonomous sub-agent to work on a task concurrently. Returns an agent id; use wait_for_agent or get_agent_result to collect its answer.",
            json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string", "description": "Task for the agent to complete"},
                    "role": {"type": "string", "description": "Agent specialty, e.g. researcher, coder, tester"}
                },
                "required": ["task"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "list_agents",
            "List all spawned agents and their statuses.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
        ToolDescriptor::new(
            "get_agent_result",
            "Get the current status and result of an agent.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string", "description": "Agent id returned by spawn_agent"}
                },
                "required": ["agent_id"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "wait_for_agent",
            "Block until an agent finishes, then return its result. Times out without affecting the agent.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string", "description": "Agent id to wait for"},
                    "timeout_seconds": {"type": "integer", "description": "Max seconds to wait (default 120)"}
                },
                "required": ["agent_id"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "cancel_agent",
            "Cancel a running agent.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string", "description": "Agent id to cancel"}
                },
                "required": ["agent_id"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "start_watch",
            "Start watch mode: rebuild periodically, detect errors, and attempt automatic repairs.",
            json!({
                "type": "object",
                "properties": {
                    "patterns": {"type": "array", "items": {"type": "string"}, "description": "File patterns to watch (auto-detected if omitted)"},
                    "build_command": {"type": "string", "description": "Build command (auto-detected if omitted)"},
                    "test_command": {"type": "string", "description": "Test command (auto-detected if omitted)"}
                },
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "stop_watch",
            "Stop watch mode and report session totals.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
        ToolDescriptor::new(
            "watch_status",
            "Show the status of the running watcher: config, recent errors, repair success rate.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
        ToolDescriptor::new(
            "trigger_build",
            "Run the build once now, parse any errors, and attempt repairs.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Build command (auto-detected if omitted)"}
                },
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "diagnose_error",
            "Parse pasted error output, look up known solutions, and optionally attempt an automatic repair.",
            json!({
                "type": "object",
                "properties": {
                    "error_text": {"type": "string", "description": "Error output to diagnose"},
                    "auto_repair": {"type": "boolean", "description": "Attempt repairs for diagnosed errors"}
                },
                "required": ["error_text"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "remember_fact",
            "Remember a fact about the environment (e.g. 'user prefers vim', 'project uses postgres').",
            json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string", "description": "Category: system, preference, pattern, solution"},
                    "subject": {"type": "string", "description": "What this fact is about"},
                    "predicate": {"type": "string", "description": "The relationship or property"},
                    "object": {"type": "string", "description": "The value"},
                    "project_scoped": {"type": "boolean", "description": "If true, scoped to the current project only"}
                },
                "required": ["category", "subject", "predicate", "object"],
                "additionalProperties": false
            }),
        ),
        ToolDescriptor::new(
            "recall_knowledge",
            "Search remembered facts for relevant information about a topic.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "limit": {"type": "integer", "description": "Max results (default 10)"}
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_tools_are_recognized() {
        for name in AGENT_TOOLS {
            assert!(is_agent_tool(name));
        }
        assert!(!is_agent_tool("run_command"));
        assert!(!is_agent_tool("start_watch"));
    }

    #[test]
    fn descriptor_names_are_unique() {
        let descriptors = all_descriptors();
        let mut names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), descriptors.len());
    }

    #[test]
    fn every_agent_tool_has_a_descriptor() {
        let names: Vec<String> = all_descriptors().into_iter().map(|d| d.name).collect();
        for name in AGENT_TOOLS {
            assert!(names.contains(&name.to_string()), "missing descriptor for {name}");
        }
    }

    #[test]
    fn parse_args_rejects_unknown_fields() {
        let err = parse_args::<RunCommandArgs>("run_command", r#"{"command":"ls","extra":1}"#)
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn parse_args_accepts_empty_for_no_arg_tools() {
        assert!(parse_args::<NoArgs>("list_tasks", "").is_ok());
        assert!(parse_args::<NoArgs>("list_tasks", "{}").is_ok());
    }
}
