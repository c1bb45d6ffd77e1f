//! STDIO transport for the task coordination server.
//!
//! Implements JSON-RPC 2.0 over stdin/stdout with the MCP initialize /
//! initialized handshake. Once `Ready`, every request or `tools/call` is
//! routed straight through [`mcp_protocol::Dispatcher`] — this module owns
//! only the framing and the handshake state machine, not task semantics.

use anyhow::{Context, Result};
use mcp_protocol::{Dispatcher, McpError};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// MCP protocol state tracking.
#[derive(Debug, PartialEq)]
enum McpState {
    /// Waiting for initialize request from client
    WaitingForInitialize,
    /// Initialize request received, sent response, waiting for initialized notification
    WaitingForInitialized,
    /// Fully initialized and ready to process requests
    Ready,
}

/// STDIO MCP server with protocol state management, wired to a [`Dispatcher`].
pub struct StdioMcpServer {
    dispatcher: Dispatcher,
    state: McpState,
}

impl StdioMcpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher, state: McpState::WaitingForInitialize }
    }

    /// Run the read-dispatch-write loop until stdin closes.
    pub async fn serve(mut self) -> Result<()> {
        info!("starting stdio server, waiting for initialize request");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    debug!("received line: {}", trimmed);

                    match self.process_message(trimmed).await {
                        Ok(Some(response)) => {
                            write_line(&mut stdout, &response).await?;
                        }
                        Ok(None) => {
                            debug!("processed notification, no response needed");
                        }
                        Err(e) => {
                            error!("error processing message: {}", e);
                            let id = extract_id_from_line(trimmed);
                            let error_response = create_error_response(e, id);
                            if let Err(write_err) = write_line(&mut stdout, &error_response).await {
                                error!("failed to write error response: {}", write_err);
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("error reading from stdin: {}", e);
                    break;
                }
            }
        }

        info!("stdio server shutdown complete");
        Ok(())
    }

    /// Process a single line: request or notification.
    async fn process_message(&mut self, line: &str) -> Result<Option<Value>> {
        let message: Value =
            serde_json::from_str(line).context("failed to parse JSON-RPC message")?;

        if message.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
            return Err(anyhow::anyhow!("invalid JSON-RPC version"));
        }

        let method = message
            .get("method")
            .and_then(|v| v.as_str())
            .context("missing or invalid 'method' field")?;

        let id = message.get("id").cloned();
        let params = message.get("params").unwrap_or(&Value::Null).clone();
        let is_notification = id.is_none();

        match (&self.state, method) {
            (McpState::WaitingForInitialize, "initialize") => {
                if is_notification {
                    return Err(anyhow::anyhow!(
                        "initialize must be a request, not a notification"
                    ));
                }

                info!("received initialize request");
                self.state = McpState::WaitingForInitialized;

                Ok(Some(json!({
                    "jsonrpc": "2.0",
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {
                            "tools": { "listChanged": true }
                        },
                        "serverInfo": {
                            "name": "task-coordinator",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    },
                    "id": id
                })))
            }

            (McpState::WaitingForInitialized, "notifications/initialized") => {
                if !is_notification {
                    return Err(anyhow::anyhow!(
                        "initialized must be a notification, not a request"
                    ));
                }

                info!("received initialized notification, server is ready");
                self.state = McpState::Ready;
                Ok(None)
            }

            (McpState::Ready, _) => {
                if is_notification {
                    match method {
                        "notifications/cancelled" => {
                            debug!("received cancelled notification");
                            Ok(None)
                        }
                        _ => {
                            warn!("unknown notification method: {}", method);
                            Ok(None)
                        }
                    }
                } else {
                    match self.execute(method, params).await {
                        Ok(result) => Ok(Some(json!({
                            "jsonrpc": "2.0",
                            "result": result,
                            "id": id
                        }))),
                        Err(mcp_error) => Ok(Some(mcp_error.to_json_rpc_error(id))),
                    }
                }
            }

            _ => Err(anyhow::anyhow!(
                "invalid method '{}' for current state {:?}",
                method,
                self.state
            )),
        }
    }

    /// Route a request once the handshake is complete: `tools/list`,
    /// `tools/call`, and direct method calls all end up at the dispatcher.
    async fn execute(&self, method: &str, params: Value) -> Result<Value, McpError> {
        match method {
            "tools/list" => Ok(tools_list()),
            "tools/call" => {
                let tool_name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| McpError::Protocol("missing tool name in tools/call".into()))?;
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                self.dispatcher.dispatch(tool_name, arguments).await
            }
            _ => self.dispatcher.dispatch(method, params).await,
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &Value) -> Result<()> {
    let text = serde_json::to_string(value).context("failed to serialize JSON-RPC message")?;
    stdout
        .write_all(text.as_bytes())
        .await
        .context("failed to write to stdout")?;
    stdout.write_all(b"\n").await.context("failed to write newline to stdout")?;
    stdout.flush().await.context("failed to flush stdout")?;
    debug!("sent: {}", text);
    Ok(())
}

fn extract_id_from_line(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line).ok().and_then(|v| v.get("id").cloned())
}

fn create_error_response(error: anyhow::Error, id: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": -32603, "message": error.to_string() },
        "id": id,
    })
}

/// Tool listing surfaced over `tools/list`, one entry per method the
/// dispatcher accepts. Kept in sync with `mcp_protocol::dispatcher::Dispatcher::dispatch`.
fn tools_list() -> Value {
    json!({
        "tools": [
            tool("health_check", "Check server and database health", json!({"type": "object"})),
            tool("create_task", "Create a new task, optionally linked to a parent", json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "task_type": {"type": "string", "enum": ["concrete", "abstract", "epic"]},
                    "task_instruction": {"type": "string"},
                    "verification_instruction": {"type": "string"},
                    "agent_id": {"type": "string"},
                    "project_id": {"type": "integer"},
                    "parent_task_id": {"type": "integer"},
                    "relationship_type": {"type": "string"},
                    "priority": {"type": "string"},
                    "notes": {"type": "string"},
                    "estimated_hours": {"type": "number"},
                    "due_date": {"type": "string"}
                },
                "required": ["title", "task_type", "task_instruction", "verification_instruction", "agent_id"]
            })),
            tool("reserve_task", "Atomically claim an available task for an agent", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "agent_id": {"type": "string"}},
                "required": ["task_id", "agent_id"]
            })),
            tool("complete_task", "Mark a reserved task complete, optionally spawning a followup", json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "integer"},
                    "agent_id": {"type": "string"},
                    "notes": {"type": "string"},
                    "actual_hours": {"type": "number"},
                    "followup": {"type": "object"}
                },
                "required": ["task_id", "agent_id"]
            })),
            tool("verify_task", "Mark a completed task's verification as passed", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "agent_id": {"type": "string"}},
                "required": ["task_id", "agent_id"]
            })),
            tool("unlock_task", "Release a reserved task back to the available pool", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "agent_id": {"type": "string"}},
                "required": ["task_id", "agent_id"]
            })),
            tool("bulk_unlock_tasks", "Release a batch of tasks atomically", json!({
                "type": "object",
                "properties": {
                    "task_ids": {"type": "array", "items": {"type": "integer"}},
                    "agent_id": {"type": "string"}
                },
                "required": ["task_ids", "agent_id"]
            })),
            tool("cancel_task", "Cancel a task, moving it to the terminal cancelled status", json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "integer"},
                    "agent_id": {"type": "string"},
                    "reason": {"type": "string"}
                },
                "required": ["task_id", "agent_id"]
            })),
            tool("add_task_update", "Append a progress or finding update to a task", json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "integer"},
                    "agent_id": {"type": "string"},
                    "update_type": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["task_id", "agent_id", "update_type", "content"]
            })),
            tool("get_task", "Fetch a task by id", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("list_available_tasks", "List unblocked, unassigned tasks an agent can reserve", json!({"type": "object"})),
            tool("query_tasks", "Filter tasks by status, type, agent, priority, or tag", json!({"type": "object"})),
            tool("query_stale_tasks", "List tasks reserved longer than a given window", json!({"type": "object"})),
            tool("get_task_statistics", "Aggregate counts by status, type, and project", json!({"type": "object"})),
            tool("get_recent_completions", "List recently completed tasks", json!({"type": "object"})),
            tool("get_task_summary", "Lightweight task listing for dashboards", json!({"type": "object"})),
            tool("search_tasks", "Case-insensitive substring search over task titles", json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["query"]
            })),
            tool("get_tasks_approaching_deadline", "List tasks due within N days", json!({"type": "object"})),
            tool("get_task_context", "Fetch a task with its updates and relationships", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("get_agent_performance", "Completion stats for one agent", json!({
                "type": "object",
                "properties": {"agent_id": {"type": "string"}},
                "required": ["agent_id"]
            })),
            tool("get_activity_feed", "Chronological feed of changes and updates", json!({"type": "object"})),
            tool("create_tag", "Create or fetch a tag by name", json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            })),
            tool("list_tags", "List all known tags", json!({"type": "object"})),
            tool("assign_task_tag", "Attach a tag to a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "tag_name": {"type": "string"}},
                "required": ["task_id", "tag_name"]
            })),
            tool("remove_task_tag", "Detach a tag from a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "tag_id": {"type": "integer"}},
                "required": ["task_id", "tag_id"]
            })),
            tool("get_task_tags", "List tags on a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("create_comment", "Post a comment on a task", json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "integer"},
                    "agent_id": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["task_id", "agent_id", "content"]
            })),
            tool("get_comment", "Fetch a comment by id", json!({
                "type": "object",
                "properties": {"comment_id": {"type": "integer"}},
                "required": ["comment_id"]
            })),
            tool("update_comment", "Edit a comment's content", json!({
                "type": "object",
                "properties": {
                    "comment_id": {"type": "integer"},
                    "agent_id": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["comment_id", "agent_id", "content"]
            })),
            tool("delete_comment", "Delete a comment", json!({
                "type": "object",
                "properties": {"comment_id": {"type": "integer"}, "agent_id": {"type": "string"}},
                "required": ["comment_id", "agent_id"]
            })),
            tool("list_comments", "List comments on a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("get_task_versions", "List a task's change-log versions", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("get_task_version", "Fetch one version of a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "version_number": {"type": "integer"}},
                "required": ["task_id", "version_number"]
            })),
            tool("get_latest_task_version", "Fetch the most recent version of a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("diff_task_versions", "Diff two versions of a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "v1": {"type": "integer"}, "v2": {"type": "integer"}},
                "required": ["task_id", "v1", "v2"]
            })),
            tool("link_github_issue", "Associate a GitHub issue URL with a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "agent_id": {"type": "string"}, "url": {"type": "string"}},
                "required": ["task_id", "agent_id", "url"]
            })),
            tool("link_github_pr", "Associate a GitHub pull request URL with a task", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}, "agent_id": {"type": "string"}, "url": {"type": "string"}},
                "required": ["task_id", "agent_id", "url"]
            })),
            tool("get_github_links", "Fetch a task's linked GitHub URLs", json!({
                "type": "object",
                "properties": {"task_id": {"type": "integer"}},
                "required": ["task_id"]
            })),
            tool("create_project", "Create a new project", json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            })),
            tool("get_project", "Fetch a project by id", json!({
                "type": "object",
                "properties": {"project_id": {"type": "integer"}},
                "required": ["project_id"]
            })),
            tool("list_projects", "List all projects", json!({"type": "object"}))
        ]
    })
}

fn tool(name: &str, description: &str, input_schema: Value) -> Value {
    json!({ "name": name, "description": description, "inputSchema": input_schema })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocks::InMemoryStore;
    use std::sync::Arc;
    use task_core::events::NullEventPublisher;
    use task_core::lifecycle::LifecycleEngine;
    use task_core::query::QueryEngine;
    use task_core::store::Store;

    fn fixture() -> StdioMcpServer {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), Arc::new(NullEventPublisher), 3));
        let query = Arc::new(QueryEngine::new(store.clone()));
        StdioMcpServer::new(Dispatcher::new(lifecycle, query, store))
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let mut server = fixture();
        let result = server
            .process_message(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn full_handshake_then_health_check() {
        let mut server = fixture();

        let init = server
            .process_message(r#"{"jsonrpc":"2.0","method":"initialize","params":{},"id":1}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(init["result"]["serverInfo"]["name"], "task-coordinator");
        assert_eq!(server.state, McpState::WaitingForInitialized);

        let notified = server
            .process_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(notified.is_none());
        assert_eq!(server.state, McpState::Ready);

        let response = server
            .process_message(r#"{"jsonrpc":"2.0","method":"health_check","params":{},"id":2}"#)
            .await
            .unwrap()
            .unwrap();
        assert!(response["result"]["database"].as_bool().unwrap_or(false));
    }

    #[tokio::test]
    async fn tools_call_routes_to_the_dispatcher() {
        let mut server = fixture();
        server
            .process_message(r#"{"jsonrpc":"2.0","method":"initialize","params":{},"id":1}"#)
            .await
            .unwrap();
        server
            .process_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();

        let call = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": 2,
            "params": {
                "name": "create_task",
                "arguments": {
                    "title": "Stdio Test",
                    "task_type": "concrete",
                    "task_instruction": "do it",
                    "verification_instruction": "check it",
                    "agent_id": "agent-a",
                }
            }
        });
        let response = server.process_message(&call.to_string()).await.unwrap().unwrap();
        assert!(response["result"]["task"]["id"].is_i64());
    }

    #[tokio::test]
    async fn unknown_field_in_initialize_request_is_not_a_notification() {
        let mut server = fixture();
        let err = server
            .process_message(r#"{"jsonrpc":"2.0","method":"initialize","params":{}}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("request"));
    }
}
