//! Stdio tool-server session adapter
//!
//! Spawns the graph tool server (e.g. `mcp-neo4j-cypher`) as a child process
//! and speaks line-delimited JSON-RPC 2.0 over its stdin/stdout. Queries go
//! through the server's read and write tools; each tool answers with the
//! result rows as text-encoded JSON.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session_trait::*;
use crate::error::{AssistantError, AssistantResult};
use crate::target::DatastoreTarget;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone)]
pub struct StdioToolOptions {
    pub read_tool: String,
    pub write_tool: String,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for StdioToolOptions {
    fn default() -> Self {
        Self {
            read_tool: "read_neo4j_cypher".to_string(),
            write_tool: "write_neo4j_cypher".to_string(),
            connect_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
        }
    }
}

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct StdioToolSession {
    target: DatastoreTarget,
    options: StdioToolOptions,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: PendingCalls,
    next_id: AtomicU64,
    io_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioToolSession {
    /// Spawns the tool server and performs the initialize handshake.
    pub async fn spawn(config: &TargetConfig, options: StdioToolOptions) -> anyhow::Result<Self> {
        info!("Starting graph tool server for {} target", config.target);
        info!("  Command: {} {}", config.command, config.args.join(" "));
        info!("  URI: {}", config.uri);

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .env("NEO4J_URI", &config.uri)
            .env("NEO4J_USERNAME", &config.username)
            .env("NEO4J_PASSWORD", &config.password)
            .envs(&config.extra_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(database) = &config.database {
            cmd.env("NEO4J_DATABASE", database);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn {}: {}", config.command, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("tool server stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("tool server stdout was not captured"))?;
        let stderr = child.stderr.take();

        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let mut io_tasks = vec![Self::spawn_reader(config.target, stdout, pending.clone())];
        if let Some(stderr) = stderr {
            let target = config.target;
            io_tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "graph_tool_server", "[{}] {}", target, line);
                }
            }));
        }

        let session = Self {
            target: config.target,
            options,
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            next_id: AtomicU64::new(1),
            io_tasks: Mutex::new(io_tasks),
        };

        if let Err(e) = session.handshake().await {
            let _ = session.close().await;
            return Err(e);
        }

        info!("✅ Graph tool server ready for {} target", config.target);
        Ok(session)
    }

    fn spawn_reader(
        target: DatastoreTarget,
        stdout: tokio::process::ChildStdout,
        pending: PendingCalls,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let message: Value = match serde_json::from_str(line) {
                    Ok(v) => v,
                    Err(_) => {
                        debug!("[{}] ignoring non-JSON output: {}", target, line);
                        continue;
                    }
                };
                match message.get("id").and_then(Value::as_u64) {
                    Some(id) => {
                        let waiter = pending.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(message);
                            }
                            None => debug!("[{}] response for unknown call id {}", target, id),
                        }
                    }
                    None => debug!("[{}] notification: {}", target, line),
                }
            }
            // Dropping the senders wakes every outstanding caller with an error.
            pending.lock().unwrap_or_else(|p| p.into_inner()).clear();
            debug!("[{}] tool server output closed", target);
        })
    }

    async fn handshake(&self) -> anyhow::Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let result = self
            .request("initialize", params, self.options.connect_timeout)
            .await
            .map_err(|e| anyhow::anyhow!("initialize handshake failed: {}", e))?;
        if let Some(server) = result.get("serverInfo") {
            debug!("[{}] connected to {}", self.target, server);
        }
        self.send_line(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await
            .map_err(|e| anyhow::anyhow!("initialized notification failed: {}", e))?;
        Ok(())
    }

    async fn send_line(&self, message: &Value) -> AssistantResult<()> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| AssistantError::Protocol(format!("cannot encode request: {}", e)))?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| AssistantError::Backend("tool server session is closed".to_string()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AssistantError::Backend(format!("write to tool server failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| AssistantError::Backend(format!("flush to tool server failed: {}", e)))
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> AssistantResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(|p| p.into_inner()).insert(id, tx);

        let message = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(e) = self.send_line(&message).await {
            self.pending.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(AssistantError::Backend(
                    "tool server exited before answering".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
                return Err(AssistantError::Backend(format!(
                    "{} timed out after {}s",
                    method,
                    timeout.as_secs()
                )));
            }
        };

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(AssistantError::Backend(message));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| AssistantError::Protocol(format!("response {} has no result", id)))
    }

    async fn call_tool(&self, tool: &str, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        debug!("[{}] {} ← {}", self.target, tool, query);
        let result = self
            .request(
                "tools/call",
                json!({ "name": tool, "arguments": { "query": query, "params": params } }),
                self.options.call_timeout,
            )
            .await?;

        let (is_error, text) = tool_result_text(&result)?;
        if is_error {
            return Err(AssistantError::Backend(text));
        }
        decode_rows(&text)
    }
}

/// Extracts `(isError, concatenated text content)` from a `tools/call` result.
pub(crate) fn tool_result_text(result: &Value) -> AssistantResult<(bool, String)> {
    let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let content = result
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| AssistantError::Protocol("tool result has no content array".to_string()))?;

    let text = content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    Ok((is_error, text))
}

#[async_trait]
impl GraphSession for StdioToolSession {
    fn target(&self) -> DatastoreTarget {
        self.target
    }

    async fn read(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.call_tool(&self.options.read_tool, query, params).await
    }

    async fn write(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.call_tool(&self.options.write_tool, query, params).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        // Closing stdin asks the server to exit on its own.
        drop(self.stdin.lock().await.take());

        if let Some(mut child) = self.child.lock().await.take() {
            info!("Shutting down graph tool server for {} target", self.target);
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => debug!("[{}] tool server exited: {}", self.target, status),
                _ => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill tool server for {} target: {}", self.target, e);
                    }
                }
            }
        }

        for task in self.io_tasks.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            task.abort();
        }
        Ok(())
    }
}

/// Factory that spawns one [`StdioToolSession`] per connect.
pub struct StdioSessionFactory {
    options: StdioToolOptions,
}

impl StdioSessionFactory {
    pub fn new(options: StdioToolOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for StdioSessionFactory {
    async fn connect(&self, config: &TargetConfig) -> anyhow::Result<Arc<dyn GraphSession>> {
        let session = StdioToolSession::spawn(config, self.options.clone()).await?;
        Ok(Arc::new(session))
    }
}
