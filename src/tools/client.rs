//! Process-Backed Tool Client
//!
//! Starts an external tool-serving process, frames line-delimited JSON-RPC
//! over its standard streams, and correlates asynchronous responses back to
//! their callers through a pending-request table. Any number of callers may
//! have requests outstanding at once; each response resolves exactly the
//! caller that sent its id.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::framing::LineAssembler;
use super::process::{ProcessState, ProcessStatus, ToolProcess};
use super::protocol::{
    RpcRequest, ToolDescriptor, ToolListing, METHOD_CALL_TOOL, METHOD_LIST_TOOLS,
};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn tool process: {0}")]
    Spawn(String),
    #[error("tool process is not running")]
    NotRunning,
    #[error("tool process returned no usable tool listing")]
    Discovery,
    #[error("response channel closed before a result arrived")]
    ChannelClosed,
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outstanding requests, keyed by id. Each entry is removed the moment its
/// matching response is consumed, so a request resolves at most once.
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Value>>>;

/// Client for one external tool-serving process.
///
/// Owns the process handle, the pending-request table, and the request-id
/// counter. Construct one per tool server and pass it to whoever needs
/// tool access; there is no global instance.
pub struct ToolClient {
    process: Arc<Mutex<ToolProcess>>,
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
}

impl ToolClient {
    pub fn new() -> Self {
        Self {
            process: Arc::new(Mutex::new(ToolProcess::new())),
            stdin: Arc::new(tokio::sync::Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn the tool process and wire up its output stream.
    ///
    /// The client is `Running` as soon as the spawn succeeds; no handshake
    /// is awaited. Calling `start` while already running is a no-op.
    pub async fn start(
        &self,
        executable: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<(), ToolError> {
        let spawned = {
            let mut process = self.process.lock();
            process
                .spawn(executable, args, working_dir)
                .map_err(|e| ToolError::Spawn(format!("{}: {}", executable, e)))?
        };

        let io = match spawned {
            Some(io) => io,
            None => return Ok(()), // already running
        };

        *self.stdin.lock().await = Some(io.stdin);

        let pending = Arc::clone(&self.pending);
        let process = Arc::clone(&self.process);
        tokio::spawn(read_loop(io.stdout, io.generation, pending, process));

        Ok(())
    }

    /// Send one framed request and await its correlated response.
    ///
    /// Fails synchronously (registering nothing) if the process is not
    /// running; a write failure fails only this call and clears its
    /// pending entry. A response that never arrives leaves the caller
    /// suspended — bounded-latency callers layer their own timeout on top.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        if !self.process.lock().is_running() {
            return Err(ToolError::NotRunning);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut frame = serde_json::to_string(&RpcRequest::new(id, method, params))?;
        frame.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        {
            let mut stdin = self.stdin.lock().await;
            let writer = match stdin.as_mut() {
                Some(w) => w,
                None => {
                    self.pending.lock().remove(&id);
                    return Err(ToolError::NotRunning);
                }
            };

            debug!(id = id, method = %method, "Sending tool request");
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                self.pending.lock().remove(&id);
                return Err(ToolError::Io(e));
            }
            if let Err(e) = writer.flush().await {
                self.pending.lock().remove(&id);
                return Err(ToolError::Io(e));
            }
        }

        rx.await.map_err(|_| ToolError::ChannelClosed)
    }

    /// Discover the tools the server process exposes.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let result = self.send_request(METHOD_LIST_TOOLS, json!({})).await?;
        let listing: ToolListing =
            serde_json::from_value(result).map_err(|_| ToolError::Discovery)?;
        info!(count = listing.tools.len(), "Listed tools");
        Ok(listing.tools)
    }

    /// Invoke a tool by name. The result payload is passed through
    /// uninterpreted.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        debug!(tool = %name, "Invoking tool");
        self.send_request(
            METHOD_CALL_TOOL,
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    /// Terminate the process and discard the handle. Idempotent.
    ///
    /// Pending requests are left untouched: their ids belong to a process
    /// that no longer exists and can never be resolved by a later one.
    pub async fn stop(&self) {
        self.stdin.lock().await.take();

        let child = { self.process.lock().begin_stop() };
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Tool process already exited");
            }
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => info!(status = %status, "Tool process stopped"),
                    Err(e) => warn!(error = %e, "Failed to reap stopped tool process"),
                }
            });
        }
    }

    pub fn state(&self) -> ProcessState {
        self.process.lock().state()
    }

    pub fn status(&self) -> ProcessStatus {
        self.process.lock().status()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for ToolClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain the process's stdout: reassemble lines, dispatch each against the
/// pending table. EOF while the process is still supposed to be running
/// means it died underneath us.
async fn read_loop(
    mut stdout: ChildStdout,
    generation: u64,
    pending: Arc<PendingMap>,
    process: Arc<Mutex<ToolProcess>>,
) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 4096];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match assembler.push(&buf[..n]) {
                Ok(lines) => {
                    for line in lines {
                        dispatch_line(&pending, &line);
                    }
                }
                Err(e) => warn!(error = %e, "Discarded oversized tool output"),
            },
            Err(e) => {
                warn!(error = %e, "Tool process stdout read failed");
                break;
            }
        }
    }

    let child = { process.lock().mark_crashed(generation) };
    if let Some(mut child) = child {
        let outstanding = pending.lock().len();
        match child.wait().await {
            Ok(status) => {
                error!(status = %status, pending = outstanding, "Tool process exited unexpectedly");
            }
            Err(e) => error!(error = %e, "Failed to reap crashed tool process"),
        }
    }
}

/// Parse one output line and resolve the pending request it answers.
///
/// Lines that are not JSON, carry no numeric id, or match no pending entry
/// are dropped without affecting anything else — the process's own
/// diagnostics share this channel.
fn dispatch_line(pending: &PendingMap, line: &str) {
    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            debug!("Discarded unparseable tool output line");
            return;
        }
    };

    let id = match message.get("id").and_then(Value::as_u64) {
        Some(id) => id,
        None => {
            debug!("Discarded tool message without a numeric id");
            return;
        }
    };

    let tx = match pending.lock().remove(&id) {
        Some(tx) => tx,
        None => {
            debug!(id = id, "Discarded response with no pending request");
            return;
        }
    };

    let result = message.get("result").cloned().unwrap_or(Value::Null);
    if tx.send(result).is_err() {
        debug!(id = id, "Caller gone before its response arrived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with(ids: &[u64]) -> (Arc<PendingMap>, Vec<oneshot::Receiver<Value>>) {
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let mut receivers = Vec::new();
        for &id in ids {
            let (tx, rx) = oneshot::channel();
            pending.lock().insert(id, tx);
            receivers.push(rx);
        }
        (pending, receivers)
    }

    #[tokio::test]
    async fn test_out_of_order_responses_resolve_own_callers() {
        let (pending, mut receivers) = pending_with(&[1, 2]);
        let rx2 = receivers.pop().unwrap();
        let rx1 = receivers.pop().unwrap();

        // Response for id 2 arrives before the response for id 1.
        dispatch_line(&pending, r#"{"jsonrpc":"2.0","id":2,"result":{"tool":"beta"}}"#);
        dispatch_line(&pending, r#"{"jsonrpc":"2.0","id":1,"result":{"tool":"alpha"}}"#);

        assert_eq!(rx1.await.unwrap()["tool"], "alpha");
        assert_eq!(rx2.await.unwrap()["tool"], "beta");
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_lines_leave_pending_intact() {
        let (pending, mut receivers) = pending_with(&[5]);

        dispatch_line(&pending, "starting tool server on port 9999");
        dispatch_line(&pending, "{not json");
        dispatch_line(&pending, r#"{"no_id": true}"#);
        dispatch_line(&pending, r#"{"id": "five", "result": 1}"#);
        assert_eq!(pending.lock().len(), 1);

        dispatch_line(&pending, r#"{"id":5,"result":"ok"}"#);
        assert_eq!(receivers.pop().unwrap().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_unmatched_id_is_ignored() {
        let (pending, _receivers) = pending_with(&[3]);
        dispatch_line(&pending, r#"{"id":99,"result":"stray"}"#);
        assert_eq!(pending.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_response_resolves_at_most_once() {
        let (pending, mut receivers) = pending_with(&[7]);
        dispatch_line(&pending, r#"{"id":7,"result":"first"}"#);
        dispatch_line(&pending, r#"{"id":7,"result":"second"}"#);
        assert_eq!(receivers.pop().unwrap().await.unwrap(), "first");
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_result_resolves_to_null() {
        let (pending, mut receivers) = pending_with(&[4]);
        dispatch_line(&pending, r#"{"id":4}"#);
        assert_eq!(receivers.pop().unwrap().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_send_request_requires_running_process() {
        let client = ToolClient::new();
        let err = client.send_request("tools/list", json!({})).await;
        assert!(matches!(err, Err(ToolError::NotRunning)));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let client = ToolClient::new();
        client.stop().await;
        client.stop().await;
        assert_eq!(client.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_error() {
        let client = ToolClient::new();
        let err = client
            .start("/nonexistent/tool-server-binary", &[], None)
            .await;
        assert!(matches!(err, Err(ToolError::Spawn(_))));
        assert_eq!(client.state(), ProcessState::NotStarted);
    }
}
