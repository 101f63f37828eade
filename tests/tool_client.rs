//! End-to-end tool client tests against a shell-scripted line-RPC server.
//!
//! The stand-in server reads newline-delimited JSON requests on stdin and
//! answers on stdout, which is all the client requires of a real tool
//! process.

#![cfg(unix)]

use serde_json::json;

use colloquy_lib::tools::{ProcessState, ToolClient, ToolError};

/// Responds to every request in arrival order: `tools/list` gets a small
/// listing, everything else an acknowledgement.
const ECHO_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *tools/list*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"echoes input"},{"name":"sum","inputSchema":{"type":"object"}}]}}\n' "$id"
      ;;
    *)
      name=$(printf '%s' "$line" | sed -n 's/.*"name":"\([a-z]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tool":"%s"}}\n' "$id" "$name"
      ;;
  esac
done
"#;

/// Buffers the first two requests and answers them in reverse order.
const REVERSED_SERVER: &str = r#"
IFS= read -r first
IFS= read -r second
reply() {
  id=$(printf '%s' "$1" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  name=$(printf '%s' "$1" | sed -n 's/.*"name":"\([a-z]*\)".*/\1/p')
  printf '{"jsonrpc":"2.0","id":%s,"result":{"tool":"%s"}}\n' "$id" "$name"
}
reply "$second"
reply "$first"
cat > /dev/null
"#;

/// Interleaves diagnostics and a partial-looking line with a real reply.
const NOISY_SERVER: &str = r#"
printf 'tool server booting\n'
printf '{"not":"a response"}\n'
printf '{broken json\n'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  printf 'handling request %s\n' "$id"
  printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"only"}]}}\n' "$id"
done
"#;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn test_list_tools_round_trip() {
    let client = ToolClient::new();
    client.start("sh", &sh(ECHO_SERVER), None).await.unwrap();
    assert_eq!(client.state(), ProcessState::Running);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].name, "echo");
    assert_eq!(tools[0].description.as_deref(), Some("echoes input"));
    assert!(tools[1].input_schema.is_some());

    client.stop().await;
    assert_eq!(client.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_concurrent_invocations_resolve_out_of_order() {
    let client = ToolClient::new();
    client
        .start("sh", &sh(REVERSED_SERVER), None)
        .await
        .unwrap();

    // Both requests go out before either response; the server answers the
    // second one first.
    let (alpha, beta) = tokio::join!(
        client.invoke_tool("alpha", json!({})),
        client.invoke_tool("beta", json!({}))
    );

    assert_eq!(alpha.unwrap()["tool"], "alpha");
    assert_eq!(beta.unwrap()["tool"], "beta");
    assert_eq!(client.pending_count(), 0);

    client.stop().await;
}

#[tokio::test]
async fn test_diagnostic_lines_are_tolerated() {
    let client = ToolClient::new();
    client.start("sh", &sh(NOISY_SERVER), None).await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "only");

    client.stop().await;
}

#[tokio::test]
async fn test_restart_gets_fresh_ids_and_working_discovery() {
    let client = ToolClient::new();
    client.start("sh", &sh(ECHO_SERVER), None).await.unwrap();
    assert!(!client.list_tools().await.unwrap().is_empty());

    client.stop().await;
    let err = client.invoke_tool("echo", json!({})).await;
    assert!(matches!(err, Err(ToolError::NotRunning)));

    client.start("sh", &sh(ECHO_SERVER), None).await.unwrap();
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);

    client.stop().await;
}

#[tokio::test]
async fn test_discovery_error_on_unusable_listing() {
    // Server answers tools/list with a result that is not a listing.
    const BAD_LISTING: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  printf '{"jsonrpc":"2.0","id":%s,"result":null}\n' "$id"
done
"#;

    let client = ToolClient::new();
    client.start("sh", &sh(BAD_LISTING), None).await.unwrap();

    let err = client.list_tools().await;
    assert!(matches!(err, Err(ToolError::Discovery)));

    client.stop().await;
}

#[tokio::test]
async fn test_crash_is_observed() {
    // A server that exits immediately: the client must notice and report
    // Crashed rather than Running.
    let client = ToolClient::new();
    client.start("sh", &sh("exit 3"), None).await.unwrap();

    for _ in 0..100 {
        if client.state() == ProcessState::Crashed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(client.state(), ProcessState::Crashed);

    let err = client.invoke_tool("echo", json!({})).await;
    assert!(matches!(err, Err(ToolError::NotRunning)));
}

#[tokio::test]
async fn test_start_while_running_is_noop() {
    let client = ToolClient::new();
    client.start("sh", &sh(ECHO_SERVER), None).await.unwrap();
    client.start("sh", &sh(ECHO_SERVER), None).await.unwrap();
    assert_eq!(client.state(), ProcessState::Running);

    // Still exactly one working server behind the client.
    assert_eq!(client.list_tools().await.unwrap().len(), 2);
    client.stop().await;
}
