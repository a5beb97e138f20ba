//! End-to-end sessions against the real binary: spawn `anki-mcp-server`
//! with stdin/stdout piped, point it at a scripted AnkiConnect mock, and
//! drive it line by line.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use anki_mcp_test_support::{MockAnkiConnect, MockReply};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct StdioSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioSession {
    fn spawn(url: &str) -> anyhow::Result<Self> {
        let bin = env!("CARGO_BIN_EXE_anki-mcp-server");
        let mut child = Command::new(bin)
            .arg("--url")
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("spawn anki-mcp-server")?;
        let stdin = child.stdin.take().context("child stdin not piped")?;
        let stdout = child.stdout.take().context("child stdout not piped")?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().context("stdin already closed")?;
        stdin.write_all(line.as_bytes()).await.context("write line")?;
        stdin.write_all(b"\n").await.context("write newline")?;
        stdin.flush().await.context("flush stdin")?;
        Ok(())
    }

    async fn send(&mut self, message: &Value) -> anyhow::Result<()> {
        self.send_raw(&serde_json::to_string(message)?).await
    }

    async fn recv(&mut self) -> anyhow::Result<Value> {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.stdout.next_line())
            .await
            .context("timed out waiting for a server response")?
            .context("read server stdout")?
            .context("server closed stdout")?;
        serde_json::from_str(&line).with_context(|| format!("response is not JSON: {line}"))
    }

    async fn request(&mut self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;
        self.recv().await
    }

    /// Close stdin and wait for the process to exit on its own.
    async fn shutdown(mut self) -> anyhow::Result<std::process::ExitStatus> {
        drop(self.stdin.take());
        tokio::time::timeout(RECV_TIMEOUT, self.child.wait())
            .await
            .context("server did not exit after stdin closed")?
            .context("wait for server exit")
    }
}

async fn scripted_mock() -> anyhow::Result<MockAnkiConnect> {
    MockAnkiConnect::start(|action, _params| match action {
        "deckNames" => MockReply::Result(json!(["Default"])),
        "modelNames" => MockReply::Result(json!(["Basic", "Cloze"])),
        "addNote" => MockReply::Error("cannot create note because it is a duplicate".into()),
        other => MockReply::Error(format!("unscripted action: {other}")),
    })
    .await
}

#[tokio::test]
async fn initialize_handshake_reports_server_identity() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session
        .request(1, "initialize", json!({"protocolVersion": "2024-11-05"}))
        .await?;
    assert_eq!(response["id"], json!(1));
    let result = &response["result"];
    assert_eq!(result["protocolVersion"], json!("2024-11-05"));
    assert_eq!(result["serverInfo"]["name"], json!("anki-mcp-server"));
    assert!(
        result["capabilities"]["tools"].is_object(),
        "expected a tools capability, got {result}"
    );

    // The initialized notification has no id and must not be answered; the
    // next thing on stdout has to be the tools/list response.
    session
        .send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await?;
    let response = session.request(2, "tools/list", json!({})).await?;
    assert_eq!(response["id"], json!(2));

    let tools = response["result"]["tools"]
        .as_array()
        .context("tools/list result.tools missing")?;
    let mut names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            "add_note",
            "create_deck",
            "delete_notes",
            "get_model_fields",
            "list_decks",
            "list_models",
            "search_notes",
            "sync",
            "update_note",
            "update_note_tags",
        ]
    );
    for tool in tools {
        assert!(
            tool["inputSchema"].is_object(),
            "tool {} has no input schema",
            tool["name"]
        );
    }
    let delete_notes = tools
        .iter()
        .find(|t| t["name"] == "delete_notes")
        .context("delete_notes tool missing")?;
    assert_eq!(delete_notes["annotations"]["destructiveHint"], json!(true));

    Ok(())
}

#[tokio::test]
async fn tools_call_round_trips_deck_listing() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session
        .request(
            1,
            "tools/call",
            json!({"name": "list_decks", "arguments": {}}),
        )
        .await?;

    assert_eq!(response["id"], json!(1));
    let result = &response["result"];
    assert_ne!(result["isError"], json!(true), "unexpected tool error: {result}");
    assert_eq!(result["content"][0]["type"], json!("text"));
    assert_eq!(result["content"][0]["text"], json!("[\"Default\"]"));
    assert_eq!(mock.actions(), vec!["deckNames"]);

    Ok(())
}

#[tokio::test]
async fn remote_failures_become_tool_errors_not_rpc_errors() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session
        .request(
            7,
            "tools/call",
            json!({
                "name": "add_note",
                "arguments": {
                    "deck_name": "Default",
                    "model_name": "Basic",
                    "fields": {"Front": "bonjour", "Back": "hello"},
                },
            }),
        )
        .await?;

    assert_eq!(response["id"], json!(7));
    assert!(
        response.get("error").is_none(),
        "remote failure must not be a protocol error: {response}"
    );
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));
    assert_eq!(
        result["content"][0]["text"],
        json!("AnkiConnect error: cannot create note because it is a duplicate")
    );

    Ok(())
}

#[tokio::test]
async fn protocol_shape_failures_are_rpc_errors() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session
        .request(
            1,
            "tools/call",
            json!({"name": "no_such_tool", "arguments": {}}),
        )
        .await?;
    assert_eq!(response["error"]["code"], json!(-32602));
    assert_eq!(response["error"]["message"], json!("unknown tool: no_such_tool"));

    let response = session
        .request(
            2,
            "tools/call",
            json!({"name": "create_deck", "arguments": {"deck": "Typo"}}),
        )
        .await?;
    assert_eq!(response["error"]["code"], json!(-32602));

    let response = session.request(3, "decks/list", json!({})).await?;
    assert_eq!(response["error"]["code"], json!(-32601));

    session.send_raw("this is not json").await?;
    let response = session.recv().await?;
    assert_eq!(response["error"]["code"], json!(-32700));
    assert_eq!(response["id"], Value::Null);

    // After all of that the session still works.
    let response = session.request(4, "ping", json!({})).await?;
    assert_eq!(response["result"], json!({}));
    assert!(mock.actions().is_empty(), "no call should have reached AnkiConnect");

    Ok(())
}

#[tokio::test]
async fn empty_listings_answer_without_touching_anki() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session.request(1, "resources/list", json!({})).await?;
    assert_eq!(response["result"], json!({"resources": []}));

    let response = session.request(2, "prompts/list", json!({})).await?;
    assert_eq!(response["result"], json!({"prompts": []}));

    assert!(mock.actions().is_empty());
    Ok(())
}

#[tokio::test]
async fn slow_calls_do_not_block_later_ones() -> anyhow::Result<()> {
    let mock = MockAnkiConnect::start(|action, _params| match action {
        "deckNames" => MockReply::Delay(Duration::from_millis(300)),
        "modelNames" => MockReply::Result(json!(["Basic"])),
        other => MockReply::Error(format!("unscripted action: {other}")),
    })
    .await?;
    let mut session = StdioSession::spawn(mock.url())?;

    session
        .send(&json!({
            "jsonrpc": "2.0",
            "id": 10,
            "method": "tools/call",
            "params": {"name": "list_decks", "arguments": {}},
        }))
        .await?;
    session
        .send(&json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "tools/call",
            "params": {"name": "list_models", "arguments": {}},
        }))
        .await?;

    // The fast model listing overtakes the stalled deck listing.
    let first = session.recv().await?;
    assert_eq!(first["id"], json!(11));
    assert_eq!(first["result"]["content"][0]["text"], json!("[\"Basic\"]"));

    let second = session.recv().await?;
    assert_eq!(second["id"], json!(10));

    Ok(())
}

#[tokio::test]
async fn closing_stdin_shuts_the_server_down() -> anyhow::Result<()> {
    let mock = scripted_mock().await?;
    let mut session = StdioSession::spawn(mock.url())?;

    let response = session
        .request(1, "initialize", json!({"protocolVersion": "2024-11-05"}))
        .await?;
    assert_eq!(response["id"], json!(1));

    let status = session.shutdown().await?;
    assert!(status.success(), "expected clean exit, got {status}");
    Ok(())
}
