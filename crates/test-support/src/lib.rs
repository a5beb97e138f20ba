//! Test helpers shared across the workspace, chiefly an in-process mock
//! AnkiConnect endpoint with request recording.

use anyhow::Context as _;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Scripted reply for one action.
pub enum MockReply {
    /// 200 with `{"result": <value>, "error": null}`.
    Result(Value),
    /// 200 with `{"result": null, "error": <message>}`.
    Error(String),
    /// Empty body with the given HTTP status.
    Status(u16),
    /// Sleep, then answer a null result. For timeout tests.
    Delay(Duration),
    /// 200 with the given body verbatim. For odd-envelope tests.
    Raw(Value),
}

type Responder = dyn Fn(&str, &Value) -> MockReply + Send + Sync;

#[derive(Clone)]
struct MockState {
    respond: Arc<Responder>,
    requests: Arc<Mutex<Vec<Value>>>,
}

/// In-process stand-in for the AnkiConnect endpoint.
///
/// Records every request body and answers according to the responder passed
/// to [`MockAnkiConnect::start`]. The server task is aborted on drop.
pub struct MockAnkiConnect {
    url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    server: JoinHandle<()>,
}

impl MockAnkiConnect {
    /// Bind an ephemeral localhost port and serve the responder on it.
    ///
    /// The responder sees `(action, params)` where `params` is `Null` when
    /// the request omitted them.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the ephemeral port fails.
    pub async fn start<F>(respond: F) -> anyhow::Result<Self>
    where
        F: Fn(&str, &Value) -> MockReply + Send + Sync + 'static,
    {
        let state = MockState {
            respond: Arc::new(respond),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = Arc::clone(&state.requests);

        let app = Router::new().route("/", post(handle)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind ephemeral port")?;
        let addr = listener.local_addr().context("local_addr")?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url: format!("http://{addr}"),
            requests,
            server,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw request bodies in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Actions in arrival order, for asserting call sequences.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl Drop for MockAnkiConnect {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let action = body["action"].as_str().unwrap_or_default().to_string();
    let params = body.get("params").cloned().unwrap_or(Value::Null);
    state.requests.lock().expect("requests lock").push(body);

    match (state.respond)(&action, &params) {
        MockReply::Result(v) => Json(json!({"result": v, "error": null})).into_response(),
        MockReply::Error(message) => {
            Json(json!({"result": null, "error": message})).into_response()
        }
        MockReply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, String::new()).into_response()
        }
        MockReply::Delay(wait) => {
            tokio::time::sleep(wait).await;
            Json(json!({"result": null, "error": null})).into_response()
        }
        MockReply::Raw(v) => Json(v).into_response(),
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; another process can still bind it
/// first. Good enough for pointing a client at a port nothing listens on.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the
/// bound socket's local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}
