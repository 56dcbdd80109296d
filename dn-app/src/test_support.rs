//! Fakes shared by the unit tests.

use crate::config::RelayConfig;
use crate::routes;
use crate::server::RelayState;
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Extension, Json, Router};
use dn_llm::{
    ChatMessage, ChatRequest, ChatResponse, ChatTransport, LlmError, Role, ToolCall, Usage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport that replays canned replies and records every request.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn chat(&self, request: &ChatRequest) -> dn_llm::Result<ChatResponse> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Http("no scripted reply left".to_string())))
    }
}

pub fn reply(content: &str) -> ChatResponse {
    response(ChatMessage::assistant(content))
}

pub fn tool_call_reply(tool_calls: Vec<ToolCall>) -> ChatResponse {
    response(ChatMessage {
        role: Role::Assistant,
        content: String::new(),
        tool_calls,
        tool_call_id: None,
    })
}

fn response(message: ChatMessage) -> ChatResponse {
    let raw_message = serde_json::to_value(dn_llm::WireMessage::from(&message))
        .unwrap_or(serde_json::Value::Null);
    ChatResponse {
        message,
        usage: Usage::default(),
        finish_reason: "stop".to_string(),
        raw_message,
    }
}

/// Request seen by [`FakeUpstream`]: bearer header plus JSON body.
pub type SeenRequest = (Option<String>, serde_json::Value);

/// In-process OpenAI-compatible endpoint on an ephemeral port.
pub struct FakeUpstream {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeUpstream {
    pub async fn spawn(status: StatusCode, body: serde_json::Value) -> Self {
        Self::spawn_sequence(vec![(status, body)]).await
    }

    /// Answer the n-th request with the n-th reply; the last one repeats.
    pub async fn spawn_sequence(replies: Vec<(StatusCode, serde_json::Value)>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen: Arc<Mutex<Vec<SeenRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(replies);
        let (hits_c, seen_c) = (hits.clone(), seen.clone());
        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(req): Json<serde_json::Value>| {
                let hits = hits_c.clone();
                let seen = seen_c.clone();
                let replies = replies.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    seen.lock().expect("seen lock").push((auth, req));
                    let (status, body) = replies
                        .get(n)
                        .or(replies.last())
                        .cloned()
                        .expect("at least one scripted reply");
                    (status, Json(body))
                }
            }),
        );
        Self {
            base_url: serve_on_ephemeral_port(app).await,
            hits,
            seen,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

/// The real relay routes, forwarding to `upstream`. Returns the relay base URL.
pub async fn spawn_relay(upstream: &FakeUpstream) -> String {
    let cfg = RelayConfig {
        upstream_base_url: upstream.base_url.clone(),
        ..RelayConfig::default()
    };
    let state = RelayState::new(&cfg).expect("relay state");
    serve_on_ephemeral_port(routes::router().layer(Extension(Arc::new(state)))).await
}

async fn serve_on_ephemeral_port(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}
