use crate::error::{LlmError, Result};
use crate::openai::{WireMessage, WireTool, parse_wire_message};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Usage};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat` on the DeepNovel relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

impl From<&ChatRequest> for RelayChatRequest {
    fn from(r: &ChatRequest) -> Self {
        Self {
            messages: r.messages.iter().map(WireMessage::from).collect(),
            temperature: r.temperature,
            response_format: r.response_format,
            tools: r.tools.iter().map(WireTool::from).collect(),
        }
    }
}

impl From<RelayChatRequest> for ChatRequest {
    fn from(r: RelayChatRequest) -> Self {
        Self {
            messages: r.messages.into_iter().map(ChatMessage::from).collect(),
            temperature: r.temperature,
            response_format: r.response_format,
            tools: r.tools.into_iter().map(Into::into).collect(),
        }
    }
}

/// Client for a DeepNovel relay. The credential travels per request as a
/// bearer token; the relay keeps nothing.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    credential: String,
    url: String,
}

impl RelayClient {
    pub fn new(http: reqwest::Client, credential: &str, base_url: &str) -> Self {
        Self {
            http,
            credential: credential.to_string(),
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(url = %self.url))]
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = RelayChatRequest::from(request);
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "relay rejected request");
            return Err(LlmError::from_upstream_body(status.as_u16(), &text));
        }

        let raw_message: serde_json::Value = serde_json::from_str(&text)?;
        let message = parse_wire_message(&raw_message)?;
        Ok(ChatResponse {
            message,
            // The relay returns the bare message; usage is not forwarded.
            usage: Usage::default(),
            finish_reason: "unknown".to_string(),
            raw_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatTransport, Endpoint, LlmClient};
    use crate::types::{Role, ToolDefinition};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn spawn_relay(reply: serde_json::Value, status: u16) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                let reply = reply.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    sink.lock().expect("capture lock").push((auth, body));
                    let status = axum::http::StatusCode::from_u16(status).expect("status");
                    (status, Json(reply))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake relay");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), captured)
    }

    #[tokio::test]
    async fn chat_parses_bare_message_and_keeps_raw() {
        let message = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "c1",
                "type": "function",
                "function": {
                    "name": "search_knowledge",
                    "arguments": "{\"query\":\"dragon\"}"
                }
            }]
        });
        let (base_url, captured) = spawn_relay(message.clone(), 200).await;

        let trailing_slash = format!("{base_url}/");
        let client = RelayClient::new(reqwest::Client::new(), "sk-caller", &trailing_slash);
        let request = ChatRequest::new(vec![ChatMessage::user("Find dragons")])
            .with_temperature(1.3)
            .with_tools(vec![ToolDefinition {
                name: "search_knowledge".to_string(),
                description: "search".to_string(),
                parameters: json!({ "type": "object" }),
            }]);
        let resp = client.chat(&request).await.expect("chat ok");

        assert_eq!(resp.raw_message, message);
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, "");
        assert_eq!(resp.message.tool_calls.len(), 1);
        assert_eq!(resp.message.tool_calls[0].id, "c1");
        assert_eq!(resp.message.tool_calls[0].name, "search_knowledge");
        assert_eq!(resp.finish_reason, "unknown");
        assert_eq!(resp.usage.prompt_tokens, 0);

        let captured = captured.lock().expect("capture lock");
        assert_eq!(captured.len(), 1);
        let (auth, body) = &captured[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-caller"));
        assert_eq!(body["messages"], json!([{ "role": "user", "content": "Find dragons" }]));
        assert_eq!(body["tools"][0]["function"]["name"], "search_knowledge");
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn relay_error_message_becomes_upstream_error() {
        let (base_url, _captured) =
            spawn_relay(json!({ "message": "Authentication Fails" }), 500).await;
        let client = RelayClient::new(reqwest::Client::new(), "sk-wrong", &base_url);
        let err = client
            .chat(&ChatRequest::new(vec![ChatMessage::user("Hello")]))
            .await
            .expect_err("500 should fail");
        match err {
            LlmError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Authentication Fails");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn relay_endpoint_dispatches_to_relay_client() {
        let (base_url, captured) =
            spawn_relay(json!({ "role": "assistant", "content": "Hi" }), 200).await;
        let client = LlmClient::new(
            "sk-caller",
            Endpoint::Relay { base_url },
            Duration::from_secs(5),
        )
        .expect("client");
        let resp = client
            .chat(&ChatRequest::new(vec![ChatMessage::user("Hello")]))
            .await
            .expect("chat ok");
        assert_eq!(resp.message, ChatMessage::assistant("Hi"));
        assert_eq!(captured.lock().expect("capture lock").len(), 1);
    }

    #[test]
    fn relay_body_omits_absent_optional_fields() {
        let req = ChatRequest::new(vec![ChatMessage::user("Hello")]);
        let body = serde_json::to_value(RelayChatRequest::from(&req)).expect("encode");
        assert_eq!(body, json!({ "messages": [{ "role": "user", "content": "Hello" }] }));
    }

    #[test]
    fn relay_body_converts_back_into_chat_request() {
        let body: RelayChatRequest = serde_json::from_value(json!({
            "messages": [{ "role": "user", "content": "Hello" }],
            "temperature": 0.7,
            "response_format": { "type": "json_object" },
            "tools": [{
                "type": "function",
                "function": { "name": "generate_image", "description": "draw", "parameters": {} }
            }]
        }))
        .expect("decode");
        let req = ChatRequest::from(body);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(
            req.tools,
            vec![ToolDefinition {
                name: "generate_image".to_string(),
                description: "draw".to_string(),
                parameters: json!({}),
            }]
        );
    }
}
