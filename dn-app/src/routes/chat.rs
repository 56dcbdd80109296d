use crate::server::RelayState;
use axum::extract::rejection::JsonRejection;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use dn_llm::{ChatMessage, ChatRequest, OpenAiClient, RelayChatRequest, Role};
use serde_json::json;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/chat", post(post_chat))
}

/// Forward one completion request upstream with the caller's own key.
#[tracing::instrument(level = "info", skip_all)]
async fn post_chat(
    Extension(state): Extension<Arc<RelayState>>,
    headers: HeaderMap,
    body: Result<Json<RelayChatRequest>, JsonRejection>,
) -> Response {
    let Some(credential) = parse_bearer_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "API Key is required");
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "relay request body rejected");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let mut request = ChatRequest::from(body);
    if request.messages.first().map(|m| m.role) != Some(Role::System) {
        request
            .messages
            .insert(0, ChatMessage::system(state.system_prompt.clone()));
    }
    tracing::info!(
        messages = request.messages.len(),
        tools = request.tools.len(),
        model = %state.model,
        "relaying chat request"
    );

    let upstream = OpenAiClient::new(
        state.http.clone(),
        &credential,
        &state.model,
        &state.upstream_base_url,
    );
    match upstream.chat(&request).await {
        Ok(response) => {
            tracing::info!(
                finish_reason = %response.finish_reason,
                tool_calls = response.message.tool_calls.len(),
                "relay chat completed"
            );
            (StatusCode::OK, Json(response.raw_message)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "relay chat failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
        }
    }
}

fn parse_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.trim().splitn(2, char::is_whitespace);
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = parts.next()?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}
