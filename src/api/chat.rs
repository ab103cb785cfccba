use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{plain_text_response, ProxyError};
use crate::protocol::messages::{build_upstream_turns, ChatRequest, ConversationTurn};
use crate::protocol::request::{build_chat_body, build_upstream_headers};
use crate::protocol::response::decode_completion;
use crate::state::AppState;
use crate::stream::OutputComposer;
use crate::transport::is_streaming_rejection;

/// Upstream type for composers built from an already complete body.
type CompletedUpstream = futures_util::stream::Empty<Result<Bytes, reqwest::Error>>;

/// `POST /api/chat`: stream the provider's answer as plain text followed by
/// the reference block.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = state.next_request_id();
    match handler_inner(&state, body, &request_id).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::InvalidRequest(_) => {
                    debug!(request_id = %request_id, error = %err, "rejected chat request");
                }
                _ => warn!(request_id = %request_id, error = %err, "chat request failed"),
            }
            err.into_response()
        }
    }
}

async fn handler_inner(
    state: &Arc<AppState>,
    body: Bytes,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid chat request body: {e}")))?;
    let api_key = state.api_key()?;

    let provider = &state.config.provider;
    let turns = build_upstream_turns(state.system_prompt(), request.messages);
    info!(
        request_id,
        provider = %provider.kind,
        model = provider.effective_model(),
        turns = turns.len(),
        "chat request"
    );

    let upstream_body = build_chat_body(provider, &turns, true)?;
    let headers = build_upstream_headers(api_key, true)?;
    let response = state.transport.send_chat(headers, upstream_body).await?;

    let status = response.status();
    if !status.is_success() {
        let error_body = read_error_body(response).await;
        if state.config.features.streaming_fallback && is_streaming_rejection(status, &error_body)
        {
            info!(
                request_id,
                status = status.as_u16(),
                "upstream rejected streaming; retrying without stream"
            );
            return complete_without_stream(state, &turns, api_key, request_id).await;
        }
        return Err(ProxyError::upstream(
            provider.kind,
            status.as_u16(),
            &error_body,
        ));
    }

    if is_json_content_type(response.headers()) {
        debug!(request_id, "upstream answered a stream request with JSON");
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::transport(provider.kind, e.to_string()))?;
        return completion_response(state, &body, request_id);
    }

    let composer = OutputComposer::new(
        Box::pin(response.bytes_stream()),
        Arc::clone(&state.citation_policy),
        request_id.to_string(),
    );
    Ok(text_response(Body::from_stream(composer.into_stream())))
}

/// One non-streaming retry after the provider refused `stream: true`.
async fn complete_without_stream(
    state: &Arc<AppState>,
    turns: &[ConversationTurn],
    api_key: &str,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let provider = &state.config.provider;
    let upstream_body = build_chat_body(provider, turns, false)?;
    let headers = build_upstream_headers(api_key, false)?;
    let response = state.transport.send_chat(headers, upstream_body).await?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::transport(provider.kind, e.to_string()))?;
    if !status.is_success() {
        return Err(ProxyError::upstream(provider.kind, status.as_u16(), &body));
    }
    completion_response(state, &body, request_id)
}

/// Body of a non-2xx upstream response. A failed read yields the read
/// error's text so the diagnostic is never blank.
async fn read_error_body(response: reqwest::Response) -> Bytes {
    match response.bytes().await {
        Ok(body) => body,
        Err(err) => Bytes::from(format!("failed to read error body: {err}")),
    }
}

fn completion_response(
    state: &Arc<AppState>,
    body: &[u8],
    request_id: &str,
) -> Result<Response, ProxyError> {
    let output = decode_completion(body).ok_or_else(|| {
        ProxyError::transport(
            state.config.provider.kind,
            "upstream returned an unreadable response body",
        )
    })?;
    let composer = OutputComposer::<CompletedUpstream>::from_completion(
        output,
        Arc::clone(&state.citation_policy),
        request_id.to_string(),
    );
    Ok(text_response(Body::from_stream(composer.into_stream())))
}

fn is_json_content_type(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        })
}

fn text_response(body: Body) -> Response {
    let mut response = plain_text_response(http::StatusCode::OK, body);
    response.headers_mut().insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    response
}
