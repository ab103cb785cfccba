use bytes::Bytes;
use serde::Serialize;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ProxyError;

use super::messages::ConversationTurn;

/// Built-in research assistant prompt used when no prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
당신은 Research Assistant입니다. 연구자의 질문에 친절하고 전문적으로 답변하며, \
논문 검색, 요약, 인용, 참고문헌 정리를 도와줍니다. 정보를 찾을 때에는 한국뿐 아니라 \
국제적으로 신뢰받는 학술 자료를 우선적으로 찾으세요.

**응답 형식 가이드라인:**
1. 응답을 논리적인 섹션으로 나누어 구성하세요
2. 각 섹션에는 이모지를 포함한 제목을 사용하세요 (예: 🔬 연구 동향, 📊 주요 발견, 💡 시사점)
3. 각 섹션 내용은 불릿 포인트(•)로 정리하세요
4. 중요한 정보는 **볼드체**로 강조하세요
5. 인용한 자료는 본문에 [1], [2] 형식의 번호로 표시하세요

실제로 존재하는 자료만 인용하고, 확인할 수 없는 논문이나 DOI는 만들어내지 마세요.
사용자가 간단한 인사를 입력하면 따뜻한 인사로 짧게 응답하세요.";

#[derive(Debug, Serialize)]
struct PerplexityOptions {
    citations: bool,
}

#[derive(Debug, Serialize)]
struct WebSearchOptions {}

#[derive(Debug, Serialize)]
struct UpstreamChatBody<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ConversationTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<PerplexityOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
}

/// Serialize the outbound chat-completions body for the configured provider.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] if the body cannot be serialized.
pub fn build_chat_body(
    provider: &ProviderConfig,
    turns: &[ConversationTurn],
    stream: bool,
) -> Result<Bytes, ProxyError> {
    let body = UpstreamChatBody {
        model: provider.effective_model(),
        stream,
        messages: turns,
        options: (provider.kind == ProviderKind::Perplexity)
            .then_some(PerplexityOptions { citations: true }),
        web_search_options: (provider.kind == ProviderKind::OpenAi && provider.web_search)
            .then_some(WebSearchOptions {}),
    };
    serde_json::to_vec(&body)
        .map(Bytes::from)
        .map_err(|e| ProxyError::InvalidRequest(format!("Failed to encode upstream body: {e}")))
}

/// Headers for an authenticated upstream call.
///
/// # Errors
///
/// Returns [`ProxyError::Config`] when the key contains bytes that are not
/// valid in a header value.
pub fn build_upstream_headers(api_key: &str, stream: bool) -> Result<http::HeaderMap, ProxyError> {
    let mut headers = http::HeaderMap::with_capacity(3);
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static(if stream {
            "text/event-stream"
        } else {
            "application/json"
        }),
    );
    let mut auth = http::HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ProxyError::Config("API key is not a valid header value".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(http::header::AUTHORIZATION, auth);
    Ok(headers)
}
