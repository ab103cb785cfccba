use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind, ServerConfig};
use crate::error::ProxyError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    server: &ServerConfig,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, String> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(server.timeout));

    if let Some(proxy_url) = proxy_url {
        let proxy =
            reqwest::Proxy::all(proxy_url).map_err(|err| format!("Invalid proxy URL: {err}"))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !server.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| format!("Failed to build HTTP client: {err}"))
}

/// Pooled HTTP client bound to the configured provider's chat-completions
/// endpoint.
///
/// The request timeout covers the whole exchange including the streamed
/// body, so a stalled upstream ends the response instead of hanging it.
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
    provider: ProviderKind,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the endpoint URL or proxy URL is
    /// invalid, or the client cannot be built.
    pub fn new(server: &ServerConfig, provider: &ProviderConfig) -> Result<Self, ProxyError> {
        let chat_url = url::Url::parse(&provider.chat_completions_url())
            .map_err(|e| ProxyError::Config(format!("Invalid upstream URL: {e}")))?;
        let client = build_reqwest_client(server, provider.proxy.as_deref())
            .map_err(ProxyError::Config)?;
        Ok(Self {
            client,
            chat_url,
            provider: provider.kind,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// POST `body` to the chat-completions endpoint. Any HTTP status is
    /// returned as a response; only connection-level failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the request cannot be sent or
    /// no response headers arrive before the timeout.
    pub async fn send_chat(
        &self,
        headers: http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = reqwest::Request::new(http::Method::POST, self.chat_url.clone());
        *request.headers_mut() = headers;
        *request.body_mut() = Some(reqwest::Body::from(body));

        self.client.execute(request).await.map_err(|err| {
            tracing::warn!(provider = %self.provider, error = %err, "upstream request failed");
            ProxyError::transport(self.provider, transport_error_text(&err))
        })
    }
}

fn transport_error_text(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "request timed out".to_string();
    }
    if err.is_connect() {
        return format!("could not connect to upstream: {err}");
    }
    err.to_string()
}
