mod request_id;

use std::sync::Arc;

use crate::config::{resolve_system_prompt, AppConfig};
use crate::error::ProxyError;
use crate::linker::{CitationLinker, DisplayMode};
use crate::stream::CitationPolicy;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Read-only after
/// startup apart from the request id counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub citation_policy: Arc<CitationPolicy>,
    system_prompt: String,
    api_key: Option<String>,
    linkers: Linkers,
    request_ids: RequestIdGenerator,
}

struct Linkers {
    links: CitationLinker,
    superscript: CitationLinker,
    hidden: CitationLinker,
}

impl Linkers {
    fn new(header: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            links: CitationLinker::new(header, DisplayMode::Links)?,
            superscript: CitationLinker::new(header, DisplayMode::Superscript)?,
            hidden: CitationLinker::new(header, DisplayMode::Hidden)?,
        })
    }
}

impl AppState {
    /// Build state from a validated config. The API key and system prompt
    /// are resolved once here.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the system prompt file cannot be
    /// read, the reference header does not compile into a pattern, or the
    /// HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(&config.server, &config.provider)?;
        let system_prompt =
            resolve_system_prompt(&config.prompt).map_err(|e| ProxyError::Config(e.to_string()))?;
        let api_key = config.provider.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                provider = %config.provider.kind,
                env_var = config.provider.api_key_env_name(),
                "no API key configured; chat requests will be answered with a diagnostic"
            );
        }
        let citation_policy = Arc::new(CitationPolicy::from_config(&config.citations));
        let linkers = Linkers::new(&citation_policy.header)
            .map_err(|e| ProxyError::Config(format!("Invalid citations.header: {e}")))?;
        Ok(Self {
            config,
            transport,
            citation_policy,
            system_prompt,
            api_key,
            linkers,
            request_ids: RequestIdGenerator::new(),
        })
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The resolved API key.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::MissingApiKey`] when neither the config nor the
    /// environment supplied one.
    pub fn api_key(&self) -> Result<&str, ProxyError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProxyError::MissingApiKey {
                provider: self.config.provider.kind.display_name(),
                env_var: self.config.provider.api_key_env_name().to_string(),
            })
    }

    #[must_use]
    pub fn linker(&self, mode: DisplayMode) -> &CitationLinker {
        match mode {
            DisplayMode::Links => &self.linkers.links,
            DisplayMode::Superscript => &self.linkers.superscript,
            DisplayMode::Hidden => &self.linkers.hidden,
        }
    }

    /// Fresh request id for log correlation.
    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.request_ids.next_id()
    }
}
