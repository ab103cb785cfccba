use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_provider(config)?;
    validate_citation_header(config)?;
    validate_domain_rules("citations.exclude_domains", &config.citations.exclude_domains)?;
    validate_domain_rules("citations.trusted_domains", &config.citations.trusted_domains)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_provider(config: &AppConfig) -> Result<(), ConfigError> {
    let provider = &config.provider;
    let base_url = provider.effective_base_url();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(validation_err(format!(
            "provider.base_url must start with http:// or https:// (got '{base_url}')"
        )));
    }
    if url::Url::parse(base_url).is_err() {
        return Err(validation_err(format!(
            "provider.base_url is not a valid URL: '{base_url}'"
        )));
    }
    if let Some(proxy) = provider.proxy.as_deref() {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            return Err(validation_err("provider.proxy cannot be empty when set"));
        }
        if url::Url::parse(proxy).is_err() {
            return Err(validation_err(format!(
                "provider.proxy is not a valid URL: '{proxy}'"
            )));
        }
    }
    Ok(())
}

fn validate_citation_header(config: &AppConfig) -> Result<(), ConfigError> {
    let header = config.citations.header.trim();
    if header.is_empty() {
        return Err(validation_err("citations.header cannot be empty"));
    }
    if header.contains(['\n', '\r']) {
        return Err(validation_err("citations.header must be a single line"));
    }
    Ok(())
}

fn validate_domain_rules(field: &str, rules: &[String]) -> Result<(), ConfigError> {
    for rule in rules {
        let trimmed = rule.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(validation_err(format!("{field} contains an empty entry")));
        }
        if trimmed.contains("://") || trimmed.contains('/') {
            return Err(validation_err(format!(
                "{field} entry '{rule}' must be a bare domain suffix, not a URL"
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
