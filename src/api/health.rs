use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let policy = &state.citation_policy;
    Json(json!({
        "status": "citestream is running",
        "provider": {
            "kind": config.provider.kind,
            "model": config.provider.effective_model(),
            "api_key_configured": state.api_key().is_ok(),
        },
        "citations": {
            "header": policy.header,
            "exclude_rules": policy.exclude.len(),
            "trusted_rules": policy.trusted.len(),
            "prefer_search_results": policy.prefer_rich_sources,
        },
        "features": {
            "log_level": config.features.log_level,
            "streaming_fallback": config.features.streaming_fallback,
        }
    }))
}
