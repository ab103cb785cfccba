use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::Deserialize;

use crate::error::ProxyError;
use crate::linker::DisplayMode;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct RenderRequest {
    text: String,
    #[serde(default)]
    mode: DisplayMode,
}

/// `POST /api/render`: link citation markers in a finished answer.
pub fn handler(State(state): State<Arc<AppState>>, body: &Bytes) -> Response {
    let request: RenderRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return ProxyError::InvalidRequest(format!("Invalid render request body: {e}"))
                .into_response()
        }
    };
    Json(state.linker(request.mode).render(&request.text)).into_response()
}
