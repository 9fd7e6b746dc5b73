//! API key authentication
//!
//! Job submission requires the agent's API key in the `X-API-Key` header.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::api::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Compares two keys without leaking how many bytes match
///
/// Only the length of the key is observable; slices of different length
/// compare unequal without inspecting their contents.
fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Rejects requests without a matching `X-API-Key` header
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if keys_match(key, state.api_key.expose_secret()) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Rejected request to {} with invalid API key", request.uri().path());
            Err(ApiError::Unauthorized("Invalid API key".to_string()))
        }
        None => Err(ApiError::Unauthorized(
            "Missing X-API-Key header".to_string(),
        )),
    }
}
