//! Client key/secret authentication for transform endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::info;

use super::AppState;
use crate::config::AuthConfig;
use crate::error::AuthError;

pub const CLIENT_KEY_HEADER: &str = "client-key";
pub const CLIENT_SECRET_HEADER: &str = "client-secret";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn matches(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Check the request's CLIENT-KEY / CLIENT-SECRET pair
pub fn check_credentials(auth: &AuthConfig, headers: &HeaderMap) -> Result<(), AuthError> {
    let (Some(key), Some(secret)) = (
        header_value(headers, CLIENT_KEY_HEADER),
        header_value(headers, CLIENT_SECRET_HEADER),
    ) else {
        return Err(AuthError::MissingCredentials);
    };

    if !matches(key, &auth.client_key) {
        return Err(AuthError::InvalidKey);
    }
    if !matches(secret, &auth.client_secret) {
        return Err(AuthError::SecretMismatch);
    }
    Ok(())
}

/// Middleware rejecting requests without valid client credentials
pub async fn require_client_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match check_credentials(&state.service.config().auth, request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            info!(path = %request.uri().path(), reason = ?e, "Rejected unauthenticated request");
            e.into_response()
        }
    }
}
