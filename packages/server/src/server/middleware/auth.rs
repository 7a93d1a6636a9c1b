//! Static bearer-token auth (spec §6): a single shared `X-Auth-Token` header
//! value, not per-user JWTs. Health, docs, and admin paths are excluded.

use axum::extract::{Request, State};
use axum::http::header::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::common::AppError;
use crate::server::app::AppState;

const AUTH_HEADER: &str = "x-auth-token";
const EXCLUDED_PREFIXES: &[&str] = &["/health", "/docs", "/admin"];

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path();
    if EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Ok(next.run(request).await);
    }

    if !token_matches(request.headers(), &state.ctx.config.auth_token) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn token_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn matching_token_passes() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_static("secret"));
        assert!(token_matches(&headers, "secret"));
    }

    #[test]
    fn missing_token_fails() {
        let headers = HeaderMap::new();
        assert!(!token_matches(&headers, "secret"));
    }

    #[test]
    fn wrong_token_fails() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, HeaderValue::from_static("nope"));
        assert!(!token_matches(&headers, "secret"));
    }
}
