use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use crate::context::AppContext;
use crate::error::{Error, Result};

/// Token part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Reject requests whose bearer token differs from the configured one.
/// Applies to WebSocket upgrades as well, before the handshake completes.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let authorized = bearer_token(request.headers()) == Some(ctx.config.api.auth_token.as_str());
    if !authorized {
        tracing::debug!("Rejected unauthenticated request to {}", request.uri().path());
        return Err(Error::Unauthorized);
    }
    Ok(next.run(request).await)
}
