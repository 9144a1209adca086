// Access control gate for protected routes

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName},
    middleware::Next,
    response::{AppendHeaders, Response},
};
use tracing::{debug, warn};

use crate::auth::{
    error::AuthError,
    models::{Principal, Role},
    token::TokenPair,
};
use crate::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Read a cookie from the `Cookie` header(s)
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Access token from the `accessToken` cookie, else from `Authorization: Bearer`
pub fn extract_token(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(token) = cookie_value(headers, ACCESS_COOKIE) {
        return Ok(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::InvalidToken)
}

fn cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; Path=/; Max-Age={}",
        name, value, max_age_secs
    )
}

/// `Set-Cookie` headers carrying both tokens
pub fn session_cookies(
    tokens: &TokenPair,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (
            header::SET_COOKIE,
            cookie(ACCESS_COOKIE, &tokens.access_token, access_ttl_secs),
        ),
        (
            header::SET_COOKIE,
            cookie(REFRESH_COOKIE, &tokens.refresh_token, refresh_ttl_secs),
        ),
    ])
}

/// `Set-Cookie` headers expiring both token cookies
pub fn clear_session_cookies() -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (header::SET_COOKIE, cookie(ACCESS_COOKIE, "", 0)),
        (header::SET_COOKIE, cookie(REFRESH_COOKIE, "", 0)),
    ])
}

/// Primary gate: verifies the access token, resolves the account in the
/// collection matching the token's role and attaches it as the request principal.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();

    let token = extract_token(request.headers()).map_err(|e| {
        warn!("No usable token in request to protected endpoint: {}", endpoint);
        e
    })?;

    let claims = state.tokens.verify_access(&token)?;

    let role = claims.role.parse::<Role>().map_err(|_| {
        warn!(
            "Token with unrecognized role: user_id={}, role={}, endpoint={}",
            claims.sub, claims.role, endpoint
        );
        AuthError::Unauthorized("Unrecognized role".to_string())
    })?;

    let principal = state
        .accounts
        .principal(role.account_kind(), claims.sub)
        .await?
        .filter(|principal| principal.role == role)
        .ok_or_else(|| {
            warn!(
                "Token for missing account: user_id={}, role={}, endpoint={}",
                claims.sub, role, endpoint
            );
            AuthError::Unauthorized("Invalid access token".to_string())
        })?;

    debug!(
        "Authenticated: user_id={}, role={}, endpoint={}",
        principal.id, principal.role, endpoint
    );
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Secondary gate for admin-only routes. Runs after `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| AuthError::Unauthorized("Unauthorized request".to_string()))?;

    if principal.role != Role::Admin {
        warn!(
            "Authorization failed: user_id={}, role={}, endpoint={}",
            principal.id, principal.role, endpoint
        );
        return Err(AuthError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Principal attached by `require_auth`
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AuthError::Unauthorized("Unauthorized request".to_string()))
    }
}
