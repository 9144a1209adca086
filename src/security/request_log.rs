use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

use crate::AppState;

/// Logs `METHOD - URI - caller` with the resulting status
pub async fn log_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let caller = state.rate_limiter.caller_key(&request);
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} - {} - {} -> {} ({} ms)",
        method,
        uri,
        caller,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
