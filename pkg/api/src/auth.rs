use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::AppState;

/// The token of an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware: authenticates the request against the server's join token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized = bearer_token(req.headers()).map(|token| token == state.join_token);
    match authorized {
        Some(true) => {
            debug!("Authenticated {} {}", req.method(), req.uri().path());
            Ok(next.run(req).await)
        }
        Some(false) => {
            warn!("Invalid Bearer token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
