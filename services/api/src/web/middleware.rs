//! services/api/src/web/middleware.rs
//!
//! Resolves the acting user for protected routes.
//!
//! Identity is established upstream; requests arrive with the user's id in the
//! `x-user-id` header.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that reads the user id header and inserts the `Uuid` into request extensions.
///
/// Missing or malformed ids are rejected with 401 Unauthorized before the handler runs.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Extract the header
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Parse it
    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        debug!("Rejected malformed {} header", USER_ID_HEADER);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Hand it to the handler
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
