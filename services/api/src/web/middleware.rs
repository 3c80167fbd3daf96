//! services/api/src/web/middleware.rs
//!
//! Reader identification for protected routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

/// The header carrying the caller's reader id.
pub const READER_ID_HEADER: &str = "x-reader-id";

/// The identified reader, inserted into request extensions by [`require_reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderId(pub Uuid);

/// The query parameter accepted instead of the header, for browser WebSocket
/// clients that cannot set headers on the upgrade request.
pub const READER_ID_QUERY: &str = "reader_id";

/// Middleware that reads the reader id from the `x-reader-id` header, falling
/// back to the `reader_id` query parameter.
///
/// If valid, inserts a [`ReaderId`] into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_reader(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let reader_id = reader_id_from(req.headers())
        .or_else(|| reader_id_from_query(req.uri().query()))
        .ok_or_else(|| {
            warn!("Rejected request to {} without a valid reader id", req.uri().path());
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(ReaderId(reader_id));
    Ok(next.run(req).await)
}

fn reader_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(READER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

fn reader_id_from_query(query: Option<&str>) -> Option<Uuid> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == READER_ID_QUERY)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}
