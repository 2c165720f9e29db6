use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use fe_common::with_correlation_id;
use tracing::Instrument;
use uuid::Uuid;

pub static CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

const MAX_INBOUND_ID_LEN: usize = 128;

/// Bind the caller's `X-Correlation-ID` (or a fresh UUID) for the handler
/// and echo it back.
pub async fn correlation_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_INBOUND_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", correlation_id = %id);
    let mut response = with_correlation_id(id.clone(), next.run(request).instrument(span)).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER.clone(), value);
    }
    response
}
