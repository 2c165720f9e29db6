//! Correlation id carried through a request's task tree.
//!
//! The HTTP middleware binds the id with [`with_correlation_id`]; spawned
//! tasks must re-bind it explicitly because task-locals do not cross
//! `tokio::spawn`.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

tokio::task_local! {
    static CORRELATION_ID: String;
}

pub async fn with_correlation_id<F>(id: String, fut: F) -> F::Output
where
    F: Future,
{
    CORRELATION_ID.scope(id, fut).await
}

pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.clone()).ok()
}

/// Current id, or `audit-<unix-nanos>` when called outside a request scope.
pub fn correlation_id_or_fallback() -> String {
    current_correlation_id().unwrap_or_else(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("audit-{nanos}")
    })
}
