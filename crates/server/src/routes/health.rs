use crate::state::AppState;
use crate::SERVICE_NAME;
use axum::extract::{Json, State};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub database: &'static str,
    pub audit_sink: &'static str,
}

/// `GET /health`: always 200; `degraded` when the database does not answer.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = match &state.counterparties {
        None => "disabled",
        Some(store) => match store.ping().await {
            Ok(()) => "up",
            Err(e) => {
                warn!(error = %e, "database ping failed");
                "down"
            }
        },
    };
    Json(Health {
        status: if database == "down" { "degraded" } else { "ok" },
        service: SERVICE_NAME,
        database,
        audit_sink: state.audit_sink,
    })
}
