use super::{json_body, query_params};
use crate::error::ApiError;
use crate::state::AppState;
use crate::streaming::stream_registration;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fe_documents::{validate_batch_shape, RegistrationRequest};
use fe_registration::{cancellation, dispatch_buffered};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationParams {
    pub stream: Option<String>,
}

fn wants_stream(param: Option<&str>, default: bool) -> bool {
    match param.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

/// `POST /registrar-documentos`
pub async fn register_documents(
    State(state): State<AppState>,
    params: Result<Query<RegistrationParams>, QueryRejection>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let params = query_params(params)?;
    let RegistrationRequest { mut documentos } = json_body(payload)?;
    let kind = validate_batch_shape(&documentos)?;
    let docs = documentos.take(kind);
    let streaming = wants_stream(params.stream.as_deref(), state.options.streaming_default);
    info!(document_type = %kind, documents = docs.len(), streaming, "registration request");

    if streaming {
        return Ok(stream_registration(state.coordinator.clone(), kind, docs));
    }

    // Dropped with this handler, which stops groups still running.
    let (_guard, cancel) = cancellation();
    let outcome = dispatch_buffered(
        state.coordinator.clone(),
        kind,
        docs,
        state.options.batch_size,
        state.options.worker_pool_size,
        &cancel,
    )
    .await?;
    let status = if outcome.has_failures() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    info!(
        status = status.as_u16(),
        processed = outcome.response.processed.len(),
        failed = outcome.response.failed.len(),
        lote = %outcome.response.lote,
        "registration finished"
    );
    Ok((status, Json(outcome.response)).into_response())
}
