mod counterparties;
mod health;
mod invoices;
mod registration;

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::routing::{get, post};
use axum::Router;
use fe_counterparty::CounterpartyRole;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/registrar-documentos", post(registration::register_documents))
        .route("/facturas", post(invoices::issued))
        .route("/facturas/by-number", post(invoices::by_number))
        .route("/facturas/received", post(invoices::received))
        .route(
            "/facturas/download",
            get(invoices::download_by_query).post(invoices::download_by_body),
        )
        .route("/eventos", post(invoices::register_event))
        .nest("/adquirientes", counterparties::routes(CounterpartyRole::Acquirer))
        .nest("/proveedores", counterparties::routes(CounterpartyRole::Supplier))
}

/// Unwrap a JSON body, turning extractor rejections into `{message, errors}`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(format!("invalid request body: {}", rejection.body_text())))
}

pub(crate) fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::Validation(format!("invalid query string: {}", rejection.body_text())))
}
