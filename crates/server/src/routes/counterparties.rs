//! Acquirer (`/adquirientes`) and supplier (`/proveedores`) master data.

use super::{json_body, query_params};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use fe_common::normalize_nit;
use fe_counterparty::{
    Counterparty, CounterpartyPage, CounterpartyRole, CounterpartyStore, ListQuery, StoreError,
};
use std::sync::Arc;
use tracing::info;

pub fn routes(role: CounterpartyRole) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(move |state: State<AppState>, params: Result<Query<ListQuery>, QueryRejection>| {
                list(role, state, params)
            })
            .post(move |state: State<AppState>, payload: Result<Json<Counterparty>, JsonRejection>| {
                create(role, state, payload)
            }),
        )
        .route(
            "/:ofe/:id",
            get(move |state: State<AppState>, path: Path<(String, String)>| find(role, state, path))
                .put(
                    move |state: State<AppState>,
                          path: Path<(String, String)>,
                          payload: Result<Json<Counterparty>, JsonRejection>| {
                        update(role, state, path, payload)
                    },
                ),
        )
}

fn store(state: &AppState) -> Result<Arc<dyn CounterpartyStore>, ApiError> {
    state
        .counterparties
        .clone()
        .ok_or_else(|| ApiError::Unavailable("counterparty store is not configured".into()))
}

async fn list(
    role: CounterpartyRole,
    State(state): State<AppState>,
    params: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<CounterpartyPage>, ApiError> {
    let query = query_params(params)?;
    let page = store(&state)?.list(role, &query).await?;
    Ok(Json(page))
}

async fn find(
    role: CounterpartyRole,
    State(state): State<AppState>,
    Path((ofe, id)): Path<(String, String)>,
) -> Result<Json<Counterparty>, ApiError> {
    match store(&state)?.find(role, &ofe, &id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(StoreError::NotFound {
            role: role.label(),
            ofe: normalize_nit(&ofe),
            id: normalize_nit(&id),
        }
        .into()),
    }
}

async fn create(
    role: CounterpartyRole,
    State(state): State<AppState>,
    payload: Result<Json<Counterparty>, JsonRejection>,
) -> Result<(StatusCode, Json<Counterparty>), ApiError> {
    let record = json_body(payload)?;
    let created = store(&state)?.create(role, record).await?;
    info!(
        role = role.label(),
        ofe = %created.ofe_identificacion,
        id = %created.identificacion,
        "counterparty created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update(
    role: CounterpartyRole,
    State(state): State<AppState>,
    Path((ofe, id)): Path<(String, String)>,
    payload: Result<Json<Counterparty>, JsonRejection>,
) -> Result<Json<Counterparty>, ApiError> {
    let record = json_body(payload)?;
    let updated = store(&state)?.update(role, &ofe, &id, record).await?;
    info!(role = role.label(), ofe = %updated.ofe_identificacion, id = %updated.identificacion, "counterparty updated");
    Ok(Json(updated))
}
