//! Invoice queries, DIAN downloads and RADIAN events.

use super::{json_body, query_params};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query, State};
use fe_providers::{
    DocumentByNumberQuery, DocumentQuery, EstadoDian, EventRegistration,
    EventRegistrationResult, InvoiceGateway,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

const OK_STATUS: &str = "200";
const OK_MESSAGE: &str = "Exitoso";

#[derive(Debug, Serialize)]
pub struct ListEnvelope {
    pub status: &'static str,
    pub message: &'static str,
    pub total: usize,
    pub data: Vec<Value>,
}

impl ListEnvelope {
    fn of(data: Vec<Value>) -> Self {
        Self {
            status: OK_STATUS,
            message: OK_MESSAGE,
            total: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    pub status: &'static str,
    pub message: &'static str,
    pub data: EventRegistrationResult,
}

/// `POST /facturas`
pub async fn issued(
    State(state): State<AppState>,
    payload: Result<Json<DocumentQuery>, JsonRejection>,
) -> Result<Json<ListEnvelope>, ApiError> {
    let query = json_body(payload)?;
    let data = state.gateway.get_documents(&query).await?;
    Ok(Json(ListEnvelope::of(data)))
}

/// `POST /facturas/by-number`
pub async fn by_number(
    State(state): State<AppState>,
    payload: Result<Json<DocumentByNumberQuery>, JsonRejection>,
) -> Result<Json<ListEnvelope>, ApiError> {
    let query = json_body(payload)?;
    let data = state.gateway.get_document_by_number(&query).await?;
    Ok(Json(ListEnvelope::of(data)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceivedParams {
    pub download: Option<String>,
}

/// `POST /facturas/received[?download=1]`
pub async fn received(
    State(state): State<AppState>,
    params: Result<Query<ReceivedParams>, QueryRejection>,
    payload: Result<Json<DocumentQuery>, JsonRejection>,
) -> Result<Json<ListEnvelope>, ApiError> {
    let params = query_params(params)?;
    let query = json_body(payload)?;
    let mut data = state.gateway.get_received_documents(&query).await?;
    let download = matches!(params.download.as_deref().map(str::trim), Some("1") | Some("true"));
    if download {
        attach_download_links(state.gateway.as_ref(), &query.company_nit, &mut data).await;
    }
    Ok(Json(ListEnvelope::of(data)))
}

fn cufe_of(doc: &Value) -> Option<String> {
    ["cufe", "Cufe", "CUFE"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Add `urlPDF`/`urlXML` to every received document carrying a CUFE. A failed
/// lookup leaves that document as returned upstream.
async fn attach_download_links(gateway: &dyn InvoiceGateway, ofe: &str, docs: &mut [Value]) {
    for doc in docs.iter_mut() {
        let Some(cufe) = cufe_of(doc) else { continue };
        match gateway.search_estados_dian(ofe, &cufe).await {
            Ok(estado) => {
                if let Some(obj) = doc.as_object_mut() {
                    obj.insert("urlPDF".into(), Value::String(estado.url_pdf));
                    obj.insert("urlXML".into(), Value::String(estado.url_xml));
                }
            }
            Err(e) => warn!(cufe = %cufe, error = %e, "download links unavailable"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub cufe: Option<String>,
    /// Issuer NIT; defaults to the configured one.
    pub ofe: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadBody {
    #[serde(default, alias = "cufe")]
    pub id: String,
    #[serde(default)]
    pub ofe: Option<String>,
}

/// `GET /facturas/download?cufe=`
pub async fn download_by_query(
    State(state): State<AppState>,
    params: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Json<EstadoDian>, ApiError> {
    let params = query_params(params)?;
    let cufe = params.cufe.unwrap_or_default();
    download(&state, params.ofe, cufe).await
}

/// `POST /facturas/download` with `{id}`
pub async fn download_by_body(
    State(state): State<AppState>,
    payload: Result<Json<DownloadBody>, JsonRejection>,
) -> Result<Json<EstadoDian>, ApiError> {
    let body = json_body(payload)?;
    download(&state, body.ofe, body.id).await
}

async fn download(
    state: &AppState,
    ofe: Option<String>,
    document: String,
) -> Result<Json<EstadoDian>, ApiError> {
    let document = document.trim();
    if document.is_empty() {
        return Err(ApiError::Validation("cufe is required".into()));
    }
    let ofe = ofe
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.issuer.nit.clone());
    let estado = state.gateway.search_estados_dian(&ofe, document).await?;
    info!(cufe = %estado.cufe, "download links resolved");
    Ok(Json(estado))
}

/// `POST /eventos`
pub async fn register_event(
    State(state): State<AppState>,
    payload: Result<Json<EventRegistration>, JsonRejection>,
) -> Result<Json<EventEnvelope>, ApiError> {
    let event = json_body(payload)?;
    let data = state
        .gateway
        .register_event(&event, &state.issuer.nit, &state.issuer.razon_social)
        .await?;
    info!(event_type = %event.event_type, document = %event.documento_numero_completo, "event registered");
    Ok(Json(EventEnvelope {
        status: OK_STATUS,
        message: OK_MESSAGE,
        data,
    }))
}
