//! Router test harness: a scripted gateway, a fixed clock and request helpers.

use crate::state::{AppState, RegistrationOptions};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::TimeZone;
use fe_common::{bogota_offset, FixedClock};
use fe_counterparty::{CounterpartyStore, MemoryCounterpartyStore};
use fe_documents::{DocumentRegistrationResponse, ProcessedDocument, RegistrationRequest};
use fe_providers::{
    DocumentByNumberQuery, DocumentQuery, EstadoDian, EventRegistration, EventRegistrationResult,
    GatewayError, InvoiceGateway, Resolution,
};
use fe_registration::{Enricher, IssuerProfile, RegistrationCoordinator};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const TODAY: &str = "2024-05-02";
pub const YESTERDAY: &str = "2024-05-01";
pub const OFE: &str = "860011153";

#[derive(Default)]
pub struct ScriptedGateway {
    pub fail_auth: bool,
    /// Time each registration call spends "upstream" before it is recorded.
    pub delay: Option<Duration>,
    registrations: Mutex<Vec<RegistrationRequest>>,
}

impl ScriptedGateway {
    pub fn failing_auth() -> Self {
        Self {
            fail_auth: true,
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn registrations(&self) -> Vec<RegistrationRequest> {
        self.registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceGateway for ScriptedGateway {
    async fn register_document(
        &self,
        request: &RegistrationRequest,
    ) -> Result<DocumentRegistrationResponse, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_auth {
            return Err(GatewayError::Authentication("token endpoint returned 401".into()));
        }
        self.registrations.lock().unwrap().push(request.clone());
        let kind = request.documentos.non_empty_kinds()[0];
        let processed = request
            .documentos
            .get(kind)
            .iter()
            .map(|doc| ProcessedDocument {
                cdo_id: format!("id-{}", doc.cdo_consecutivo),
                rfa_prefijo: doc.rfa_prefijo.clone(),
                cdo_consecutivo: doc.cdo_consecutivo.clone(),
                fecha_procesamiento: TODAY.into(),
                hora_procesamiento: "14:37:05".into(),
            })
            .collect();
        Ok(DocumentRegistrationResponse {
            lote: "lote-upstream-1".into(),
            message: "ok".into(),
            processed,
            failed: Vec::new(),
        })
    }

    async fn get_resolutions(&self, _nit: &str) -> Result<Vec<Resolution>, GatewayError> {
        Ok(Vec::new())
    }

    async fn get_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        Ok(vec![json!({ "numero": "SETT5604", "cufe": "cufe-5604" })])
    }

    async fn get_document_by_number(
        &self,
        query: &DocumentByNumberQuery,
    ) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        Err(GatewayError::NotFound(query.document_number.clone()))
    }

    async fn get_received_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        Ok(vec![
            json!({ "numero": "FV-1", "cufe": "cufe-recibido-1" }),
            json!({ "numero": "FV-2" }),
        ])
    }

    async fn register_event(
        &self,
        event: &EventRegistration,
        issuer_nit: &str,
        _business_name: &str,
    ) -> Result<EventRegistrationResult, GatewayError> {
        let kind = event.validate()?;
        Ok(EventRegistrationResult {
            codigo: "00".into(),
            mensaje: format!("{} registrado por {issuer_nit}", kind.as_str()),
            cude: Some("cude-1".into()),
            ..Default::default()
        })
    }

    async fn search_estados_dian(&self, ofe: &str, document: &str) -> Result<EstadoDian, GatewayError> {
        Ok(EstadoDian {
            mensaje: "Procesado Correctamente".into(),
            status: "200".into(),
            url_pdf: format!("https://files.local/{ofe}/{document}.pdf"),
            url_xml: format!("https://files.local/{ofe}/{document}.xml"),
            cufe: document.to_string(),
        })
    }
}

pub fn issuer() -> IssuerProfile {
    IssuerProfile {
        nit: OFE.into(),
        razon_social: "ACME S.A.S.".into(),
        ..Default::default()
    }
}

pub fn app_state(
    gateway: Arc<ScriptedGateway>,
    store: Option<Arc<MemoryCounterpartyStore>>,
    options: RegistrationOptions,
) -> AppState {
    let now = bogota_offset()
        .with_ymd_and_hms(2024, 5, 2, 14, 37, 0)
        .single()
        .unwrap();
    let store: Option<Arc<dyn CounterpartyStore>> = store.map(|s| s as Arc<dyn CounterpartyStore>);
    let mut enricher = Enricher::new(issuer());
    if let Some(s) = &store {
        enricher = enricher.with_store(s.clone());
    }
    let gateway: Arc<dyn InvoiceGateway> = gateway;
    let coordinator = RegistrationCoordinator::new(
        gateway.clone(),
        Arc::new(enricher),
        Arc::new(FixedClock(now)),
    );
    AppState {
        coordinator: Arc::new(coordinator),
        gateway,
        counterparties: store,
        issuer: issuer(),
        options,
        audit_sink: "memory",
    }
}

pub fn router(state: AppState) -> Router {
    crate::build_router(state, Duration::from_secs(30))
}

/// A valid FC dated [`TODAY`].
pub fn invoice(consecutivo: &str, adq: &str) -> Value {
    json!({
        "tde_codigo": "01",
        "ofe_identificacion": OFE,
        "adq_identificacion": adq,
        "rfa_prefijo": "SETT",
        "rfa_resolucion": "18760000001",
        "cdo_consecutivo": consecutivo,
        "cdo_fecha": TODAY,
        "cdo_hora": "14:37:00",
        "mon_codigo": "COP",
        "cdo_valor_sin_impuestos": "100000.00",
        "cdo_impuestos": "19000.00",
        "cdo_total": "119000.00",
        "items": [{
            "ddo_secuencia": "1",
            "ddo_descripcion_uno": "P",
            "ddo_cantidad": "1",
            "ddo_valor_unitario": "100000.00",
            "ddo_total": "100000.00"
        }]
    })
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = send(app, request).await;
    let status = response.status();
    let text = body_text(response).await;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, body)
}
