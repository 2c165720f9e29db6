//! Test doubles shared by the pipeline's unit tests.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use fe_common::{bogota_offset, FixedClock};
use fe_documents::{
    Document, DocumentItem, DocumentRegistrationResponse, ProcessedDocument,
    RegistrationRequest,
};
use fe_providers::{
    DocumentByNumberQuery, DocumentQuery, EstadoDian, EventRegistration, EventRegistrationResult,
    GatewayError, InvoiceGateway, Resolution,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TODAY: &str = "2024-05-02";

pub fn now() -> DateTime<FixedOffset> {
    bogota_offset()
        .with_ymd_and_hms(2024, 5, 2, 14, 37, 0)
        .single()
        .unwrap()
}

pub fn clock() -> FixedClock {
    FixedClock(now())
}

/// A valid FC dated [`TODAY`].
pub fn document(consecutivo: &str) -> Document {
    Document {
        tde_codigo: "01".into(),
        ofe_identificacion: "860011153".into(),
        adq_identificacion: "900123456".into(),
        rfa_resolucion: "18760000001".into(),
        rfa_prefijo: "SETT".into(),
        cdo_consecutivo: consecutivo.into(),
        cdo_fecha: TODAY.into(),
        cdo_hora: "14:37:00".into(),
        mon_codigo: "COP".into(),
        cdo_valor_sin_impuestos: "100000.00".into(),
        cdo_impuestos: "19000.00".into(),
        cdo_total: "119000.00".into(),
        cdo_retenciones_sugeridas: "0.00".into(),
        cdo_anticipo: "0.00".into(),
        cdo_redondeo: "0.00".into(),
        items: vec![DocumentItem {
            ddo_secuencia: "1".into(),
            ddo_descripcion_uno: "P".into(),
            ddo_cantidad: "1".into(),
            ddo_valor_unitario: "100000.00".into(),
            ddo_total: "100000.00".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[derive(Default)]
pub struct StubGateway {
    pub fail_auth: bool,
    /// Consecutives the stub reports as rejected by the provider.
    pub reject: Vec<String>,
    /// Delay before the stub answers a registration.
    pub delay: Option<Duration>,
    pub(crate) requests: Mutex<Vec<RegistrationRequest>>,
    pub(crate) resolution_calls: AtomicUsize,
}

impl StubGateway {
    pub fn requests(&self) -> Vec<RegistrationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn resolution_calls(&self) -> usize {
        self.resolution_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceGateway for StubGateway {
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
        self.requests.lock().unwrap().push(request.clone());
        let kind = request.documentos.non_empty_kinds()[0];
        let mut response = DocumentRegistrationResponse {
            lote: "lote-upstream-1".into(),
            message: "ok".into(),
            ..Default::default()
        };
        for doc in request.documentos.get(kind) {
            if self.reject.contains(&doc.cdo_consecutivo) {
                response.failed.push(fe_documents::FailedDocument::new(
                    kind,
                    doc,
                    vec!["Rechazado por la DIAN".into()],
                    now(),
                ));
            } else {
                response.processed.push(ProcessedDocument {
                    cdo_id: format!("id-{}", doc.cdo_consecutivo),
                    rfa_prefijo: doc.rfa_prefijo.clone(),
                    cdo_consecutivo: doc.cdo_consecutivo.clone(),
                    fecha_procesamiento: TODAY.into(),
                    hora_procesamiento: "14:37:05".into(),
                });
            }
        }
        Ok(response)
    }

    async fn get_resolutions(&self, _nit: &str) -> Result<Vec<Resolution>, GatewayError> {
        self.resolution_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Resolution {
            numero: "18760000001".into(),
            prefijo: "SETT".into(),
            ..Default::default()
        }])
    }

    async fn get_documents(&self, _query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        Ok(Vec::new())
    }

    async fn get_document_by_number(
        &self,
        query: &DocumentByNumberQuery,
    ) -> Result<Vec<Value>, GatewayError> {
        Err(GatewayError::NotFound(query.document_number.clone()))
    }

    async fn get_received_documents(&self, _query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        Ok(Vec::new())
    }

    async fn register_event(
        &self,
        _event: &EventRegistration,
        _issuer_nit: &str,
        _business_name: &str,
    ) -> Result<EventRegistrationResult, GatewayError> {
        Ok(EventRegistrationResult::default())
    }

    async fn search_estados_dian(&self, _ofe: &str, document: &str) -> Result<EstadoDian, GatewayError> {
        Err(GatewayError::NotFound(document.to_string()))
    }
}

