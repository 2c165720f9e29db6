//! Incremental registration responses.
//!
//! Documents are registered one at a time in input order and each result is
//! written to the body as soon as it is known:
//!
//! ```text
//! {"streaming":true,"total_documents":N,"results":[
//! {...},
//! {...}],"summary":{...}}
//! ```
//!
//! The status line is always 200; per-document failures live in the results.

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use fe_common::{current_correlation_id, with_correlation_id};
use fe_documents::{
    fallback_lote, processing_stamp, Document, DocumentRegistrationResponse, DocumentType,
};
use fe_registration::{
    cancellation, panic_message, summary_message, RegistrationCoordinator, RegistrationError,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

const STREAM_BUFFER: usize = 8;
const EMPTY_UPSTREAM_REPLY: &str = "respuesta vacía del proveedor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamedResult {
    /// 1-based position in the submitted array.
    pub index: usize,
    pub prefix: String,
    pub consecutive: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lote: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cdo_id: String,
    #[serde(default)]
    pub fecha_procesamiento: String,
    #[serde(default)]
    pub hora_procesamiento: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub lote: String,
    pub message: String,
}

type Outcome = Result<Result<DocumentRegistrationResponse, RegistrationError>, Box<dyn Any + Send>>;

struct Slot {
    index: usize,
    prefix: String,
    consecutive: String,
}

impl Slot {
    fn failed(self, errors: Vec<String>, fecha: String, hora: String) -> StreamedResult {
        StreamedResult {
            index: self.index,
            prefix: self.prefix,
            consecutive: self.consecutive,
            status: ResultStatus::Failed,
            lote: String::new(),
            cdo_id: String::new(),
            fecha_procesamiento: fecha,
            hora_procesamiento: hora,
            errors,
        }
    }

    fn resolve(self, outcome: Outcome, stamp: (String, String)) -> (StreamedResult, String) {
        let (fecha, hora) = stamp;
        match outcome {
            Ok(Ok(resp)) => {
                let lote = resp.lote;
                if let Some(done) = resp.processed.into_iter().next() {
                    let result = StreamedResult {
                        index: self.index,
                        prefix: self.prefix,
                        consecutive: self.consecutive,
                        status: ResultStatus::Processed,
                        lote: lote.clone(),
                        cdo_id: done.cdo_id,
                        fecha_procesamiento: or_else(done.fecha_procesamiento, fecha),
                        hora_procesamiento: or_else(done.hora_procesamiento, hora),
                        errors: Vec::new(),
                    };
                    return (result, lote);
                }
                let result = match resp.failed.into_iter().next() {
                    Some(f) => self.failed(
                        f.errors,
                        or_else(f.fecha_procesamiento, fecha),
                        or_else(f.hora_procesamiento, hora),
                    ),
                    None => self.failed(vec![EMPTY_UPSTREAM_REPLY.to_string()], fecha, hora),
                };
                (result, lote)
            }
            Ok(Err(e)) => (self.failed(vec![e.to_string()], fecha, hora), String::new()),
            Err(panic) => {
                let reason = format!(
                    "error interno procesando el documento {}: {}",
                    self.index,
                    panic_message(&*panic)
                );
                (self.failed(vec![reason], fecha, hora), String::new())
            }
        }
    }
}

fn or_else(value: String, fallback: String) -> String {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Start registering `docs` in the background and return a response whose
/// body yields each result as it completes.
pub fn stream_registration(
    coordinator: Arc<RegistrationCoordinator>,
    kind: DocumentType,
    docs: Vec<Document>,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(STREAM_BUFFER);
    let producer = produce(coordinator, kind, docs, tx);
    match current_correlation_id() {
        Some(id) => tokio::spawn(with_correlation_id(id, producer)),
        None => tokio::spawn(producer),
    };

    let mut response = Body::from_stream(ReceiverStream::new(rx)).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn produce(
    coordinator: Arc<RegistrationCoordinator>,
    kind: DocumentType,
    docs: Vec<Document>,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) {
    let total = docs.len();
    // Cancels work still running for this stream once the producer returns.
    let (guard, cancel) = cancellation();
    let header = format!(r#"{{"streaming":true,"total_documents":{total},"results":["#);
    if tx.send(Ok(Bytes::from(header))).await.is_err() {
        warn!(total, "client disconnected before the first result");
        return;
    }

    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut lote = String::new();

    for (offset, doc) in docs.into_iter().enumerate() {
        if tx.is_closed() {
            warn!(sent = offset, total, "client disconnected, abandoning registration stream");
            return;
        }
        let slot = Slot {
            index: offset + 1,
            prefix: doc.rfa_prefijo.clone(),
            consecutive: doc.cdo_consecutivo.clone(),
        };
        let work = AssertUnwindSafe(coordinator.register_single(kind, doc, slot.index, &cancel))
            .catch_unwind();
        let outcome = tokio::select! {
            outcome = work => outcome,
            _ = tx.closed() => {
                guard.cancel();
                warn!(index = slot.index, total, "client disconnected mid-document, cancelling registration");
                return;
            }
        };
        let stamp = processing_stamp(coordinator.clock().now());
        let (result, upstream_lote) = slot.resolve(outcome, stamp);

        match result.status {
            ResultStatus::Processed => processed += 1,
            ResultStatus::Failed => failed += 1,
        }
        if lote.is_empty() && !upstream_lote.trim().is_empty() {
            lote = upstream_lote;
        }

        let mut chunk = String::new();
        if offset > 0 {
            chunk.push_str(",\n");
        }
        match serde_json::to_string(&result) {
            Ok(json) => chunk.push_str(&json),
            Err(e) => {
                error!(index = result.index, error = %e, "encode streamed result");
                chunk.push_str(&format!(
                    r#"{{"index":{},"status":"failed","errors":["encode result"]}}"#,
                    result.index
                ));
            }
        }
        if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
            guard.cancel();
            warn!(index = result.index, total, "client disconnected, abandoning registration stream");
            return;
        }
    }

    if lote.is_empty() {
        lote = fallback_lote(&coordinator.clock().now());
    }
    let summary = StreamSummary {
        total,
        processed,
        failed,
        lote,
        message: summary_message(processed, failed).to_string(),
    };
    let footer = match serde_json::to_string(&summary) {
        Ok(json) => format!(r#"],"summary":{json}}}"#),
        Err(e) => {
            error!(error = %e, "encode stream summary");
            "]}".to_string()
        }
    };
    if tx.send(Ok(Bytes::from(footer))).await.is_err() {
        warn!(total, "client disconnected before the summary");
        return;
    }
    info!(total, processed, failed, lote = %summary.lote, "registration stream finished");
}
