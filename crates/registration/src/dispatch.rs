//! Buffered registration: the submission is cut into groups, each group is
//! registered on its own task, and the per-group responses are folded into one
//! report. Group failures never abort their siblings.

use crate::cancel::Cancellation;
use crate::pool::panic_message;
use crate::{RegistrationCoordinator, RegistrationError};
use fe_common::{current_correlation_id, with_correlation_id};
use fe_documents::{
    fallback_lote, processing_stamp, Document, DocumentRegistrationResponse, DocumentType,
    FailedDocument,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, warn};

pub const MSG_ALL_PROCESSED: &str = "Documentos procesados exitosamente";
pub const MSG_ALL_FAILED: &str = "Error al procesar documentos";
pub const MSG_PARTIAL: &str = "Algunos documentos fueron procesados, otros fallaron";
pub const MSG_DONE: &str = "Procesamiento completado";

pub fn summary_message(processed: usize, failed: usize) -> &'static str {
    match (processed, failed) {
        (p, 0) if p > 0 => MSG_ALL_PROCESSED,
        (0, f) if f > 0 => MSG_ALL_FAILED,
        (p, f) if p > 0 && f > 0 => MSG_PARTIAL,
        _ => MSG_DONE,
    }
}

#[derive(Debug)]
pub struct BufferedOutcome {
    pub response: DocumentRegistrationResponse,
}

impl BufferedOutcome {
    pub fn has_failures(&self) -> bool {
        self.response.has_failures()
    }
}

struct Group {
    first_index: usize,
    docs: Vec<Document>,
}

/// Identity of a document kept outside its task, for failure reports.
#[derive(Clone)]
struct Stub {
    consecutivo: String,
    prefijo: String,
}

/// Register `docs` in groups of `group_size`, at most `concurrency` groups at a
/// time. Results are folded in completion order.
///
/// When every group failed with an upstream error and nothing was processed,
/// the first such error is returned so the caller can surface it as a gateway
/// failure instead of a per-document report.
///
/// Groups run on their own tasks; each one watches `cancel` so that dropping
/// the request also stops groups already in flight.
pub async fn dispatch_buffered(
    coordinator: Arc<RegistrationCoordinator>,
    kind: DocumentType,
    docs: Vec<Document>,
    group_size: usize,
    concurrency: usize,
    cancel: &Cancellation,
) -> Result<BufferedOutcome, RegistrationError> {
    let group_size = group_size.max(1);
    let mut groups = Vec::new();
    let mut docs = docs.into_iter().peekable();
    let mut next_index = 1;
    while docs.peek().is_some() {
        let chunk: Vec<Document> = docs.by_ref().take(group_size).collect();
        let first_index = next_index;
        next_index += chunk.len();
        groups.push(Group { first_index, docs: chunk });
    }
    let group_count = groups.len();
    let concurrency = concurrency.clamp(1, group_count.max(1));
    let correlation_id = current_correlation_id();

    let results: Vec<(Vec<Stub>, Result<Result<DocumentRegistrationResponse, RegistrationError>, String>)> =
        stream::iter(groups)
            .map(|group| {
                let coordinator = coordinator.clone();
                let cancel = cancel.clone();
                let scope = correlation_id.clone();
                let stubs: Vec<Stub> = group
                    .docs
                    .iter()
                    .map(|d| Stub {
                        consecutivo: d.cdo_consecutivo.clone(),
                        prefijo: d.rfa_prefijo.clone(),
                    })
                    .collect();
                let task = tokio::spawn(async move {
                    let work = coordinator.register_group(kind, group.docs, group.first_index, &cancel);
                    match scope {
                        Some(id) => with_correlation_id(id, work).await,
                        None => work.await,
                    }
                });
                async move {
                    let joined = task.await.map_err(|e| {
                        if e.is_panic() {
                            panic_message(&*e.into_panic())
                        } else {
                            "task cancelled".to_string()
                        }
                    });
                    (stubs, joined)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    let now = coordinator.clock().now();
    let (fecha, hora) = processing_stamp(now);
    let failed_entry = |stub: &Stub, reason: String| FailedDocument {
        documento: kind.as_str().to_string(),
        consecutivo: stub.consecutivo.clone(),
        prefijo: stub.prefijo.clone(),
        errors: vec![reason],
        fecha_procesamiento: fecha.clone(),
        hora_procesamiento: hora.clone(),
    };

    let mut merged = DocumentRegistrationResponse::default();
    let mut upstream_errors = 0usize;
    let mut first_upstream_error: Option<RegistrationError> = None;

    for (stubs, joined) in results {
        match joined {
            Ok(Ok(mut resp)) => {
                if merged.lote.is_empty() && !resp.lote.trim().is_empty() {
                    merged.lote = resp.lote.clone();
                }
                merged.processed.append(&mut resp.processed);
                merged.failed.append(&mut resp.failed);
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                warn!(documents = stubs.len(), error = %reason, "document group failed");
                merged.failed.extend(stubs.iter().map(|s| failed_entry(s, reason.clone())));
                if matches!(e, RegistrationError::Gateway(_)) {
                    upstream_errors += 1;
                    first_upstream_error.get_or_insert(e);
                }
            }
            Err(panic) => {
                error!(documents = stubs.len(), reason = %panic, "document group panicked");
                let reason = format!("error interno procesando el documento: {panic}");
                merged.failed.extend(stubs.iter().map(|s| failed_entry(s, reason.clone())));
            }
        }
    }

    if merged.processed.is_empty() && upstream_errors == group_count {
        if let Some(e) = first_upstream_error {
            return Err(e);
        }
    }

    if merged.lote.is_empty() {
        merged.lote = fallback_lote(&now);
    }
    merged.message = summary_message(merged.processed.len(), merged.failed.len()).to_string();
    Ok(BufferedOutcome { response: merged })
}
