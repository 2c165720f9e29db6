use crate::cancel::Cancellation;
use crate::enrich::{BatchCache, Enricher};
use crate::pool::{WorkerPool, DEFAULT_WORKER_COUNT};
use crate::{RegistrationError, ALL_FAILED_MESSAGE};
use fe_common::Clock;
use fe_documents::{
    validate_document, Document, DocumentBatch, DocumentRegistrationResponse, DocumentType,
    FailedDocument, RegistrationRequest,
};
use fe_providers::InvoiceGateway;
use std::sync::Arc;
use tracing::{debug, info};

/// Validate, enrich and dispatch one batch. Stateless apart from its
/// collaborators; safe to share across requests.
pub struct RegistrationCoordinator {
    gateway: Arc<dyn InvoiceGateway>,
    enricher: Arc<Enricher>,
    clock: Arc<dyn Clock>,
    workers: usize,
}

impl RegistrationCoordinator {
    pub fn new(gateway: Arc<dyn InvoiceGateway>, enricher: Arc<Enricher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            enricher,
            clock,
            workers: DEFAULT_WORKER_COUNT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a run of documents taken from a larger submission;
    /// `first_index` is the 1-based position of `docs[0]` in that submission.
    /// Stops enrichment and skips or abandons the upstream call once `cancel`
    /// fires.
    pub async fn register_group(
        &self,
        kind: DocumentType,
        docs: Vec<Document>,
        first_index: usize,
        cancel: &Cancellation,
    ) -> Result<DocumentRegistrationResponse, RegistrationError> {
        let today = self.clock.today();
        for (offset, doc) in docs.iter().enumerate() {
            validate_document(doc, kind, first_index + offset, today)?;
        }

        let (valid, mut failed) = if self.enricher.has_store() && docs.len() > 1 {
            WorkerPool::new(self.workers, self.enricher.clone(), self.clock.clone())
                .process_documents(docs, kind, cancel.cancelled())
                .await
        } else {
            self.enrich_inline(docs, kind, cancel).await
        };
        if cancel.is_cancelled() {
            info!(document_type = %kind, first_index, "registration cancelled before dispatch");
            return Err(RegistrationError::Cancelled);
        }

        if valid.is_empty() {
            info!(document_type = %kind, failed = failed.len(), "no document survived enrichment");
            return Ok(DocumentRegistrationResponse {
                lote: self.clock.now().format("lote-%Y%m%d-%H%M%S").to_string(),
                message: ALL_FAILED_MESSAGE.to_string(),
                processed: Vec::new(),
                failed,
            });
        }

        info!(
            document_type = %kind,
            valid = valid.len(),
            failed = failed.len(),
            "dispatching documents upstream"
        );
        let request = RegistrationRequest {
            documentos: DocumentBatch::of(kind, valid),
        };
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(document_type = %kind, first_index, "registration cancelled during dispatch");
                return Err(RegistrationError::Cancelled);
            }
            response = self.gateway.register_document(&request) => response?,
        };
        response.failed.append(&mut failed);
        Ok(response)
    }

    pub async fn register_single(
        &self,
        kind: DocumentType,
        doc: Document,
        index: usize,
        cancel: &Cancellation,
    ) -> Result<DocumentRegistrationResponse, RegistrationError> {
        self.register_group(kind, vec![doc], index, cancel).await
    }

    async fn enrich_inline(
        &self,
        docs: Vec<Document>,
        kind: DocumentType,
        cancel: &Cancellation,
    ) -> (Vec<Document>, Vec<FailedDocument>) {
        let cache = BatchCache::default();
        let mut valid = Vec::with_capacity(docs.len());
        let mut failed = Vec::new();
        for mut doc in docs {
            if cancel.is_cancelled() {
                break;
            }
            match self.enricher.enrich(&mut doc, kind, &cache).await {
                Ok(()) => valid.push(doc),
                Err(e) => {
                    debug!(consecutivo = %doc.cdo_consecutivo, error = %e, "document enrichment failed");
                    failed.push(FailedDocument::new(kind, &doc, vec![e.to_string()], self.clock.now()));
                }
            }
        }
        (valid, failed)
    }
}
