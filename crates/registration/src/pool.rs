//! Bounded fan-out of enrichment over one batch.
//!
//! Jobs flow through a bounded channel shared by `workers` tasks; results come
//! back on a second bounded channel. Caches live in a `BatchCache` owned by
//! this call and die with it.

use crate::enrich::{BatchCache, Enricher};
use fe_common::{current_correlation_id, with_correlation_id, Clock};
use fe_documents::{processing_stamp, Document, DocumentType, FailedDocument};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

pub const DEFAULT_WORKER_COUNT: usize = 10;

struct Job {
    index: usize,
    doc: Document,
}

struct JobResult {
    index: usize,
    outcome: Result<Document, FailedDocument>,
}

pub struct WorkerPool {
    workers: usize,
    enricher: Arc<Enricher>,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    pub fn new(workers: usize, enricher: Arc<Enricher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            workers: workers.max(1),
            enricher,
            clock,
        }
    }

    /// Enrich every document. Returns `(valid, failed)`; `valid` keeps input
    /// order, `failed` is in completion order. When `cancel` resolves first,
    /// returns what has been collected so far.
    pub async fn process_documents<C>(
        &self,
        docs: Vec<Document>,
        kind: DocumentType,
        cancel: C,
    ) -> (Vec<Document>, Vec<FailedDocument>)
    where
        C: Future<Output = ()>,
    {
        let total = docs.len();
        if total == 0 {
            return (Vec::new(), Vec::new());
        }

        let capacity = self.workers * 2;
        let (job_tx, job_rx) = mpsc::channel::<Job>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let cache = Arc::new(BatchCache::default());
        let correlation_id = current_correlation_id();

        for worker_id in 0..self.workers.min(total) {
            let worker = Worker {
                id: worker_id,
                jobs: job_rx.clone(),
                results: result_tx.clone(),
                enricher: self.enricher.clone(),
                clock: self.clock.clone(),
                cache: cache.clone(),
                kind,
            };
            let scope = correlation_id.clone();
            tokio::spawn(async move {
                match scope {
                    Some(id) => with_correlation_id(id, worker.run()).await,
                    None => worker.run().await,
                }
            });
        }
        drop(result_tx);

        let feeder = tokio::spawn(async move {
            for (index, doc) in docs.into_iter().enumerate() {
                if job_tx.send(Job { index, doc }).await.is_err() {
                    break;
                }
            }
        });

        let mut valid: Vec<(usize, Document)> = Vec::with_capacity(total);
        let mut failed: Vec<FailedDocument> = Vec::new();
        let mut received = 0usize;
        tokio::pin!(cancel);

        while received < total {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    warn!(received, total, document_type = %kind, "document processing cancelled");
                    break;
                }
                next = result_rx.recv() => match next {
                    Some(JobResult { index, outcome }) => {
                        received += 1;
                        match outcome {
                            Ok(doc) => valid.push((index, doc)),
                            Err(f) => failed.push(f),
                        }
                    }
                    None => break,
                },
            }
        }
        feeder.abort();

        valid.sort_by_key(|(index, _)| *index);
        debug!(
            document_type = %kind,
            valid = valid.len(),
            failed = failed.len(),
            "worker pool finished"
        );
        (valid.into_iter().map(|(_, d)| d).collect(), failed)
    }
}

struct Worker {
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    enricher: Arc<Enricher>,
    clock: Arc<dyn Clock>,
    cache: Arc<BatchCache>,
    kind: DocumentType,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = self.jobs.lock().await.recv().await;
            let Some(Job { index, mut doc }) = next else {
                break;
            };
            let consecutivo = doc.cdo_consecutivo.clone();
            let prefijo = doc.rfa_prefijo.clone();

            let result = AssertUnwindSafe(self.enricher.enrich(&mut doc, self.kind, &self.cache))
                .catch_unwind()
                .await;
            let outcome = match result {
                Ok(Ok(())) => Ok(doc),
                Ok(Err(e)) => {
                    debug!(index = index + 1, error = %e, "document enrichment failed");
                    Err(FailedDocument::new(self.kind, &doc, vec![e.to_string()], self.clock.now()))
                }
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    error!(worker = self.id, index = index + 1, reason = %reason, "worker panicked");
                    let (fecha, hora) = processing_stamp(self.clock.now());
                    Err(FailedDocument {
                        documento: self.kind.as_str().to_string(),
                        consecutivo,
                        prefijo,
                        errors: vec![format!("error interno procesando el documento {}: {reason}", index + 1)],
                        fecha_procesamiento: fecha,
                        hora_procesamiento: hora,
                    })
                }
            };

            if self.results.send(JobResult { index, outcome }).await.is_err() {
                break;
            }
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
