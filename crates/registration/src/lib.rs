//! fe_registration
//!
//! The document registration pipeline:
//! validate (fe_documents) -> enrich from master data -> dispatch upstream ->
//! merge enrichment failures with the gateway's own report.
//!
//! - `Enricher` fills counterparty and issuer fields on one document
//! - `WorkerPool` fans enrichment out over a batch with per-batch memoization
//! - `RegistrationCoordinator` is the single entry point used by the HTTP layer
//! - `dispatch` holds the per-document fan-out used for buffered responses
//! - `Cancellation` ties all of the above to the lifetime of the HTTP request

mod cancel;
mod coordinator;
mod dispatch;
mod enrich;
mod pool;

#[cfg(test)]
mod testing;

pub use cancel::{cancellation, CancelGuard, Cancellation};
pub use coordinator::RegistrationCoordinator;
pub use dispatch::{dispatch_buffered, summary_message, BufferedOutcome};
pub use enrich::{EnrichError, Enricher, IssuerProfile};
pub use pool::{panic_message, WorkerPool, DEFAULT_WORKER_COUNT};

use fe_documents::ValidationError;
use fe_providers::GatewayError;
use thiserror::Error;

pub const ALL_FAILED_MESSAGE: &str = "Todos los documentos fallaron la validación";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("registration cancelled: the caller went away")]
    Cancelled,
}
