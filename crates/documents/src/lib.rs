//! fe_documents
//!
//! OpenETL-shaped document model for the registration pipeline:
//! - `Document` / `DocumentBatch` as received from the back-office
//! - per-document outcomes and the batch response returned to callers
//! - the pure per-document validator

pub mod model;
pub mod outcome;
pub mod validate;

pub use model::{
    fill_if_blank, is_blank, Document, DocumentBatch, DocumentItem, DocumentType, RegistrationRequest,
};
pub use outcome::{fallback_lote, processing_stamp, DocumentRegistrationResponse, FailedDocument, ProcessedDocument};
pub use validate::{validate_batch_shape, validate_document, ValidationError};
