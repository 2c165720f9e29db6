//! fe_audit_log
//!
//! Append-only persistence of provider audit records.
//! - `AuditSink` is the seam the traced transport writes through
//! - `PgAuditSink` stores rows in `provider_audit_log` (JSONB headers/bodies)
//! - `JsonlAuditSink` appends hash-chained JSON lines for database-less runs
//! - `MemoryAuditSink` keeps records in process (tests, dry runs)

mod jsonl;
mod memory;
mod postgres;

pub use jsonl::{compute_line_hash, genesis_hash, verify_log, AuditLine, JsonlAuditSink};
pub use memory::MemoryAuditSink;
pub use postgres::PgAuditSink;

use async_trait::async_trait;
use fe_audit_spec::ProviderAuditRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("canonical json error: {0}")]
    Canon(#[from] fe_common::CanonError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("hash mismatch at line {line}: expected {expected}, got {got}")]
    HashMismatch { line: usize, expected: String, got: String },
    #[error("audit writer task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn save(&self, record: &ProviderAuditRecord) -> Result<(), AuditLogError>;

    /// Records for one correlation id, newest first.
    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ProviderAuditRecord>, AuditLogError>;

    fn label(&self) -> &'static str;
}
