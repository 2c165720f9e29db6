use crate::{AuditLogError, AuditSink};
use async_trait::async_trait;
use fe_audit_spec::ProviderAuditRecord;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<ProviderAuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ProviderAuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn save(&self, record: &ProviderAuditRecord) -> Result<(), AuditLogError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| AuditLogError::Task(format!("memory sink poisoned: {e}")))?;
        records.push(record.clone());
        Ok(())
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ProviderAuditRecord>, AuditLogError> {
        let mut out: Vec<ProviderAuditRecord> = self
            .records()
            .into_iter()
            .filter(|r| r.correlation_id.as_str() == correlation_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}
