//! fe_audit_spec
//!
//! Strongly-typed audit record for one upstream HTTP exchange.
//! Header maps and bodies are stored already sanitized; producing them is the
//! traced transport's job, not the sink's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type SanitizedHeaders = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of `provider_audit_log`. Append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderAuditRecord {
    pub id: Uuid,
    pub correlation_id: CorrelationId,
    pub provider: String,  // "numrot"
    pub operation: String, // "register_document", "token", ...
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers_req: SanitizedHeaders,
    #[serde(default)]
    pub body_req: Option<serde_json::Value>,
    /// Absent when the transport failed before a response arrived.
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub headers_resp: SanitizedHeaders,
    #[serde(default)]
    pub body_resp: Option<serde_json::Value>,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProviderAuditRecord {
    pub fn new(
        correlation_id: CorrelationId,
        provider: impl Into<String>,
        operation: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            provider: provider.into(),
            operation: operation.into(),
            method: method.into(),
            url: url.into(),
            headers_req: SanitizedHeaders::new(),
            body_req: None,
            status: None,
            headers_resp: SanitizedHeaders::new(),
            body_resp: None,
            duration_ms: 0,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if (200..400).contains(&s)) && self.error.is_none()
    }
}
