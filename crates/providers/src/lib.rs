//! fe_providers
//!
//! Upstream invoicing gateway access.
//! - `TracedTransport` is the only path to the network: correlation header,
//!   sanitized logging, detached audit write per exchange
//! - `NumrotClient` owns the token lifecycle and the provider's wire shapes
//! - `InvoiceGateway` is the seam the registration pipeline and HTTP layer
//!   depend on
//!
//! Error `Display` strings are matched by callers' classifiers; keep the
//! leading phrases stable.

mod numrot;
mod transport;
mod types;

pub use numrot::{Credentials, NumrotClient, NumrotConfig};
pub use transport::{OutboundRequest, TracedResponse, TracedTransport, TransportConfig};
pub use types::{
    DocumentByNumberQuery, DocumentQuery, EstadoDian, EventRegistration, EventRegistrationResult,
    EventType, Resolution,
};

use async_trait::async_trait;
use fe_documents::{DocumentRegistrationResponse, RegistrationRequest};
use serde_json::Value;
use thiserror::Error;

pub const PROVIDER_NAME: &str = "numrot";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("numrot authentication failed: {0}")]
    Authentication(String),
    #[error("marshal request: {0}")]
    Marshal(#[from] serde_json::Error),
    #[error("execute request: {0}")]
    Execute(String),
    #[error("read response body: {0}")]
    ReadBody(String),
    #[error("unexpected status code {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("unmarshal response: {0}")]
    Unmarshal(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("numrot configuration error: {0}")]
    Config(String),
    /// Caller-fixable request problem detected before any network call.
    #[error("{0}")]
    Invalid(String),
}

#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    async fn register_document(
        &self,
        request: &RegistrationRequest,
    ) -> Result<DocumentRegistrationResponse, GatewayError>;

    async fn get_resolutions(&self, nit: &str) -> Result<Vec<Resolution>, GatewayError>;

    async fn get_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError>;

    async fn get_document_by_number(
        &self,
        query: &DocumentByNumberQuery,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn get_received_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError>;

    async fn register_event(
        &self,
        event: &EventRegistration,
        issuer_nit: &str,
        business_name: &str,
    ) -> Result<EventRegistrationResult, GatewayError>;

    /// DIAN status lookup by CUFE or document number; carries the PDF/XML links.
    async fn search_estados_dian(&self, ofe: &str, document: &str) -> Result<EstadoDian, GatewayError>;
}
