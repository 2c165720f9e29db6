use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fe_counterparty::StoreError;
use fe_documents::ValidationError;
use fe_providers::GatewayError;
use fe_registration::RegistrationError;
use serde::Serialize;
use thiserror::Error;

pub const TITLE_VALIDATION: &str = "Error de validación";
pub const TITLE_NOT_FOUND: &str = "Recurso no encontrado";
pub const TITLE_CONFLICT: &str = "Conflicto";
pub const TITLE_AUTHENTICATION: &str = "Error de Autenticación";
pub const TITLE_PROVIDER: &str = "Error del proveedor";
pub const TITLE_UNAVAILABLE: &str = "Servicio no disponible";
pub const TITLE_INTERNAL: &str = "Error interno del servidor";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Opaque failure; status comes from [`classify`].
    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Registration(RegistrationError::Validation(e))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn status_and_title(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, TITLE_VALIDATION),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, TITLE_NOT_FOUND),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, TITLE_UNAVAILABLE),
            ApiError::Registration(RegistrationError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, TITLE_VALIDATION)
            }
            ApiError::Registration(RegistrationError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, TITLE_UNAVAILABLE)
            }
            ApiError::Registration(RegistrationError::Gateway(e)) | ApiError::Gateway(e) => {
                gateway_status(e)
            }
            ApiError::Store(e) => match e {
                StoreError::Conflict { .. } => (StatusCode::CONFLICT, TITLE_CONFLICT),
                StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, TITLE_NOT_FOUND),
                StoreError::Invalid(_) => (StatusCode::BAD_REQUEST, TITLE_VALIDATION),
                StoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, TITLE_INTERNAL),
            },
            ApiError::Internal(msg) => classify(msg),
        }
    }
}

fn gateway_status(e: &GatewayError) -> (StatusCode, &'static str) {
    match e {
        GatewayError::Authentication(_) => (StatusCode::BAD_GATEWAY, TITLE_AUTHENTICATION),
        GatewayError::Invalid(_) => (StatusCode::BAD_REQUEST, TITLE_VALIDATION),
        GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, TITLE_NOT_FOUND),
        GatewayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, TITLE_INTERNAL),
        GatewayError::Marshal(_)
        | GatewayError::Execute(_)
        | GatewayError::ReadBody(_)
        | GatewayError::UnexpectedStatus { .. }
        | GatewayError::Unmarshal(_)
        | GatewayError::Provider(_) => (StatusCode::BAD_GATEWAY, TITLE_PROVIDER),
    }
}

/// Status for an error known only by its message. Checked in order: client
/// errors, missing resources, conflicts, upstream failures.
pub fn classify(message: &str) -> (StatusCode, &'static str) {
    let m = message.to_lowercase();
    let invalid_format = m.contains("invalid ") && m.contains(" format");
    if m.contains("required")
        || invalid_format
        || m.contains("must be today")
        || m.contains("fad09e")
        || m.contains("does not match document type")
        || m.contains("documentos fallidos")
    {
        return (StatusCode::BAD_REQUEST, TITLE_VALIDATION);
    }
    if m.contains("not found") || m.contains("no existe") {
        return (StatusCode::NOT_FOUND, TITLE_NOT_FOUND);
    }
    if m.contains("ya existe") {
        return (StatusCode::CONFLICT, TITLE_CONFLICT);
    }
    if m.contains("authentication failed") {
        return (StatusCode::BAD_GATEWAY, TITLE_AUTHENTICATION);
    }
    const UPSTREAM: [&str; 6] = [
        "unexpected status code",
        "execute request",
        "read response body",
        "unmarshal response",
        "marshal request",
        "provider error",
    ];
    if UPSTREAM.iter().any(|needle| m.contains(needle)) {
        return (StatusCode::BAD_GATEWAY, TITLE_PROVIDER);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, TITLE_INTERNAL)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title) = self.status_and_title();
        let detail = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %detail, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %detail, "request rejected");
        }
        let body = ErrorBody {
            message: title.to_string(),
            errors: vec![detail],
        };
        (status, Json(body)).into_response()
    }
}
