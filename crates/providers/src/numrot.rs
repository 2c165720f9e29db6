use crate::transport::{OutboundRequest, TracedResponse, TracedTransport};
use crate::types::{
    DocumentByNumberQuery, DocumentQuery, EstadoDian, EventRegistration, EventRegistrationResult,
    Resolution,
};
use crate::{GatewayError, InvoiceGateway};
use async_trait::async_trait;
use chrono::Utc;
use fe_common::normalize_nit;
use fe_documents::{fallback_lote, DocumentRegistrationResponse, DocumentType, RegistrationRequest};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "/api/auth/token";
const REGISTER_PATH: &str = "/api/documentos/registrar";
const RESOLUTIONS_PATH: &str = "/api/resoluciones";
const DOCUMENTS_PATH: &str = "/api/documentos/emitidos";
const DOCUMENT_BY_NUMBER_PATH: &str = "/api/documentos/emitidos/numero";
const RECEIVED_PATH: &str = "/api/documentos/recibidos";
const EVENTS_PATH: &str = "/api/radian/eventos";
const ESTADOS_DIAN_PATH: &str = "/api/documentos/estados-dian";

/// Subtracted from the token lifetime so a token is never sent in its last
/// seconds.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    KeySecret { key: String, secret: String },
    UsernamePassword { username: String, password: String },
}

impl Credentials {
    fn payload(&self) -> Value {
        match self {
            Credentials::KeySecret { key, secret } => json!({ "key": key, "secret": secret }),
            Credentials::UsernamePassword { username, password } => {
                json!({ "username": username, "password": password })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumrotConfig {
    pub base_url: String,
    /// Support documents (DS) may live behind a different host.
    pub ds_base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub token_ttl: Duration,
}

impl Default for NumrotConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            ds_base_url: None,
            username: None,
            password: None,
            key: None,
            secret: None,
            token_ttl: Duration::from_secs(3300),
        }
    }
}

fn present(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl NumrotConfig {
    /// Key/secret wins over username/password when both are configured.
    pub fn credentials(&self) -> Result<Credentials, GatewayError> {
        if let (Some(key), Some(secret)) = (present(&self.key), present(&self.secret)) {
            return Ok(Credentials::KeySecret { key, secret });
        }
        if let (Some(username), Some(password)) = (present(&self.username), present(&self.password)) {
            return Ok(Credentials::UsernamePassword { username, password });
        }
        Err(GatewayError::Config(
            "either NUMROT_KEY/NUMROT_SECRET or NUMROT_USERNAME/NUMROT_PASSWORD must be set".into(),
        ))
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn ds_base(&self) -> &str {
        self.ds_base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.base())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct NumrotClient {
    config: NumrotConfig,
    credentials: Credentials,
    transport: Arc<TracedTransport>,
    token: Mutex<Option<CachedToken>>,
}

impl NumrotClient {
    pub fn new(config: NumrotConfig, transport: Arc<TracedTransport>) -> Result<Self, GatewayError> {
        if config.base().is_empty() {
            return Err(GatewayError::Config("NUMROT_BASE_URL is required".into()));
        }
        let credentials = config.credentials()?;
        Ok(Self {
            config,
            credentials,
            transport,
            token: Mutex::new(None),
        })
    }

    // ----------------------------
    // Token lifecycle
    // ----------------------------

    async fn bearer_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }
        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<CachedToken, GatewayError> {
        let url = format!("{}{TOKEN_PATH}", self.config.base());
        let req = OutboundRequest::new("token", Method::POST, url).json(&self.credentials.payload())?;
        let resp = self.transport.execute(req).await?;

        if matches!(resp.status, 401 | 403) {
            return Err(GatewayError::Authentication(format!(
                "token endpoint returned {}",
                resp.status
            )));
        }
        let resp = resp.ensure_success()?;
        let body: TokenResponse = resp.json()?;
        let value = body
            .access_token
            .or(body.token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GatewayError::Authentication("token missing in response".into()))?;

        let ttl = match body.expires_in {
            Some(secs) if secs > 0 => Duration::from_secs(secs).min(self.config.token_ttl),
            _ => self.config.token_ttl,
        };
        let ttl = ttl.saturating_sub(TOKEN_EXPIRY_SKEW.min(ttl / 10));
        info!(ttl_secs = ttl.as_secs(), "numrot token refreshed");

        Ok(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        })
    }

    /// Send with the cached token; a 401 drops it and retries once.
    async fn authorized(&self, req: OutboundRequest) -> Result<TracedResponse, GatewayError> {
        let token = self.bearer_token().await?;
        let resp = self.transport.execute(req.clone().bearer(&token)).await?;
        if resp.status != 401 {
            return Ok(resp);
        }

        warn!(operation = req.operation, "numrot rejected token, refreshing");
        self.invalidate_token().await;
        let token = self.bearer_token().await?;
        let operation = req.operation;
        let resp = self.transport.execute(req.bearer(&token)).await?;
        if resp.status == 401 {
            return Err(GatewayError::Authentication(format!(
                "{operation} rejected a freshly issued token"
            )));
        }
        Ok(resp)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base())
    }

    async fn query_list<B: serde::Serialize + ?Sized>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<Vec<Value>, GatewayError> {
        let req = OutboundRequest::new(operation, Method::POST, self.url(path)).json(body)?;
        let resp = self.authorized(req).await?.ensure_success()?;
        extract_list(resp.json()?)
    }
}

// ----------------------------
// Response envelopes
// ----------------------------

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Provider-reported failure inside a 2xx envelope.
fn provider_failure(obj: &Map<String, Value>) -> Option<String> {
    let flagged = obj.get("success").and_then(Value::as_bool) == Some(false)
        || matches!(obj.get("error"), Some(Value::String(s)) if !s.trim().is_empty())
        || matches!(obj.get("error"), Some(Value::Bool(true)));
    if !flagged {
        return None;
    }
    let message = ["message", "mensaje", "error"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !matches!(v, Value::Null | Value::Bool(_)))
        .map(value_text)
        .unwrap_or_else(|| "unknown provider failure".to_string());
    Some(message)
}

fn unwrap_envelope(value: Value) -> Result<Value, GatewayError> {
    match value {
        Value::Object(mut obj) => {
            if let Some(msg) = provider_failure(&obj) {
                return Err(GatewayError::Provider(msg));
            }
            for key in ["data", "Data", "documentos", "resultado"] {
                if let Some(inner) = obj.remove(key) {
                    return Ok(inner);
                }
            }
            Ok(Value::Object(obj))
        }
        other => Ok(other),
    }
}

fn extract_list(value: Value) -> Result<Vec<Value>, GatewayError> {
    match unwrap_envelope(value)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(obj) if obj.is_empty() => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

#[async_trait]
impl InvoiceGateway for NumrotClient {
    async fn register_document(
        &self,
        request: &RegistrationRequest,
    ) -> Result<DocumentRegistrationResponse, GatewayError> {
        let is_ds = request
            .documentos
            .non_empty_kinds()
            .contains(&DocumentType::DS);
        let base = if is_ds { self.config.ds_base() } else { self.config.base() };
        let url = format!("{base}{REGISTER_PATH}");

        let req = OutboundRequest::new("register_document", Method::POST, url).json(request)?;
        let resp = self.authorized(req).await?.ensure_success()?;
        let mut parsed: DocumentRegistrationResponse = resp.json()?;
        if parsed.lote.trim().is_empty() {
            parsed.lote = fallback_lote(&Utc::now());
        }
        debug!(
            lote = %parsed.lote,
            processed = parsed.processed.len(),
            failed = parsed.failed.len(),
            "numrot registration response"
        );
        Ok(parsed)
    }

    async fn get_resolutions(&self, nit: &str) -> Result<Vec<Resolution>, GatewayError> {
        let nit = normalize_nit(nit);
        if nit.is_empty() {
            return Err(GatewayError::Invalid("nit is required".into()));
        }
        let url = self.url(&format!("{RESOLUTIONS_PATH}/{nit}"));
        let resp = self
            .authorized(OutboundRequest::new("get_resolutions", Method::GET, url))
            .await?
            .ensure_success()?;
        extract_list(resp.json()?)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| GatewayError::Unmarshal(e.to_string())))
            .collect()
    }

    async fn get_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        self.query_list("get_documents", DOCUMENTS_PATH, query).await
    }

    async fn get_document_by_number(
        &self,
        query: &DocumentByNumberQuery,
    ) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        let req = OutboundRequest::new(
            "get_document_by_number",
            Method::POST,
            self.url(DOCUMENT_BY_NUMBER_PATH),
        )
        .json(query)?;
        let resp = self.authorized(req).await?;
        if resp.status == 404 {
            return Err(GatewayError::NotFound(query.document_number.clone()));
        }
        let docs = extract_list(resp.ensure_success()?.json()?)?;
        if docs.is_empty() {
            return Err(GatewayError::NotFound(query.document_number.clone()));
        }
        Ok(docs)
    }

    async fn get_received_documents(&self, query: &DocumentQuery) -> Result<Vec<Value>, GatewayError> {
        query.validate()?;
        self.query_list("get_received_documents", RECEIVED_PATH, query).await
    }

    async fn register_event(
        &self,
        event: &EventRegistration,
        issuer_nit: &str,
        business_name: &str,
    ) -> Result<EventRegistrationResult, GatewayError> {
        let kind = event.validate()?;
        let payload = event.to_wire(kind, &normalize_nit(issuer_nit), business_name);
        let req = OutboundRequest::new("register_event", Method::POST, self.url(EVENTS_PATH)).json(&payload)?;
        let resp = self.authorized(req).await?.ensure_success()?;
        let inner = unwrap_envelope(resp.json()?)?;
        serde_json::from_value(inner).map_err(|e| GatewayError::Unmarshal(e.to_string()))
    }

    async fn search_estados_dian(&self, ofe: &str, document: &str) -> Result<EstadoDian, GatewayError> {
        if document.trim().is_empty() {
            return Err(GatewayError::Invalid("cufe is required".into()));
        }
        let url = Url::parse_with_params(
            &self.url(ESTADOS_DIAN_PATH),
            &[("ofe", normalize_nit(ofe)), ("documento", document.trim().to_string())],
        )
        .map_err(|e| GatewayError::Config(format!("invalid NUMROT_BASE_URL: {e}")))?;

        let resp = self
            .authorized(OutboundRequest::new("search_estados_dian", Method::GET, url.as_str()))
            .await?;
        if resp.status == 404 {
            return Err(GatewayError::NotFound(document.to_string()));
        }
        let inner = match unwrap_envelope(resp.ensure_success()?.json()?)? {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            Value::Array(_) | Value::Null => return Err(GatewayError::NotFound(document.to_string())),
            other => other,
        };
        let mut estado: EstadoDian =
            serde_json::from_value(inner).map_err(|e| GatewayError::Unmarshal(e.to_string()))?;
        if !estado.has_links() {
            return Err(GatewayError::NotFound(document.to_string()));
        }
        if estado.cufe.is_empty() {
            estado.cufe = document.trim().to_string();
        }
        Ok(estado)
    }
}
