//! Every upstream exchange goes through [`TracedTransport::execute`].
//!
//! Request and response bodies are fully buffered, so the caller gets an
//! owned [`TracedResponse`] and the audit record is built from the same bytes.
//! The audit write runs on its own task with its own timeout: the caller's
//! future may be dropped as soon as `execute` returns.

use crate::GatewayError;
use bytes::Bytes;
use fe_audit_log::AuditSink;
use fe_audit_spec::{CorrelationId, ProviderAuditRecord};
use fe_common::correlation_id_or_fallback;
use fe_redaction::{sanitize_headers, sanitize_url, BodySanitizer, DEFAULT_MAX_BODY_SIZE};
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const MAX_CONCURRENT_REQUESTS_CAP: usize = 200;
pub const MAX_CONNS_PER_HOST_CAP: usize = 100;

const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);
const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const ERROR_PREVIEW_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub provider: String,
    /// Per-call ceiling; never below 60 s.
    pub api_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_conns_per_host: usize,
    pub max_body_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: crate::PROVIDER_NAME.to_string(),
            api_timeout: Duration::from_secs(300),
            max_concurrent_requests: 50,
            max_conns_per_host: 50,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Audit/log label, e.g. `register_document`.
    pub operation: &'static str,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(operation: &'static str, method: Method, url: impl Into<String>) -> Self {
        Self {
            operation,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, GatewayError> {
        let bytes = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn bearer(mut self, token: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            self.headers.insert(AUTHORIZATION, value);
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct TracedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TracedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|e| GatewayError::Unmarshal(e.to_string()))
    }

    /// Body text bounded for error messages.
    pub fn preview(&self) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(ERROR_PREVIEW_CHARS)
            .collect()
    }

    pub fn ensure_success(self) -> Result<Self, GatewayError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GatewayError::UnexpectedStatus {
                status: self.status,
                body: self.preview(),
            })
        }
    }
}

pub struct TracedTransport {
    client: Client,
    limiter: Arc<Semaphore>,
    audit: Option<Arc<dyn AuditSink>>,
    sanitizer: BodySanitizer,
    provider: String,
}

impl TracedTransport {
    pub fn new(
        config: TransportConfig,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, GatewayError> {
        let conns = config.max_conns_per_host.clamp(1, MAX_CONNS_PER_HOST_CAP);
        let permits = config
            .max_concurrent_requests
            .clamp(1, MAX_CONCURRENT_REQUESTS_CAP);

        let client = Client::builder()
            .pool_max_idle_per_host(conns)
            .pool_idle_timeout(IDLE_CONN_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.api_timeout.max(MIN_RESPONSE_TIMEOUT))
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(permits)),
            audit,
            sanitizer: BodySanitizer::new(config.max_body_size),
            provider: config.provider,
        })
    }

    pub async fn execute(&self, req: OutboundRequest) -> Result<TracedResponse, GatewayError> {
        let correlation_id = correlation_id_or_fallback();
        let OutboundRequest {
            operation,
            method,
            url,
            mut headers,
            body,
        } = req;

        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            headers.insert(HeaderName::from_static(CORRELATION_HEADER), value);
        }

        let mut record = ProviderAuditRecord::new(
            CorrelationId(correlation_id),
            self.provider.clone(),
            operation,
            method.as_str(),
            sanitize_url(&url),
        );
        record.headers_req = sanitize_headers(headers.iter());
        record.body_req = body.as_deref().and_then(|b| self.sanitizer.sanitize(b));

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| GatewayError::Execute(format!("request limiter closed: {e}")))?;

        let started = Instant::now();
        let mut builder = self.client.request(method, url.as_str()).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let result = match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let resp_headers = resp.headers().clone();
                record.status = Some(status);
                record.headers_resp = sanitize_headers(resp_headers.iter());
                match resp.bytes().await {
                    Ok(body) => {
                        record.body_resp = self.sanitizer.sanitize(&body);
                        Ok(TracedResponse {
                            status,
                            headers: resp_headers,
                            body,
                        })
                    }
                    Err(e) => Err(GatewayError::ReadBody(e.to_string())),
                }
            }
            Err(e) => Err(GatewayError::Execute(e.to_string())),
        };

        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = &result {
            record.error = Some(e.to_string());
        }

        log_exchange(&record);
        self.dispatch_audit(record);
        result
    }

    /// Persist on a detached task. Failures, timeouts and panics are logged
    /// and never reach the caller.
    fn dispatch_audit(&self, record: ProviderAuditRecord) {
        let Some(sink) = self.audit.clone() else {
            return;
        };
        tokio::spawn(async move {
            let save = AssertUnwindSafe(tokio::time::timeout(
                AUDIT_WRITE_TIMEOUT,
                sink.save(&record),
            ))
            .catch_unwind()
            .await;

            let correlation_id = record.correlation_id.as_str();
            match save {
                Ok(Ok(Ok(()))) => {
                    debug!(correlation_id, operation = %record.operation, sink = sink.label(), "audit record saved");
                }
                Ok(Ok(Err(e))) => {
                    warn!(correlation_id, operation = %record.operation, error = %e, "failed to save audit record");
                }
                Ok(Err(_)) => {
                    warn!(correlation_id, operation = %record.operation, "audit write timed out");
                }
                Err(_) => {
                    error!(correlation_id, operation = %record.operation, "audit writer panicked");
                }
            }
        });
    }
}

fn log_exchange(record: &ProviderAuditRecord) {
    let correlation_id = record.correlation_id.as_str();
    let status = record.status.unwrap_or_default();
    debug!(
        correlation_id,
        operation = %record.operation,
        headers_req = ?record.headers_req,
        headers_resp = ?record.headers_resp,
        "upstream headers"
    );
    match (&record.error, record.status) {
        (None, Some(s)) if s < 400 => info!(
            correlation_id,
            provider = %record.provider,
            operation = %record.operation,
            method = %record.method,
            url = %record.url,
            status,
            duration_ms = record.duration_ms,
            "upstream call completed"
        ),
        (None, Some(s)) if s < 500 => warn!(
            correlation_id,
            provider = %record.provider,
            operation = %record.operation,
            method = %record.method,
            url = %record.url,
            status,
            duration_ms = record.duration_ms,
            "upstream call rejected"
        ),
        _ => error!(
            correlation_id,
            provider = %record.provider,
            operation = %record.operation,
            method = %record.method,
            url = %record.url,
            status,
            duration_ms = record.duration_ms,
            error = record.error.as_deref().unwrap_or(""),
            "upstream call failed"
        ),
    }
}
