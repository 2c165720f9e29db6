use crate::{AuditLogError, AuditSink};
use async_trait::async_trait;
use fe_audit_spec::{CorrelationId, ProviderAuditRecord, SanitizedHeaders};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), AuditLogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS provider_audit_log (
                id UUID PRIMARY KEY,
                correlation_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                operation TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                headers_req JSONB NOT NULL DEFAULT '{}'::jsonb,
                body_req JSONB NULL,
                status INTEGER NULL,
                headers_resp JSONB NOT NULL DEFAULT '{}'::jsonb,
                body_resp JSONB NULL,
                duration_ms BIGINT NOT NULL,
                error TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_provider_audit_log_correlation_id ON provider_audit_log (correlation_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn headers_to_json(headers: &SanitizedHeaders) -> Result<serde_json::Value, AuditLogError> {
    Ok(serde_json::to_value(headers)?)
}

fn headers_from_json(value: serde_json::Value) -> SanitizedHeaders {
    serde_json::from_value(value).unwrap_or_default()
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn save(&self, record: &ProviderAuditRecord) -> Result<(), AuditLogError> {
        let duration_ms = i64::try_from(record.duration_ms).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO provider_audit_log (
                id, correlation_id, provider, operation, method, url,
                headers_req, body_req, status, headers_resp, body_resp,
                duration_ms, error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(record.correlation_id.as_str())
        .bind(&record.provider)
        .bind(&record.operation)
        .bind(&record.method)
        .bind(&record.url)
        .bind(headers_to_json(&record.headers_req)?)
        .bind(&record.body_req)
        .bind(record.status.map(i32::from))
        .bind(headers_to_json(&record.headers_resp)?)
        .bind(&record.body_resp)
        .bind(duration_ms)
        .bind(&record.error)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<ProviderAuditRecord>, AuditLogError> {
        let rows = sqlx::query(
            r#"
            SELECT id, correlation_id, provider, operation, method, url,
                   headers_req, body_req, status, headers_resp, body_resp,
                   duration_ms, error, created_at
            FROM provider_audit_log
            WHERE correlation_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let status: Option<i32> = row.try_get("status")?;
            let duration_ms: i64 = row.try_get("duration_ms")?;
            out.push(ProviderAuditRecord {
                id: row.try_get("id")?,
                correlation_id: CorrelationId(row.try_get("correlation_id")?),
                provider: row.try_get("provider")?,
                operation: row.try_get("operation")?,
                method: row.try_get("method")?,
                url: row.try_get("url")?,
                headers_req: headers_from_json(row.try_get("headers_req")?),
                body_req: row.try_get("body_req")?,
                status: status.and_then(|s| u16::try_from(s).ok()),
                headers_resp: headers_from_json(row.try_get("headers_resp")?),
                body_resp: row.try_get("body_resp")?,
                duration_ms: u64::try_from(duration_ms).unwrap_or_default(),
                error: row.try_get("error")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(out)
    }

    fn label(&self) -> &'static str {
        "postgres"
    }
}
