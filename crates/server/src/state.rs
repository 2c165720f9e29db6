use crate::config::{AuditSinkKind, Settings};
use anyhow::Context;
use fe_audit_log::{AuditSink, JsonlAuditSink, MemoryAuditSink, PgAuditSink};
use fe_common::SystemClock;
use fe_counterparty::{CounterpartyStore, PgCounterpartyStore};
use fe_providers::{InvoiceGateway, NumrotClient, TracedTransport};
use fe_registration::{Enricher, IssuerProfile, RegistrationCoordinator};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Knobs for `POST /registrar-documentos`.
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    pub streaming_default: bool,
    /// Documents per upstream call in buffered mode.
    pub batch_size: usize,
    /// Concurrent groups in buffered mode.
    pub worker_pool_size: usize,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            streaming_default: false,
            batch_size: 1,
            worker_pool_size: 10,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RegistrationCoordinator>,
    pub gateway: Arc<dyn InvoiceGateway>,
    /// `None` runs without master data: no enrichment lookups, counterparty
    /// routes answer 503.
    pub counterparties: Option<Arc<dyn CounterpartyStore>>,
    pub issuer: IssuerProfile,
    pub options: RegistrationOptions,
    /// Audit sink label for `/health`; `"disabled"` when auditing is off.
    pub audit_sink: &'static str,
}

/// Wire every collaborator from settings. Database schemas are created here.
pub async fn bootstrap(settings: &Settings) -> anyhow::Result<AppState> {
    settings.validate()?;
    if settings.auth_enabled {
        warn!(
            issuer = settings.jwt_issuer_uri.as_deref().unwrap_or(""),
            "AUTH_ENABLED is set but bearer-token authentication is not enforced by this service"
        );
    }

    let pool = match settings.pg_options()? {
        Some(opts) => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.db_max_connections.max(1))
                .acquire_timeout(Duration::from_secs(5))
                .connect_with(opts)
                .await
                .context("connect to postgres")?;
            info!(max_connections = settings.db_max_connections, "database pool ready");
            Some(pool)
        }
        None => {
            info!("no database configured; counterparty lookups disabled");
            None
        }
    };

    let audit: Option<Arc<dyn AuditSink>> = if !settings.audit_enabled {
        None
    } else {
        match settings.audit_sink_kind() {
            AuditSinkKind::Postgres => {
                let pool = pool.clone().context("postgres audit sink without a database")?;
                let sink = PgAuditSink::new(pool);
                sink.ensure_schema().await.context("create provider_audit_log")?;
                Some(Arc::new(sink))
            }
            AuditSinkKind::File => {
                let sink = JsonlAuditSink::open(&settings.audit_file_path)
                    .with_context(|| format!("open {}", settings.audit_file_path.display()))?;
                Some(Arc::new(sink))
            }
            AuditSinkKind::Memory => Some(Arc::new(MemoryAuditSink::new())),
        }
    };
    let audit_sink = audit.as_ref().map_or("disabled", |s| s.label());
    info!(audit_sink, "provider audit configured");

    let transport = Arc::new(TracedTransport::new(settings.transport_config(), audit)?);
    let gateway: Arc<dyn InvoiceGateway> =
        Arc::new(NumrotClient::new(settings.numrot_config(), transport)?);

    let counterparties: Option<Arc<dyn CounterpartyStore>> = match pool {
        Some(pool) => {
            let store = PgCounterpartyStore::new(pool);
            store.ensure_schema().await.context("create counterparty tables")?;
            Some(Arc::new(store))
        }
        None => None,
    };

    let issuer = settings.issuer_profile();
    let mut enricher = Enricher::new(issuer.clone());
    if let Some(store) = &counterparties {
        enricher = enricher.with_store(store.clone());
    }
    if settings.verify_resolutions {
        enricher = enricher.with_resolution_check(gateway.clone());
    }
    let coordinator = RegistrationCoordinator::new(
        gateway.clone(),
        Arc::new(enricher),
        Arc::new(SystemClock),
    )
    .with_workers(settings.worker_pool_size);

    Ok(AppState {
        coordinator: Arc::new(coordinator),
        gateway,
        counterparties,
        issuer,
        options: RegistrationOptions {
            streaming_default: settings.streaming,
            batch_size: settings.batch_size.max(1),
            worker_pool_size: settings.worker_pool_size.max(1),
        },
        audit_sink,
    })
}
