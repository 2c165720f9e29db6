//! Process configuration: flags and environment variables.

use clap::{Args, ValueEnum};
use fe_providers::{NumrotConfig, TransportConfig, PROVIDER_NAME};
use fe_registration::IssuerProfile;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("CDO_AMBIENTE_DEFAULT must be \"1\" or \"2\", got {0:?}")]
    Ambiente(String),
    #[error("AUDIT_SINK=postgres requires DATABASE_URL or DB_HOST")]
    AuditWithoutDatabase,
    #[error("invalid database settings: {0}")]
    Database(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuditSinkKind {
    Postgres,
    File,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    #[arg(long, env = "APP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Full connection string; wins over the DB_* parts.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,
    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,
    #[arg(long, env = "DB_SSLMODE", default_value = "disable")]
    pub db_sslmode: String,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "NUMROT_BASE_URL", default_value = "")]
    pub numrot_base_url: String,
    /// Defaults to NUMROT_BASE_URL.
    #[arg(long, env = "NUMROT_DS_BASE_URL")]
    pub numrot_ds_base_url: Option<String>,
    #[arg(long, env = "NUMROT_USERNAME")]
    pub numrot_username: Option<String>,
    #[arg(long, env = "NUMROT_PASSWORD", hide_env_values = true)]
    pub numrot_password: Option<String>,
    #[arg(long, env = "NUMROT_KEY", hide_env_values = true)]
    pub numrot_key: Option<String>,
    #[arg(long, env = "NUMROT_SECRET", hide_env_values = true)]
    pub numrot_secret: Option<String>,
    /// Seconds.
    #[arg(long, env = "NUMROT_TOKEN_TTL", default_value_t = 3300)]
    pub numrot_token_ttl: u64,
    /// Seconds.
    #[arg(long, env = "NUMROT_API_TIMEOUT", default_value_t = 300)]
    pub numrot_api_timeout: u64,

    #[arg(long, env = "NUMROT_EMISOR_NIT")]
    pub emisor_nit: Option<String>,
    #[arg(long, env = "NUMROT_RAZON_SOCIAL")]
    pub razon_social: Option<String>,
    #[arg(long, env = "NUMROT_OFE_DIRECCION")]
    pub ofe_direccion: Option<String>,
    #[arg(long, env = "NUMROT_OFE_MUNICIPIO_CODIGO")]
    pub ofe_municipio_codigo: Option<String>,
    #[arg(long, env = "NUMROT_OFE_MUNICIPIO_NOMBRE")]
    pub ofe_municipio_nombre: Option<String>,
    #[arg(long, env = "NUMROT_OFE_DEPARTAMENTO_CODIGO")]
    pub ofe_departamento_codigo: Option<String>,
    #[arg(long, env = "NUMROT_OFE_DEPARTAMENTO_NOMBRE")]
    pub ofe_departamento_nombre: Option<String>,
    #[arg(long, env = "CDO_AMBIENTE_DEFAULT", default_value = "2")]
    pub ambiente_default: String,

    #[arg(long, env = "AUDIT_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub audit_enabled: bool,
    /// Defaults to `postgres` with a database, `file` without one.
    #[arg(long, env = "AUDIT_SINK", value_enum)]
    pub audit_sink: Option<AuditSinkKind>,
    #[arg(long, env = "AUDIT_FILE_PATH", default_value = "logs/provider_audit.jsonl")]
    pub audit_file_path: PathBuf,
    /// Bytes kept per audited body.
    #[arg(long, env = "AUDIT_MAX_BODY_SIZE", default_value_t = 65536)]
    pub audit_max_body_size: usize,

    #[arg(long, env = "DOCUMENT_WORKER_POOL_SIZE", default_value_t = 10)]
    pub worker_pool_size: usize,
    #[arg(long, env = "DOCUMENT_BATCH_SIZE", default_value_t = 1)]
    pub batch_size: usize,
    #[arg(long, env = "DOCUMENT_MAX_CONCURRENT_REQUESTS", default_value_t = 50)]
    pub max_concurrent_requests: usize,
    #[arg(long, env = "DOCUMENT_MAX_CONNS_PER_HOST", default_value_t = 50)]
    pub max_conns_per_host: usize,
    #[arg(long, env = "DOCUMENT_STREAMING", default_value_t = false, action = clap::ArgAction::Set)]
    pub streaming: bool,
    #[arg(long, env = "DOCUMENT_VERIFY_RESOLUTIONS", default_value_t = false, action = clap::ArgAction::Set)]
    pub verify_resolutions: bool,
    /// Seconds before an inbound request is abandoned.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 900)]
    pub request_timeout: u64,

    #[arg(long, env = "AUTH_ENABLED", default_value_t = false, action = clap::ArgAction::Set)]
    pub auth_enabled: bool,
    #[arg(long, env = "JWT_ISSUER_URI")]
    pub jwt_issuer_uri: Option<String>,
    #[arg(long, env = "JWT_JWK_SET_URI")]
    pub jwt_jwk_set_uri: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

fn filled(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Settings {
    /// Startup checks; any error aborts the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.ambiente_default.trim(), "1" | "2") {
            return Err(ConfigError::Ambiente(self.ambiente_default.clone()));
        }
        if filled(&self.emisor_nit).is_none() {
            return Err(ConfigError::Missing("NUMROT_EMISOR_NIT"));
        }
        if filled(&self.razon_social).is_none() {
            return Err(ConfigError::Missing("NUMROT_RAZON_SOCIAL"));
        }
        if self.numrot_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("NUMROT_BASE_URL"));
        }
        if self.audit_sink_kind() == AuditSinkKind::Postgres && !self.has_database() {
            return Err(ConfigError::AuditWithoutDatabase);
        }
        Ok(())
    }

    pub fn has_database(&self) -> bool {
        filled(&self.database_url).is_some() || filled(&self.db_host).is_some()
    }

    pub fn audit_sink_kind(&self) -> AuditSinkKind {
        match self.audit_sink {
            Some(kind) => kind,
            None if self.has_database() => AuditSinkKind::Postgres,
            None => AuditSinkKind::File,
        }
    }

    /// `None` when no database is configured.
    pub fn pg_options(&self) -> Result<Option<PgConnectOptions>, ConfigError> {
        if let Some(url) = filled(&self.database_url) {
            return PgConnectOptions::from_str(url)
                .map(Some)
                .map_err(|e| ConfigError::Database(e.to_string()));
        }
        let Some(host) = filled(&self.db_host) else {
            return Ok(None);
        };
        let ssl_mode = PgSslMode::from_str(self.db_sslmode.trim())
            .map_err(|e| ConfigError::Database(format!("DB_SSLMODE: {e}")))?;
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(self.db_port)
            .ssl_mode(ssl_mode);
        if let Some(user) = filled(&self.db_user) {
            opts = opts.username(user);
        }
        if let Some(password) = filled(&self.db_password) {
            opts = opts.password(password);
        }
        if let Some(name) = filled(&self.db_name) {
            opts = opts.database(name);
        }
        Ok(Some(opts))
    }

    pub fn issuer_profile(&self) -> IssuerProfile {
        let owned = |v: &Option<String>| filled(v).map(str::to_string);
        IssuerProfile {
            nit: owned(&self.emisor_nit).unwrap_or_default(),
            razon_social: owned(&self.razon_social).unwrap_or_default(),
            direccion: owned(&self.ofe_direccion),
            municipio_codigo: owned(&self.ofe_municipio_codigo),
            municipio_nombre: owned(&self.ofe_municipio_nombre),
            departamento_codigo: owned(&self.ofe_departamento_codigo),
            departamento_nombre: owned(&self.ofe_departamento_nombre),
            ambiente_default: self.ambiente_default.trim().to_string(),
        }
    }

    pub fn numrot_config(&self) -> NumrotConfig {
        NumrotConfig {
            base_url: self.numrot_base_url.trim().to_string(),
            ds_base_url: filled(&self.numrot_ds_base_url).map(str::to_string),
            username: self.numrot_username.clone(),
            password: self.numrot_password.clone(),
            key: self.numrot_key.clone(),
            secret: self.numrot_secret.clone(),
            token_ttl: Duration::from_secs(self.numrot_token_ttl),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            provider: PROVIDER_NAME.to_string(),
            api_timeout: Duration::from_secs(self.numrot_api_timeout),
            max_concurrent_requests: self.max_concurrent_requests,
            max_conns_per_host: self.max_conns_per_host,
            max_body_size: self.audit_max_body_size,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["fe-gateway"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().settings
    }

    const REQUIRED: [&str; 6] = [
        "--numrot-base-url",
        "http://numrot.local",
        "--emisor-nit",
        "860011153",
        "--razon-social",
        "ACME S.A.S.",
    ];

    #[test]
    fn defaults_without_database() {
        let s = parse(&REQUIRED);
        s.validate().unwrap();
        assert!(!s.has_database());
        assert_eq!(s.audit_sink_kind(), AuditSinkKind::File);
        assert!(s.pg_options().unwrap().is_none());
        assert_eq!(s.issuer_profile().ambiente_default, "2");
        assert_eq!(s.batch_size, 1);
        assert_eq!(s.worker_pool_size, 10);
    }

    #[test]
    fn ambiente_outside_one_or_two_is_rejected() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--ambiente-default", "3"]);
        let err = parse(&args).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Ambiente(_)));
    }

    #[test]
    fn missing_issuer_identity_is_rejected() {
        let s = parse(&["--numrot-base-url", "http://numrot.local", "--emisor-nit", "860011153"]);
        let err = s.validate().unwrap_err();
        assert_eq!(err.to_string(), "NUMROT_RAZON_SOCIAL is required");
    }

    #[test]
    fn database_parts_select_postgres_audit() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--db-host", "localhost", "--db-name", "fe", "--db-user", "fe"]);
        let s = parse(&args);
        s.validate().unwrap();
        assert_eq!(s.audit_sink_kind(), AuditSinkKind::Postgres);
        assert!(s.pg_options().unwrap().is_some());
    }

    #[test]
    fn postgres_audit_needs_a_database() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--audit-sink", "postgres"]);
        let err = parse(&args).validate().unwrap_err();
        assert!(matches!(err, ConfigError::AuditWithoutDatabase));
    }
}
