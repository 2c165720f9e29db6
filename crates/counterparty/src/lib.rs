//! fe_counterparty
//!
//! Counterparty master data: acquirers (`adquirientes`, invoice customers) and
//! suppliers (`proveedores`, issuers of support documents). Two parallel
//! tables share one record shape; every identifier is normalized with
//! [`fe_common::normalize_nit`] before it touches a store.

mod memory;
mod postgres;

pub use memory::MemoryCounterpartyStore;
pub use postgres::PgCounterpartyStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fe_common::normalize_nit;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ----------------------------
// Schema
// ----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyRole {
    Acquirer,
    Supplier,
}

impl CounterpartyRole {
    /// Spanish label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            CounterpartyRole::Acquirer => "Adquiriente",
            CounterpartyRole::Supplier => "Proveedor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CounterpartyStatus {
    #[default]
    #[serde(rename = "ACTIVO")]
    Active,
    #[serde(rename = "INACTIVO")]
    Inactive,
}

impl CounterpartyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyStatus::Active => "ACTIVO",
            CounterpartyStatus::Inactive => "INACTIVO",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("INACTIVO") {
            CounterpartyStatus::Inactive
        } else {
            CounterpartyStatus::Active
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    #[serde(default)]
    pub ofe_identificacion: String,
    /// `adq_identificacion` or `pro_identificacion` depending on the table.
    #[serde(default, alias = "adq_identificacion", alias = "pro_identificacion")]
    pub identificacion: String,
    #[serde(default)]
    pub tipo_documento: Option<String>,
    #[serde(default)]
    pub tipo_organizacion: Option<String>,
    #[serde(default)]
    pub razon_social: Option<String>,
    #[serde(default)]
    pub nombre_comercial: Option<String>,
    #[serde(default)]
    pub primer_nombre: Option<String>,
    #[serde(default)]
    pub otros_nombres: Option<String>,
    #[serde(default)]
    pub primer_apellido: Option<String>,
    #[serde(default)]
    pub segundo_apellido: Option<String>,
    #[serde(default)]
    pub direccion: Option<String>,
    /// Preferred over `direccion` when filling documents.
    #[serde(default)]
    pub direccion_fiscal: Option<String>,
    #[serde(default)]
    pub municipio_codigo: Option<String>,
    #[serde(default)]
    pub municipio_nombre: Option<String>,
    #[serde(default)]
    pub departamento_codigo: Option<String>,
    #[serde(default)]
    pub departamento_nombre: Option<String>,
    #[serde(default)]
    pub pais_codigo: Option<String>,
    #[serde(default)]
    pub pais_nombre: Option<String>,
    #[serde(default)]
    pub codigo_postal: Option<String>,
    #[serde(default)]
    pub correo: Option<String>,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub responsabilidades_fiscales: Vec<String>,
    #[serde(default)]
    pub estado: CounterpartyStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Counterparty {
    pub fn new(ofe: &str, id: &str) -> Self {
        Self {
            ofe_identificacion: normalize_nit(ofe),
            identificacion: normalize_nit(id),
            ..Default::default()
        }
    }

    /// Fiscal address when present, else the plain address.
    pub fn preferred_address(&self) -> Option<&str> {
        self.direccion_fiscal
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.direccion.as_deref())
    }

    pub fn normalized(mut self) -> Self {
        self.ofe_identificacion = normalize_nit(&self.ofe_identificacion);
        self.identificacion = normalize_nit(&self.identificacion);
        self
    }
}

// ----------------------------
// Queries
// ----------------------------

pub const MAX_PAGE_SIZE: usize = 500;
const DEFAULT_PAGE_SIZE: usize = 50;

/// Whitelisted sort/search columns. Anything else falls back to `razon_social`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    RazonSocial,
    NombreComercial,
    Identificacion,
    MunicipioNombre,
    CreatedAt,
}

impl SortColumn {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("nombre_comercial") => SortColumn::NombreComercial,
            Some("identificacion") | Some("adq_identificacion") | Some("pro_identificacion") => {
                SortColumn::Identificacion
            }
            Some("municipio_nombre") => SortColumn::MunicipioNombre,
            Some("created_at") => SortColumn::CreatedAt,
            _ => SortColumn::RazonSocial,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub ofe: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListQuery {
    pub fn sort_column(&self) -> SortColumn {
        SortColumn::parse(self.sort.as_deref())
    }

    pub fn descending(&self) -> bool {
        self.order
            .as_deref()
            .map_or(false, |o| o.eq_ignore_ascii_case("desc"))
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn ofe_filter(&self) -> Option<String> {
        self.ofe
            .as_deref()
            .map(normalize_nit)
            .filter(|s| !s.is_empty())
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CounterpartyPage {
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    pub items: Vec<Counterparty>,
}

// ----------------------------
// Store
// ----------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{role} {id} ya existe para el OFE {ofe}")]
    Conflict { role: &'static str, ofe: String, id: String },
    #[error("{role} {id} no existe para el OFE {ofe}")]
    NotFound { role: &'static str, ofe: String, id: String },
    #[error("{0} is required")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait CounterpartyStore: Send + Sync {
    /// Identifiers are normalized by the implementation.
    async fn find(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
    ) -> Result<Option<Counterparty>, StoreError>;

    async fn list(
        &self,
        role: CounterpartyRole,
        query: &ListQuery,
    ) -> Result<CounterpartyPage, StoreError>;

    async fn create(
        &self,
        role: CounterpartyRole,
        record: Counterparty,
    ) -> Result<Counterparty, StoreError>;

    async fn update(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
        record: Counterparty,
    ) -> Result<Counterparty, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    fn label(&self) -> &'static str;
}

pub(crate) fn require_keys(record: &Counterparty) -> Result<(), StoreError> {
    if record.ofe_identificacion.is_empty() {
        return Err(StoreError::Invalid("ofe_identificacion"));
    }
    if record.identificacion.is_empty() {
        return Err(StoreError::Invalid("identificacion"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiscal_address_wins() {
        let mut c = Counterparty::new("860011153-6", "900123456-1");
        assert_eq!(c.ofe_identificacion, "860011153");
        assert_eq!(c.identificacion, "900123456");
        c.direccion = Some("Calle 1".into());
        assert_eq!(c.preferred_address(), Some("Calle 1"));
        c.direccion_fiscal = Some("Carrera 7 # 71-21".into());
        assert_eq!(c.preferred_address(), Some("Carrera 7 # 71-21"));
    }

    #[test]
    fn unknown_sort_column_falls_back() {
        assert_eq!(SortColumn::parse(Some("1; DROP TABLE acquirer")), SortColumn::RazonSocial);
        assert_eq!(SortColumn::parse(Some("CREATED_AT")), SortColumn::CreatedAt);
        let q = ListQuery { limit: Some(10_000), ..Default::default() };
        assert_eq!(q.limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_value(CounterpartyStatus::Inactive).unwrap(), "INACTIVO");
        assert_eq!(CounterpartyStatus::parse("activo"), CounterpartyStatus::Active);
    }
}
