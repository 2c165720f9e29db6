//! Counterparty and issuer enrichment for one document.
//!
//! DS documents read the supplier table with the identifiers swapped: the
//! request's `adq_identificacion` is the supplier row's OFE and the request's
//! `ofe_identificacion` is the supplier's own id. The swap is confined to
//! [`CounterpartyKey::for_document`].

use dashmap::DashMap;
use fe_common::normalize_nit;
use fe_counterparty::{Counterparty, CounterpartyRole, CounterpartyStore};
use fe_documents::{fill_if_blank, is_blank, Document, DocumentType};
use fe_providers::{InvoiceGateway, Resolution};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

const DEFAULT_AMBIENTE: &str = "2";

/// Fixed issuer identity written over every document.
#[derive(Debug, Clone)]
pub struct IssuerProfile {
    pub nit: String,
    pub razon_social: String,
    pub direccion: Option<String>,
    pub municipio_codigo: Option<String>,
    pub municipio_nombre: Option<String>,
    pub departamento_codigo: Option<String>,
    pub departamento_nombre: Option<String>,
    /// `cdo_ambiente` for documents that do not carry one: "1" production, "2" test.
    pub ambiente_default: String,
}

impl Default for IssuerProfile {
    fn default() -> Self {
        Self {
            nit: String::new(),
            razon_social: String::new(),
            direccion: None,
            municipio_codigo: None,
            municipio_nombre: None,
            departamento_codigo: None,
            departamento_nombre: None,
            ambiente_default: DEFAULT_AMBIENTE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichError {
    #[error("{role} {id} no encontrado para el OFE {ofe}")]
    CounterpartyMissing { role: &'static str, ofe: String, id: String },
    #[error("Resolución {numero} con prefijo {prefijo} no encontrada para el OFE {ofe}")]
    ResolutionMissing { ofe: String, numero: String, prefijo: String },
    #[error("error consultando {role} {id} para el OFE {ofe}: {reason}")]
    Lookup { role: &'static str, ofe: String, id: String, reason: String },
    #[error("error consultando resoluciones del OFE {ofe}: {reason}")]
    ResolutionLookup { ofe: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CounterpartyKey {
    pub role: CounterpartyRole,
    pub ofe: String,
    pub id: String,
}

impl CounterpartyKey {
    pub fn for_document(doc: &Document, kind: DocumentType) -> Self {
        match kind {
            DocumentType::DS => Self {
                role: CounterpartyRole::Supplier,
                ofe: normalize_nit(&doc.adq_identificacion),
                id: normalize_nit(&doc.ofe_identificacion),
            },
            _ => Self {
                role: CounterpartyRole::Acquirer,
                ofe: normalize_nit(&doc.ofe_identificacion),
                id: normalize_nit(&doc.adq_identificacion),
            },
        }
    }

    pub fn cache_key(&self) -> String {
        let tag = match self.role {
            CounterpartyRole::Acquirer => "adq",
            CounterpartyRole::Supplier => "pro",
        };
        format!("{tag}:{}:{}", self.ofe, self.id)
    }
}

/// Per-batch memoization. A key's first caller performs the lookup, every
/// concurrent caller for the same key waits on that one result.
#[derive(Debug, Default)]
pub(crate) struct BatchCache {
    counterparties: DashMap<String, Arc<OnceCell<Option<Counterparty>>>>,
    resolutions: DashMap<String, Arc<OnceCell<Option<Resolution>>>>,
}

pub struct Enricher {
    store: Option<Arc<dyn CounterpartyStore>>,
    resolutions: Option<Arc<dyn InvoiceGateway>>,
    issuer: IssuerProfile,
}

impl Enricher {
    pub fn new(issuer: IssuerProfile) -> Self {
        Self {
            store: None,
            resolutions: None,
            issuer,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CounterpartyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reject documents whose resolution/prefix the gateway does not list for the OFE.
    pub fn with_resolution_check(mut self, gateway: Arc<dyn InvoiceGateway>) -> Self {
        self.resolutions = Some(gateway);
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) async fn enrich(
        &self,
        doc: &mut Document,
        kind: DocumentType,
        cache: &BatchCache,
    ) -> Result<(), EnrichError> {
        if let Some(store) = &self.store {
            let key = CounterpartyKey::for_document(doc, kind);
            let record = lookup_counterparty(store.as_ref(), &key, cache)
                .await?
                .ok_or_else(|| EnrichError::CounterpartyMissing {
                    role: key.role.label(),
                    ofe: key.ofe.clone(),
                    id: key.id.clone(),
                })?;
            apply_counterparty(doc, &record);
        }

        if let Some(gateway) = &self.resolutions {
            if !doc.rfa_resolucion.trim().is_empty() {
                verify_resolution(gateway.as_ref(), doc, cache).await?;
            }
        }

        apply_issuer(doc, &self.issuer);
        Ok(())
    }
}

async fn lookup_counterparty(
    store: &dyn CounterpartyStore,
    key: &CounterpartyKey,
    cache: &BatchCache,
) -> Result<Option<Counterparty>, EnrichError> {
    let cell = cache
        .counterparties
        .entry(key.cache_key())
        .or_default()
        .clone();
    let record = cell
        .get_or_try_init(|| async {
            debug!(cache_key = %key.cache_key(), "counterparty cache miss");
            store
                .find(key.role, &key.ofe, &key.id)
                .await
                .map_err(|e| EnrichError::Lookup {
                    role: key.role.label(),
                    ofe: key.ofe.clone(),
                    id: key.id.clone(),
                    reason: e.to_string(),
                })
        })
        .await?;
    Ok(record.clone())
}

async fn verify_resolution(
    gateway: &dyn InvoiceGateway,
    doc: &Document,
    cache: &BatchCache,
) -> Result<(), EnrichError> {
    let ofe = normalize_nit(&doc.ofe_identificacion);
    let numero = doc.rfa_resolucion.trim();
    let prefijo = doc.rfa_prefijo.trim();
    let cell = cache
        .resolutions
        .entry(format!("{ofe}:{numero}:{prefijo}"))
        .or_default()
        .clone();
    let found = cell
        .get_or_try_init(|| async {
            let listed = gateway
                .get_resolutions(&ofe)
                .await
                .map_err(|e| EnrichError::ResolutionLookup {
                    ofe: ofe.clone(),
                    reason: e.to_string(),
                })?;
            Ok(listed.into_iter().find(|r| r.matches(numero, prefijo)))
        })
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(EnrichError::ResolutionMissing {
            ofe,
            numero: numero.to_string(),
            prefijo: prefijo.to_string(),
        }),
    }
}

/// Copy master data into the document's `adq_*` block, never overwriting a
/// value the caller sent.
pub(crate) fn apply_counterparty(doc: &mut Document, record: &Counterparty) {
    fill_if_blank(&mut doc.adq_tipo_documento, record.tipo_documento.as_deref());
    fill_if_blank(&mut doc.adq_tipo_organizacion, record.tipo_organizacion.as_deref());
    fill_if_blank(&mut doc.adq_razon_social, record.razon_social.as_deref());
    fill_if_blank(&mut doc.adq_nombre_comercial, record.nombre_comercial.as_deref());
    fill_if_blank(&mut doc.adq_primer_nombre, record.primer_nombre.as_deref());
    fill_if_blank(&mut doc.adq_otros_nombres, record.otros_nombres.as_deref());
    fill_if_blank(&mut doc.adq_primer_apellido, record.primer_apellido.as_deref());
    fill_if_blank(&mut doc.adq_segundo_apellido, record.segundo_apellido.as_deref());
    fill_if_blank(&mut doc.adq_direccion, record.preferred_address());
    fill_if_blank(&mut doc.adq_municipio_codigo, record.municipio_codigo.as_deref());
    fill_if_blank(&mut doc.adq_municipio_nombre, record.municipio_nombre.as_deref());
    fill_if_blank(&mut doc.adq_departamento_codigo, record.departamento_codigo.as_deref());
    fill_if_blank(&mut doc.adq_departamento_nombre, record.departamento_nombre.as_deref());
    fill_if_blank(&mut doc.adq_pais_codigo, record.pais_codigo.as_deref());
    fill_if_blank(&mut doc.adq_pais_nombre, record.pais_nombre.as_deref());
    fill_if_blank(&mut doc.adq_codigo_postal, record.codigo_postal.as_deref());
    fill_if_blank(&mut doc.adq_correo, record.correo.as_deref());
    fill_if_blank(&mut doc.adq_telefono, record.telefono.as_deref());
}

fn overwrite(field: &mut Option<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        *field = Some(v.to_string());
    }
}

pub(crate) fn apply_issuer(doc: &mut Document, issuer: &IssuerProfile) {
    overwrite(&mut doc.ofe_razon_social, Some(&issuer.razon_social));
    overwrite(&mut doc.ofe_direccion, issuer.direccion.as_deref());
    overwrite(&mut doc.ofe_municipio_codigo, issuer.municipio_codigo.as_deref());
    overwrite(&mut doc.ofe_municipio_nombre, issuer.municipio_nombre.as_deref());
    overwrite(&mut doc.ofe_departamento_codigo, issuer.departamento_codigo.as_deref());
    overwrite(&mut doc.ofe_departamento_nombre, issuer.departamento_nombre.as_deref());

    if is_blank(&doc.cdo_ambiente) {
        doc.cdo_ambiente = Some(issuer.ambiente_default.clone());
    }

    let colombian = doc
        .adq_pais_codigo
        .as_deref()
        .map_or(false, |c| c.trim().eq_ignore_ascii_case("CO"));
    if colombian {
        fill_if_blank(&mut doc.adq_pais_nombre, Some("Colombia"));
    }
}
