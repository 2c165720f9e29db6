use crate::{
    require_keys, Counterparty, CounterpartyPage, CounterpartyRole, CounterpartyStore, ListQuery,
    SortColumn, StoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use fe_common::normalize_nit;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

type Key = (CounterpartyRole, String, String);

/// In-process store. Counts `find` calls so callers can assert on lookup
/// volume.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterpartyStore {
    records: Arc<RwLock<HashMap<Key, Counterparty>>>,
    lookups: Arc<AtomicUsize>,
}

impl MemoryCounterpartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, role: CounterpartyRole, record: Counterparty) {
        let record = record.normalized();
        let key = (role, record.ofe_identificacion.clone(), record.identificacion.clone());
        self.records.write().await.insert(key, record);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn sort_value(c: &Counterparty, col: SortColumn) -> String {
    match col {
        SortColumn::RazonSocial => c.razon_social.clone().unwrap_or_default(),
        SortColumn::NombreComercial => c.nombre_comercial.clone().unwrap_or_default(),
        SortColumn::Identificacion => c.identificacion.clone(),
        SortColumn::MunicipioNombre => c.municipio_nombre.clone().unwrap_or_default(),
        SortColumn::CreatedAt => c.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
    }
}

fn matches_search(c: &Counterparty, term: &str) -> bool {
    let term = term.to_lowercase();
    [
        c.razon_social.as_deref(),
        c.nombre_comercial.as_deref(),
        Some(c.identificacion.as_str()),
    ]
    .into_iter()
    .flatten()
    .any(|v| v.to_lowercase().contains(&term))
}

#[async_trait]
impl CounterpartyStore for MemoryCounterpartyStore {
    async fn find(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
    ) -> Result<Option<Counterparty>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = (role, normalize_nit(ofe), normalize_nit(id));
        Ok(self.records.read().await.get(&key).cloned())
    }

    async fn list(
        &self,
        role: CounterpartyRole,
        query: &ListQuery,
    ) -> Result<CounterpartyPage, StoreError> {
        let ofe = query.ofe_filter();
        let term = query.search_term();
        let col = query.sort_column();

        let mut items: Vec<Counterparty> = self
            .records
            .read()
            .await
            .iter()
            .filter(|((r, o, _), _)| *r == role && ofe.as_deref().map_or(true, |f| f == o))
            .map(|(_, c)| c)
            .filter(|c| term.as_deref().map_or(true, |t| matches_search(c, t)))
            .cloned()
            .collect();

        items.sort_by(|a, b| sort_value(a, col).cmp(&sort_value(b, col)));
        if query.descending() {
            items.reverse();
        }

        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .collect();
        Ok(CounterpartyPage {
            total,
            limit: query.limit(),
            offset: query.offset(),
            items,
        })
    }

    async fn create(
        &self,
        role: CounterpartyRole,
        record: Counterparty,
    ) -> Result<Counterparty, StoreError> {
        let mut record = record.normalized();
        require_keys(&record)?;
        let key = (role, record.ofe_identificacion.clone(), record.identificacion.clone());

        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::Conflict {
                role: role.label(),
                ofe: key.1,
                id: key.2,
            });
        }
        let now = Utc::now();
        record.created_at = Some(now);
        record.updated_at = Some(now);
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
        record: Counterparty,
    ) -> Result<Counterparty, StoreError> {
        let key = (role, normalize_nit(ofe), normalize_nit(id));
        let mut records = self.records.write().await;
        let existing = records.get_mut(&key).ok_or_else(|| StoreError::NotFound {
            role: role.label(),
            ofe: key.1.clone(),
            id: key.2.clone(),
        })?;
        let created_at = existing.created_at;
        *existing = Counterparty {
            ofe_identificacion: key.1.clone(),
            identificacion: key.2.clone(),
            created_at,
            updated_at: Some(Utc::now()),
            ..record
        };
        Ok(existing.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}
