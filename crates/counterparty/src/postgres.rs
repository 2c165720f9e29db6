use crate::{
    require_keys, Counterparty, CounterpartyPage, CounterpartyRole, CounterpartyStatus,
    CounterpartyStore, ListQuery, SortColumn, StoreError,
};
use async_trait::async_trait;
use fe_common::normalize_nit;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Table and identifier column for a role. Only these literals are ever
/// interpolated into SQL text.
fn table(role: CounterpartyRole) -> (&'static str, &'static str) {
    match role {
        CounterpartyRole::Acquirer => ("acquirer", "adq_identificacion"),
        CounterpartyRole::Supplier => ("provider", "pro_identificacion"),
    }
}

fn sort_sql(col: SortColumn, id_col: &'static str) -> &'static str {
    match col {
        SortColumn::RazonSocial => "razon_social",
        SortColumn::NombreComercial => "nombre_comercial",
        SortColumn::Identificacion => id_col,
        SortColumn::MunicipioNombre => "municipio_nombre",
        SortColumn::CreatedAt => "created_at",
    }
}

const DATA_COLUMNS: [&str; 20] = [
    "tipo_documento",
    "tipo_organizacion",
    "razon_social",
    "nombre_comercial",
    "primer_nombre",
    "otros_nombres",
    "primer_apellido",
    "segundo_apellido",
    "direccion",
    "direccion_fiscal",
    "municipio_codigo",
    "municipio_nombre",
    "departamento_codigo",
    "departamento_nombre",
    "pais_codigo",
    "pais_nombre",
    "codigo_postal",
    "correo",
    "telefono",
    "estado",
];

#[derive(Debug, Clone)]
pub struct PgCounterpartyStore {
    pool: PgPool,
}

impl PgCounterpartyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for role in [CounterpartyRole::Acquirer, CounterpartyRole::Supplier] {
            let (table, id_col) = table(role);
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    ofe_identificacion TEXT NOT NULL,
                    {id_col} TEXT NOT NULL,
                    tipo_documento TEXT NULL,
                    tipo_organizacion TEXT NULL,
                    razon_social TEXT NULL,
                    nombre_comercial TEXT NULL,
                    primer_nombre TEXT NULL,
                    otros_nombres TEXT NULL,
                    primer_apellido TEXT NULL,
                    segundo_apellido TEXT NULL,
                    direccion TEXT NULL,
                    direccion_fiscal TEXT NULL,
                    municipio_codigo TEXT NULL,
                    municipio_nombre TEXT NULL,
                    departamento_codigo TEXT NULL,
                    departamento_nombre TEXT NULL,
                    pais_codigo TEXT NULL,
                    pais_nombre TEXT NULL,
                    codigo_postal TEXT NULL,
                    correo TEXT NULL,
                    telefono TEXT NULL,
                    responsabilidades_fiscales JSONB NOT NULL DEFAULT '[]'::jsonb,
                    estado TEXT NOT NULL DEFAULT 'ACTIVO',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    CONSTRAINT uq_{table}_ofe_{id_col} UNIQUE (ofe_identificacion, {id_col})
                )
                "#
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn select_list(id_col: &str) -> String {
        format!(
            "ofe_identificacion, {id_col} AS identificacion, {}, responsabilidades_fiscales, created_at, updated_at",
            DATA_COLUMNS.join(", ")
        )
    }
}

fn from_row(row: &PgRow) -> Result<Counterparty, sqlx::Error> {
    let resp: serde_json::Value = row.try_get("responsabilidades_fiscales")?;
    let estado: String = row.try_get("estado")?;
    Ok(Counterparty {
        ofe_identificacion: row.try_get("ofe_identificacion")?,
        identificacion: row.try_get("identificacion")?,
        tipo_documento: row.try_get("tipo_documento")?,
        tipo_organizacion: row.try_get("tipo_organizacion")?,
        razon_social: row.try_get("razon_social")?,
        nombre_comercial: row.try_get("nombre_comercial")?,
        primer_nombre: row.try_get("primer_nombre")?,
        otros_nombres: row.try_get("otros_nombres")?,
        primer_apellido: row.try_get("primer_apellido")?,
        segundo_apellido: row.try_get("segundo_apellido")?,
        direccion: row.try_get("direccion")?,
        direccion_fiscal: row.try_get("direccion_fiscal")?,
        municipio_codigo: row.try_get("municipio_codigo")?,
        municipio_nombre: row.try_get("municipio_nombre")?,
        departamento_codigo: row.try_get("departamento_codigo")?,
        departamento_nombre: row.try_get("departamento_nombre")?,
        pais_codigo: row.try_get("pais_codigo")?,
        pais_nombre: row.try_get("pais_nombre")?,
        codigo_postal: row.try_get("codigo_postal")?,
        correo: row.try_get("correo")?,
        telefono: row.try_get("telefono")?,
        responsabilidades_fiscales: serde_json::from_value(resp).unwrap_or_default(),
        estado: CounterpartyStatus::parse(&estado),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Bind the 20 data columns followed by the JSONB responsibilities, in
/// `DATA_COLUMNS` order.
fn bind_data<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    c: &'q Counterparty,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    q = q
        .bind(&c.tipo_documento)
        .bind(&c.tipo_organizacion)
        .bind(&c.razon_social)
        .bind(&c.nombre_comercial)
        .bind(&c.primer_nombre)
        .bind(&c.otros_nombres)
        .bind(&c.primer_apellido)
        .bind(&c.segundo_apellido)
        .bind(&c.direccion)
        .bind(&c.direccion_fiscal)
        .bind(&c.municipio_codigo)
        .bind(&c.municipio_nombre)
        .bind(&c.departamento_codigo)
        .bind(&c.departamento_nombre)
        .bind(&c.pais_codigo)
        .bind(&c.pais_nombre)
        .bind(&c.codigo_postal)
        .bind(&c.correo)
        .bind(&c.telefono)
        .bind(c.estado.as_str());
    q.bind(serde_json::json!(c.responsabilidades_fiscales))
}

#[async_trait]
impl CounterpartyStore for PgCounterpartyStore {
    async fn find(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
    ) -> Result<Option<Counterparty>, StoreError> {
        let (table, id_col) = table(role);
        let sql = format!(
            "SELECT {} FROM {table} WHERE ofe_identificacion = $1 AND {id_col} = $2",
            Self::select_list(id_col)
        );
        let row = sqlx::query(&sql)
            .bind(normalize_nit(ofe))
            .bind(normalize_nit(id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(from_row).transpose()?)
    }

    async fn list(
        &self,
        role: CounterpartyRole,
        query: &ListQuery,
    ) -> Result<CounterpartyPage, StoreError> {
        let (table, id_col) = table(role);
        let filter = format!(
            "($1::text IS NULL OR ofe_identificacion = $1) AND \
             ($2::text IS NULL OR razon_social ILIKE $2 OR nombre_comercial ILIKE $2 OR {id_col} ILIKE $2)"
        );
        let search = query.search_term().map(|t| format!("%{t}%"));
        let ofe = query.ofe_filter();

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {filter}"))
            .bind(&ofe)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let direction = if query.descending() { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM {table} WHERE {filter} ORDER BY {} {direction} NULLS LAST LIMIT $3 OFFSET $4",
            Self::select_list(id_col),
            sort_sql(query.sort_column(), id_col),
        );
        let rows = sqlx::query(&sql)
            .bind(&ofe)
            .bind(&search)
            .bind(i64::try_from(query.limit()).unwrap_or(i64::MAX))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(CounterpartyPage {
            total: u64::try_from(total).unwrap_or_default(),
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
        let record = record.normalized();
        require_keys(&record)?;
        let (table, id_col) = table(role);

        let placeholders: Vec<String> = (3..=22).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {table} (ofe_identificacion, {id_col}, {}, responsabilidades_fiscales) \
             VALUES ($1, $2, {}, $23) \
             ON CONFLICT (ofe_identificacion, {id_col}) DO NOTHING \
             RETURNING {}",
            DATA_COLUMNS.join(", "),
            placeholders.join(", "),
            Self::select_list(id_col),
        );
        let q = sqlx::query(&sql)
            .bind(&record.ofe_identificacion)
            .bind(&record.identificacion);
        let row = bind_data(q, &record).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(from_row(&row)?),
            None => Err(StoreError::Conflict {
                role: role.label(),
                ofe: record.ofe_identificacion.clone(),
                id: record.identificacion.clone(),
            }),
        }
    }

    async fn update(
        &self,
        role: CounterpartyRole,
        ofe: &str,
        id: &str,
        record: Counterparty,
    ) -> Result<Counterparty, StoreError> {
        let (table, id_col) = table(role);
        let (ofe, id) = (normalize_nit(ofe), normalize_nit(id));

        let assignments: Vec<String> = DATA_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ${}", i + 3))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {}, responsabilidades_fiscales = $23, updated_at = now() \
             WHERE ofe_identificacion = $1 AND {id_col} = $2 \
             RETURNING {}",
            assignments.join(", "),
            Self::select_list(id_col),
        );
        let q = sqlx::query(&sql).bind(&ofe).bind(&id);
        let row = bind_data(q, &record).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(from_row(&row)?),
            None => Err(StoreError::NotFound { role: role.label(), ofe, id }),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "postgres"
    }
}
