use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Factura electrónica
    FC,
    /// Nota crédito
    NC,
    /// Nota débito
    ND,
    /// Documento soporte
    DS,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [DocumentType::FC, DocumentType::NC, DocumentType::ND, DocumentType::DS];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::FC => "FC",
            DocumentType::NC => "NC",
            DocumentType::ND => "ND",
            DocumentType::DS => "DS",
        }
    }

    /// `tde_codigo` values accepted inside this type's array.
    pub fn allowed_type_codes(&self) -> &'static [&'static str] {
        match self {
            DocumentType::FC => &["01"],
            DocumentType::NC => &["03", "91"],
            DocumentType::ND => &["04", "92"],
            DocumentType::DS => &["05"],
        }
    }

    pub fn requires_resolution(&self) -> bool {
        matches!(self, DocumentType::FC | DocumentType::DS)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    #[serde(default)]
    pub ddo_secuencia: String,
    #[serde(default)]
    pub ddo_descripcion_uno: String,
    #[serde(default)]
    pub ddo_cantidad: String,
    #[serde(default)]
    pub ddo_valor_unitario: String,
    #[serde(default)]
    pub ddo_total: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn zero_amount() -> String {
    "0.00".to_string()
}

/// One document of a batch. Obligatory attributes are plain strings (an
/// omitted key deserializes to `""` and is rejected by the validator);
/// everything the enricher may fill is optional. Unknown keys travel to the
/// upstream gateway untouched through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub tde_codigo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_codigo: Option<String>,
    #[serde(default)]
    pub ofe_identificacion: String,
    #[serde(default)]
    pub adq_identificacion: String,
    #[serde(default)]
    pub rfa_resolucion: String,
    #[serde(default)]
    pub rfa_prefijo: String,
    #[serde(default)]
    pub cdo_consecutivo: String,
    #[serde(default)]
    pub cdo_fecha: String,
    #[serde(default)]
    pub cdo_hora: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdo_vencimiento: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdo_ambiente: Option<String>,
    #[serde(default)]
    pub mon_codigo: String,
    #[serde(default)]
    pub cdo_valor_sin_impuestos: String,
    #[serde(default)]
    pub cdo_impuestos: String,
    #[serde(default)]
    pub cdo_total: String,
    #[serde(default = "zero_amount")]
    pub cdo_retenciones_sugeridas: String,
    #[serde(default = "zero_amount")]
    pub cdo_anticipo: String,
    #[serde(default = "zero_amount")]
    pub cdo_redondeo: String,
    #[serde(default)]
    pub items: Vec<DocumentItem>,
    #[serde(default)]
    pub tributos: Vec<Value>,

    // Issuer block, overwritten from configuration during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_razon_social: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_municipio_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_municipio_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_departamento_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ofe_departamento_nombre: Option<String>,

    // Counterparty block, filled from master data only where absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_tipo_documento: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_tipo_organizacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_razon_social: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_nombre_comercial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_primer_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_otros_nombres: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_primer_apellido: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_segundo_apellido: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_municipio_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_municipio_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_departamento_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_departamento_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_pais_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_pais_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_codigo_postal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_correo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adq_telefono: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// True when the field is absent or blank, i.e. the enricher may fill it.
pub fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().map(str::trim).map_or(true, str::is_empty)
}

/// Assign `value` only where `field` is blank and `value` carries something.
pub fn fill_if_blank(field: &mut Option<String>, value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() && is_blank(field) => {
            *field = Some(v.to_string());
            true
        }
        _ => false,
    }
}

/// Four disjoint arrays keyed by document type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentBatch {
    #[serde(rename = "FC", default, skip_serializing_if = "Vec::is_empty")]
    pub fc: Vec<Document>,
    #[serde(rename = "NC", default, skip_serializing_if = "Vec::is_empty")]
    pub nc: Vec<Document>,
    #[serde(rename = "ND", default, skip_serializing_if = "Vec::is_empty")]
    pub nd: Vec<Document>,
    #[serde(rename = "DS", default, skip_serializing_if = "Vec::is_empty")]
    pub ds: Vec<Document>,
}

impl DocumentBatch {
    pub fn of(kind: DocumentType, docs: Vec<Document>) -> Self {
        let mut batch = Self::default();
        *batch.slot_mut(kind) = docs;
        batch
    }

    pub fn get(&self, kind: DocumentType) -> &[Document] {
        match kind {
            DocumentType::FC => &self.fc,
            DocumentType::NC => &self.nc,
            DocumentType::ND => &self.nd,
            DocumentType::DS => &self.ds,
        }
    }

    fn slot_mut(&mut self, kind: DocumentType) -> &mut Vec<Document> {
        match kind {
            DocumentType::FC => &mut self.fc,
            DocumentType::NC => &mut self.nc,
            DocumentType::ND => &mut self.nd,
            DocumentType::DS => &mut self.ds,
        }
    }

    pub fn take(&mut self, kind: DocumentType) -> Vec<Document> {
        std::mem::take(self.slot_mut(kind))
    }

    pub fn non_empty_kinds(&self) -> Vec<DocumentType> {
        DocumentType::ALL
            .into_iter()
            .filter(|k| !self.get(*k).is_empty())
            .collect()
    }
}

/// Body of `POST /registrar-documentos` and of the upstream registration call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub documentos: DocumentBatch,
}
