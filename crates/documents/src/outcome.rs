use crate::model::{Document, DocumentType};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Batch id used when the provider answered without one, or when no group of
/// a submission reached the provider.
pub fn fallback_lote<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    format!("lote-{}", now.timestamp())
}

/// `(YYYY-MM-DD, HH:MM:SS)` for a processing timestamp.
pub fn processing_stamp(now: DateTime<FixedOffset>) -> (String, String) {
    (
        now.format("%Y-%m-%d").to_string(),
        now.format("%H:%M:%S").to_string(),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    #[serde(default, deserialize_with = "string_or_number")]
    pub cdo_id: String,
    #[serde(default, alias = "prefijo")]
    pub rfa_prefijo: String,
    #[serde(default, alias = "consecutivo", deserialize_with = "string_or_number")]
    pub cdo_consecutivo: String,
    #[serde(default)]
    pub fecha_procesamiento: String,
    #[serde(default)]
    pub hora_procesamiento: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    /// Document type tag (`FC`, `NC`, ...).
    #[serde(default)]
    pub documento: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub consecutivo: String,
    #[serde(default)]
    pub prefijo: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub fecha_procesamiento: String,
    #[serde(default)]
    pub hora_procesamiento: String,
}

impl FailedDocument {
    pub fn new(kind: DocumentType, doc: &Document, errors: Vec<String>, now: DateTime<FixedOffset>) -> Self {
        let (fecha, hora) = processing_stamp(now);
        Self {
            documento: kind.as_str().to_string(),
            consecutivo: doc.cdo_consecutivo.clone(),
            prefijo: doc.rfa_prefijo.clone(),
            errors,
            fecha_procesamiento: fecha,
            hora_procesamiento: hora,
        }
    }
}

/// Upstream registration result, surfaced verbatim to callers. Both lists are
/// always serialized as arrays, an upstream `null` included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRegistrationResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    pub lote: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "documentos_procesados", default, deserialize_with = "null_as_empty")]
    pub processed: Vec<ProcessedDocument>,
    #[serde(rename = "documentos_fallidos", default, deserialize_with = "null_as_empty")]
    pub failed: Vec<FailedDocument>,
}

impl DocumentRegistrationResponse {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn string_or_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fallback_lote_is_unix_seconds() {
        let now = DateTime::parse_from_rfc3339("2024-05-02T14:37:00-05:00").unwrap();
        assert_eq!(fallback_lote(&now), "lote-1714678620");
    }

    #[test]
    fn upstream_nulls_become_empty_arrays() {
        let resp: DocumentRegistrationResponse = serde_json::from_value(json!({
            "lote": 98765,
            "message": "ok",
            "documentos_procesados": null,
        }))
        .unwrap();
        assert_eq!(resp.lote, "98765");
        let out = serde_json::to_value(&resp).unwrap();
        assert_eq!(out["documentos_procesados"], json!([]));
        assert_eq!(out["documentos_fallidos"], json!([]));
    }

    #[test]
    fn upstream_outcomes_tolerate_loose_types() {
        let resp: DocumentRegistrationResponse = serde_json::from_value(json!({
            "lote": "L-1",
            "documentos_procesados": [{"cdo_id": 42, "prefijo": "SETT", "consecutivo": 5604}],
            "documentos_fallidos": [{"documento": "FC", "consecutivo": "5605", "errors": "rechazado"}],
        }))
        .unwrap();
        assert_eq!(resp.processed[0].cdo_id, "42");
        assert_eq!(resp.processed[0].rfa_prefijo, "SETT");
        assert_eq!(resp.processed[0].cdo_consecutivo, "5604");
        assert_eq!(resp.failed[0].errors, vec!["rechazado".to_string()]);
    }
}
