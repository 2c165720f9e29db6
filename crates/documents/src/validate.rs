//! Per-document tax rule validation.
//!
//! Checks run in a fixed order and stop at the first failure. `index` is the
//! 1-based position inside the submitted array.

use crate::model::{Document, DocumentBatch, DocumentType};
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no documents provided")]
    NoDocuments,
    #[error("only one document type (FC, NC, ND or DS) can be provided per request, got: {0}")]
    MultipleTypes(String),
    #[error("document {index}: {field} is required")]
    Required { index: usize, field: &'static str },
    #[error("document {index}: invalid {field} format, expected {expected}. Provided: {value}")]
    InvalidFormat {
        index: usize,
        field: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("document {index}: cdo_fecha must be today's date ({today}) for DIAN FAD09e compliance. Provided: {provided}")]
    NotToday { index: usize, today: NaiveDate, provided: String },
    #[error("document {index}: items is required and must contain at least one item")]
    NoItems { index: usize },
    #[error("document {index}: cdo_vencimiento ({due}) must be on or after cdo_fecha ({issued})")]
    DueBeforeIssue { index: usize, due: NaiveDate, issued: NaiveDate },
    #[error("document {index}: tde_codigo '{code}' does not match document type {kind} (allowed: {allowed})")]
    TypeMismatch {
        index: usize,
        code: String,
        kind: DocumentType,
        allowed: String,
    },
    #[error("document {index}: top_codigo is required for DS documents and must be '10'. Provided: {provided}")]
    OperationType { index: usize, provided: String },
}

/// Exactly one of the four arrays must carry documents.
pub fn validate_batch_shape(batch: &DocumentBatch) -> Result<DocumentType, ValidationError> {
    let kinds = batch.non_empty_kinds();
    match kinds.as_slice() {
        [] => Err(ValidationError::NoDocuments),
        [single] => Ok(*single),
        many => Err(ValidationError::MultipleTypes(
            many.iter().map(DocumentType::as_str).collect::<Vec<_>>().join(", "),
        )),
    }
}

pub fn validate_document(
    doc: &Document,
    kind: DocumentType,
    index: usize,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    check_required(doc, kind, index)?;

    let issued = NaiveDate::parse_from_str(doc.cdo_fecha.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidFormat {
            index,
            field: "cdo_fecha",
            expected: "YYYY-MM-DD",
            value: doc.cdo_fecha.clone(),
        }
    })?;
    NaiveTime::parse_from_str(doc.cdo_hora.trim(), TIME_FORMAT).map_err(|_| {
        ValidationError::InvalidFormat {
            index,
            field: "cdo_hora",
            expected: "HH:MM:SS",
            value: doc.cdo_hora.clone(),
        }
    })?;

    if issued != today {
        return Err(ValidationError::NotToday {
            index,
            today,
            provided: doc.cdo_fecha.clone(),
        });
    }

    if doc.items.is_empty() {
        return Err(ValidationError::NoItems { index });
    }

    if let Some(due_raw) = doc.cdo_vencimiento.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let due = NaiveDate::parse_from_str(due_raw, DATE_FORMAT).map_err(|_| {
            ValidationError::InvalidFormat {
                index,
                field: "cdo_vencimiento",
                expected: "YYYY-MM-DD",
                value: due_raw.to_string(),
            }
        })?;
        if due < issued {
            return Err(ValidationError::DueBeforeIssue { index, due, issued });
        }
    }

    let code = doc.tde_codigo.trim();
    if !kind.allowed_type_codes().contains(&code) {
        return Err(ValidationError::TypeMismatch {
            index,
            code: code.to_string(),
            kind,
            allowed: kind.allowed_type_codes().join(", "),
        });
    }

    if kind == DocumentType::DS {
        let top = doc.top_codigo.as_deref().map(str::trim).unwrap_or_default();
        if top != "10" {
            return Err(ValidationError::OperationType {
                index,
                provided: top.to_string(),
            });
        }
    }

    Ok(())
}

fn check_required(doc: &Document, kind: DocumentType, index: usize) -> Result<(), ValidationError> {
    let fields: [(&'static str, &str); 15] = [
        ("tde_codigo", &doc.tde_codigo),
        ("ofe_identificacion", &doc.ofe_identificacion),
        ("adq_identificacion", &doc.adq_identificacion),
        ("rfa_resolucion", &doc.rfa_resolucion),
        ("rfa_prefijo", &doc.rfa_prefijo),
        ("cdo_consecutivo", &doc.cdo_consecutivo),
        ("cdo_fecha", &doc.cdo_fecha),
        ("cdo_hora", &doc.cdo_hora),
        ("mon_codigo", &doc.mon_codigo),
        ("cdo_valor_sin_impuestos", &doc.cdo_valor_sin_impuestos),
        ("cdo_impuestos", &doc.cdo_impuestos),
        ("cdo_total", &doc.cdo_total),
        ("cdo_retenciones_sugeridas", &doc.cdo_retenciones_sugeridas),
        ("cdo_anticipo", &doc.cdo_anticipo),
        ("cdo_redondeo", &doc.cdo_redondeo),
    ];
    for (field, value) in fields {
        if field == "rfa_resolucion" && !kind.requires_resolution() {
            continue;
        }
        if value.trim().is_empty() {
            return Err(ValidationError::Required { index, field });
        }
    }
    if !doc.cdo_consecutivo.trim().chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            index,
            field: "cdo_consecutivo",
            expected: "a numeric string",
            value: doc.cdo_consecutivo.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentItem;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn invoice() -> Document {
        Document {
            tde_codigo: "01".into(),
            ofe_identificacion: "860011153".into(),
            adq_identificacion: "900123456".into(),
            rfa_resolucion: "18760000001".into(),
            rfa_prefijo: "SETT".into(),
            cdo_consecutivo: "5604".into(),
            cdo_fecha: "2026-10-18".into(),
            cdo_hora: "14:37:00".into(),
            mon_codigo: "COP".into(),
            cdo_valor_sin_impuestos: "100000.00".into(),
            cdo_impuestos: "19000.00".into(),
            cdo_total: "119000.00".into(),
            cdo_retenciones_sugeridas: "0.00".into(),
            cdo_anticipo: "0.00".into(),
            cdo_redondeo: "0.00".into(),
            items: vec![DocumentItem {
                ddo_secuencia: "1".into(),
                ddo_descripcion_uno: "P".into(),
                ddo_cantidad: "1".into(),
                ddo_valor_unitario: "100000.00".into(),
                ddo_total: "100000.00".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn valid_invoice_passes() {
        assert_eq!(validate_document(&invoice(), DocumentType::FC, 1, today()), Ok(()));
    }

    #[test]
    fn yesterday_is_rejected_with_fad09e() {
        let mut doc = invoice();
        doc.cdo_fecha = "2026-10-17".into();
        let err = validate_document(&doc, DocumentType::FC, 1, today()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FAD09e"), "{msg}");
        assert!(msg.starts_with("document 1: cdo_fecha must be today's date (2026-10-18)"));
        assert!(msg.ends_with("Provided: 2026-10-17"));
    }

    #[test]
    fn resolution_optional_only_for_notes() {
        let mut doc = invoice();
        doc.rfa_resolucion.clear();
        let err = validate_document(&doc, DocumentType::FC, 2, today()).unwrap_err();
        assert_eq!(err.to_string(), "document 2: rfa_resolucion is required");

        doc.tde_codigo = "91".into();
        assert_eq!(validate_document(&doc, DocumentType::NC, 2, today()), Ok(()));
    }

    #[test]
    fn bad_formats_are_reported() {
        let mut doc = invoice();
        doc.cdo_hora = "2:37pm".into();
        let msg = validate_document(&doc, DocumentType::FC, 1, today()).unwrap_err().to_string();
        assert!(msg.contains("invalid cdo_hora format"));

        let mut doc = invoice();
        doc.cdo_fecha = "18/10/2026".into();
        let msg = validate_document(&doc, DocumentType::FC, 1, today()).unwrap_err().to_string();
        assert!(msg.contains("invalid cdo_fecha format"));
    }

    #[test]
    fn due_date_before_issue_is_rejected() {
        let mut doc = invoice();
        doc.cdo_vencimiento = Some("2026-10-01".into());
        let msg = validate_document(&doc, DocumentType::FC, 1, today()).unwrap_err().to_string();
        assert!(msg.contains("must be on or after cdo_fecha"));

        doc.cdo_vencimiento = Some(String::new());
        assert_eq!(validate_document(&doc, DocumentType::FC, 1, today()), Ok(()));
    }

    #[test]
    fn credit_note_code_in_invoice_array_is_rejected() {
        let mut doc = invoice();
        doc.tde_codigo = "03".into();
        let msg = validate_document(&doc, DocumentType::FC, 1, today()).unwrap_err().to_string();
        assert!(msg.contains("does not match document type"));
    }

    #[test]
    fn support_document_needs_operation_type_10() {
        let mut doc = invoice();
        doc.tde_codigo = "05".into();
        assert!(matches!(
            validate_document(&doc, DocumentType::DS, 1, today()),
            Err(ValidationError::OperationType { .. })
        ));
        doc.top_codigo = Some("11".into());
        assert!(validate_document(&doc, DocumentType::DS, 1, today()).is_err());
        doc.top_codigo = Some("10".into());
        assert_eq!(validate_document(&doc, DocumentType::DS, 1, today()), Ok(()));
    }

    #[test]
    fn empty_items_and_non_numeric_consecutive() {
        let mut doc = invoice();
        doc.items.clear();
        assert_eq!(
            validate_document(&doc, DocumentType::FC, 3, today()),
            Err(ValidationError::NoItems { index: 3 })
        );

        let mut doc = invoice();
        doc.cdo_consecutivo = "56A4".into();
        assert!(validate_document(&doc, DocumentType::FC, 1, today()).is_err());
    }

    #[test]
    fn batch_shape_requires_exactly_one_type() {
        assert_eq!(validate_batch_shape(&DocumentBatch::default()), Err(ValidationError::NoDocuments));

        let mut batch = DocumentBatch::of(DocumentType::FC, vec![invoice()]);
        assert_eq!(validate_batch_shape(&batch), Ok(DocumentType::FC));

        batch.nc.push(invoice());
        let msg = validate_batch_shape(&batch).unwrap_err().to_string();
        assert!(msg.contains("only one document type"));
    }
}
