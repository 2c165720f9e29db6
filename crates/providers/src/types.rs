use crate::GatewayError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const EVENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REJECTION_CODES: [&str; 4] = ["01", "02", "03", "04"];

fn required(value: &str, field: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::Invalid(format!("{field} is required")));
    }
    Ok(())
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, GatewayError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        GatewayError::Invalid(format!(
            "invalid {field} format, expected YYYY-MM-DD. Provided: {value}"
        ))
    })
}

// ----------------------------
// Document queries
// ----------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentQuery {
    #[serde(default)]
    pub company_nit: String,
    #[serde(default)]
    pub initial_date: String,
    #[serde(default)]
    pub final_date: String,
}

impl DocumentQuery {
    pub fn validate(&self) -> Result<(), GatewayError> {
        required(&self.company_nit, "CompanyNit")?;
        required(&self.initial_date, "InitialDate")?;
        required(&self.final_date, "FinalDate")?;
        let from = parse_date(&self.initial_date, "InitialDate")?;
        let to = parse_date(&self.final_date, "FinalDate")?;
        if to < from {
            return Err(GatewayError::Invalid(
                "FinalDate must be on or after InitialDate".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentByNumberQuery {
    #[serde(default)]
    pub company_nit: String,
    #[serde(default)]
    pub document_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_nit: Option<String>,
}

impl DocumentByNumberQuery {
    pub fn validate(&self) -> Result<(), GatewayError> {
        required(&self.company_nit, "CompanyNit")?;
        required(&self.document_number, "DocumentNumber")
    }
}

// ----------------------------
// Resolutions
// ----------------------------

/// A numbering range authorized by DIAN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default, alias = "resolucion", alias = "NumeroResolucion", deserialize_with = "string_or_number")]
    pub numero: String,
    #[serde(default, alias = "Prefijo")]
    pub prefijo: String,
    #[serde(default, alias = "Desde", deserialize_with = "string_or_number")]
    pub desde: String,
    #[serde(default, alias = "Hasta", deserialize_with = "string_or_number")]
    pub hasta: String,
    #[serde(default, alias = "FechaDesde")]
    pub fecha_desde: Option<String>,
    #[serde(default, alias = "FechaHasta")]
    pub fecha_hasta: Option<String>,
}

impl Resolution {
    pub fn matches(&self, numero: &str, prefijo: &str) -> bool {
        self.numero.trim() == numero.trim() && self.prefijo.trim().eq_ignore_ascii_case(prefijo.trim())
    }
}

// ----------------------------
// Radian events
// ----------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Acuse de recibo de la factura.
    Acuse,
    /// Recibo del bien o prestación del servicio.
    ReciboBien,
    Aceptacion,
    Reclamo,
}

impl EventType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACUSE" => Some(EventType::Acuse),
            "RECIBOBIEN" => Some(EventType::ReciboBien),
            "ACEPTACION" => Some(EventType::Aceptacion),
            "RECLAMO" => Some(EventType::Reclamo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Acuse => "ACUSE",
            EventType::ReciboBien => "RECIBOBIEN",
            EventType::Aceptacion => "ACEPTACION",
            EventType::Reclamo => "RECLAMO",
        }
    }

    /// DIAN Radian event code.
    pub fn dian_code(&self) -> &'static str {
        match self {
            EventType::Acuse => "030",
            EventType::Reclamo => "031",
            EventType::ReciboBien => "032",
            EventType::Aceptacion => "033",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventRegistration {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub documento_numero_completo: String,
    #[serde(default)]
    pub nombre_generador: String,
    #[serde(default)]
    pub apellido_generador: String,
    #[serde(default)]
    pub identificacion_generador: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo_rechazo: Option<String>,
    #[serde(default)]
    pub fecha_generacion_evento: String,
}

impl EventRegistration {
    /// Checks every field and returns the parsed event type.
    pub fn validate(&self) -> Result<EventType, GatewayError> {
        required(&self.event_type, "EventType")?;
        let kind = EventType::parse(&self.event_type).ok_or_else(|| {
            GatewayError::Invalid(format!(
                "invalid EventType format, expected ACUSE, RECIBOBIEN, ACEPTACION or RECLAMO. Provided: {}",
                self.event_type
            ))
        })?;
        required(&self.documento_numero_completo, "DocumentoNumeroCompleto")?;
        required(&self.nombre_generador, "NombreGenerador")?;
        required(&self.apellido_generador, "ApellidoGenerador")?;
        required(&self.identificacion_generador, "IdentificacionGenerador")?;
        required(&self.fecha_generacion_evento, "FechaGeneracionEvento")?;
        NaiveDateTime::parse_from_str(self.fecha_generacion_evento.trim(), EVENT_DATE_FORMAT)
            .map_err(|_| {
                GatewayError::Invalid(format!(
                    "invalid FechaGeneracionEvento format, expected YYYY-MM-DD HH:MM:SS. Provided: {}",
                    self.fecha_generacion_evento
                ))
            })?;

        let code = self.codigo_rechazo.as_deref().map(str::trim).filter(|c| !c.is_empty());
        match (kind, code) {
            (EventType::Reclamo, None) => {
                return Err(GatewayError::Invalid(
                    "CodigoRechazo is required for RECLAMO events".into(),
                ))
            }
            (_, Some(c)) if !REJECTION_CODES.contains(&c) => {
                return Err(GatewayError::Invalid(format!(
                    "invalid CodigoRechazo format, expected 01, 02, 03 or 04. Provided: {c}"
                )))
            }
            _ => {}
        }
        Ok(kind)
    }

    /// Provider payload for a validated event.
    pub(crate) fn to_wire(&self, kind: EventType, issuer_nit: &str, business_name: &str) -> Value {
        let mut payload = json!({
            "TipoEvento": kind.dian_code(),
            "NombreEvento": kind.as_str(),
            "NumeroDocumento": self.documento_numero_completo.trim(),
            "NitEmisor": issuer_nit,
            "RazonSocialEmisor": business_name,
            "Generador": {
                "Nombre": self.nombre_generador.trim(),
                "Apellido": self.apellido_generador.trim(),
                "Identificacion": self.identificacion_generador.trim(),
            },
            "FechaEvento": self.fecha_generacion_evento.trim(),
        });
        if kind == EventType::Reclamo {
            if let (Some(obj), Some(code)) = (payload.as_object_mut(), &self.codigo_rechazo) {
                obj.insert("CodigoRechazo".into(), Value::String(code.trim().to_string()));
            }
        }
        payload
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRegistrationResult {
    #[serde(default, alias = "Codigo", deserialize_with = "string_or_number")]
    pub codigo: String,
    #[serde(default, alias = "Mensaje")]
    pub mensaje: String,
    #[serde(default, alias = "Cude", skip_serializing_if = "Option::is_none")]
    pub cude: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ----------------------------
// DIAN status / downloads
// ----------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstadoDian {
    #[serde(default, alias = "Mensaje")]
    pub mensaje: String,
    #[serde(default, alias = "Status", deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(rename = "urlPDF", default, alias = "UrlPdf", alias = "url_pdf")]
    pub url_pdf: String,
    #[serde(rename = "urlXML", default, alias = "UrlXml", alias = "url_xml")]
    pub url_xml: String,
    #[serde(default, alias = "Cufe")]
    pub cufe: String,
}

impl EstadoDian {
    pub fn has_links(&self) -> bool {
        !self.url_pdf.trim().is_empty() || !self.url_xml.trim().is_empty()
    }
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
