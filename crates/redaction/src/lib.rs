//! fe_redaction
//!
//! Sanitizes everything that leaves the process through logs or the audit
//! trail:
//! - header maps: sensitive names keep the key, value becomes `[REDACTED]`
//! - JSON / form bodies: sensitive keys redacted at any depth
//! - gzip payloads are inflated before inspection
//! - non-UTF-8 payloads are wrapped as base64
//! - oversized payloads are replaced by a `_truncated` / `_size` / `_preview` stub
//!
//! IMPORTANT: sanitization must never fail. Anything that cannot be parsed is
//! carried as an opaque (but still size-bounded) value.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Read;

pub const REDACTED: &str = "[REDACTED]";

pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// `api_key` / `api-key` / `apikey` are all covered by "key".
const SENSITIVE_FRAGMENTS: [&str; 6] = ["password", "secret", "token", "key", "credential", "auth"];

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| key.contains(f))
}

// ----------------------------
// Headers
// ----------------------------

/// Flatten a header map into `name -> value`, lower-casing names and joining
/// repeated headers with `", "`.
pub fn sanitize_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_ref().to_ascii_lowercase();
        let value = if is_sensitive_key(&name) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_ref()).into_owned()
        };
        out.entry(name)
            .and_modify(|existing| {
                if existing != REDACTED {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
            })
            .or_insert(value);
    }
    out
}

// ----------------------------
// URLs
// ----------------------------

/// Redact values of sensitive query parameters, keep everything else verbatim.
pub fn sanitize_url(url: &str) -> String {
    let (base, rest) = match url.split_once('?') {
        Some(parts) => parts,
        None => return url.to_string(),
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (rest, None),
    };
    let mut out = format!("{base}?{}", sanitize_pairs(query));
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

fn sanitize_pairs(encoded: &str) -> String {
    encoded
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if is_sensitive_key(k) => format!("{k}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

// ----------------------------
// JSON
// ----------------------------

pub fn sanitize_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive_key(&k) {
                    out.insert(k, Value::String(REDACTED.into()));
                } else {
                    out.insert(k, sanitize_json(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        other => other,
    }
}

// ----------------------------
// Bodies
// ----------------------------

#[derive(Debug, Clone, Copy)]
pub struct BodySanitizer {
    pub max_body_size: usize,
}

impl Default for BodySanitizer {
    fn default() -> Self {
        Self { max_body_size: DEFAULT_MAX_BODY_SIZE }
    }
}

impl BodySanitizer {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size: max_body_size.max(1) }
    }

    /// Sanitized JSON value for an HTTP payload; `None` for an empty body.
    pub fn sanitize(&self, raw: &[u8]) -> Option<Value> {
        if raw.is_empty() {
            return None;
        }
        let inflated = inflate_if_gzip(raw);
        let bytes: &[u8] = inflated.as_deref().unwrap_or(raw);

        let text = match std::str::from_utf8(bytes) {
            Ok(t) => t,
            Err(_) => return Some(self.bounded_binary(bytes)),
        };

        if text.len() > self.max_body_size {
            return Some(self.truncated(text));
        }

        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            return Some(sanitize_json(parsed));
        }
        if looks_like_form(text) {
            return Some(Value::String(sanitize_pairs(text)));
        }
        Some(Value::String(text.to_string()))
    }

    fn truncated(&self, text: &str) -> Value {
        let mut end = self.max_body_size.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        json!({
            "_truncated": true,
            "_size": text.len(),
            "_preview": &text[..end],
        })
    }

    fn bounded_binary(&self, bytes: &[u8]) -> Value {
        if bytes.len() > self.max_body_size {
            return json!({
                "_truncated": true,
                "_size": bytes.len(),
                "_encoding": "base64",
                "_preview": BASE64.encode(&bytes[..self.max_body_size]),
            });
        }
        json!({
            "_encoding": "base64",
            "_data": BASE64.encode(bytes),
        })
    }
}

fn inflate_if_gzip(raw: &[u8]) -> Option<Vec<u8>> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return None;
    }
    let mut out = Vec::new();
    GzDecoder::new(raw).read_to_end(&mut out).ok()?;
    Some(out)
}

fn looks_like_form(text: &str) -> bool {
    !text.contains(char::is_whitespace)
        && text.contains('=')
        && text.split('&').all(|pair| pair.contains('='))
}

// ----------------------------
// Tests
// ----------------------------
