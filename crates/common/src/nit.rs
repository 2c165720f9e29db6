/// Strip the trailing `-<verification digit>` from a tax identifier.
///
/// Every store lookup and cache key goes through here; raw identifiers are
/// never compared directly.
pub fn normalize_nit(id: &str) -> String {
    match id.split_once('-') {
        Some((base, _)) => base.trim().to_string(),
        None => id.trim().to_string(),
    }
}
