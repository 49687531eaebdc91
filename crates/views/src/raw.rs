//! The single DTO-normalization boundary.
//!
//! Backend payloads arrive with inconsistent shapes: a lone object where a
//! list was expected, snake_case or camelCase keys, numbers encoded as
//! strings, `null` everywhere. Everything in this module resolves those
//! variations exactly once and never fails; missing or malformed values
//! become defaults.

use serde_json::{Map, Value};

/// Normalize a payload into its member objects.
///
/// - object  -> one-element list
/// - array   -> its object members, in order
/// - anything else (null, absent, scalars) -> empty
pub(crate) fn records(payload: &Value) -> Vec<RawRecord<'_>> {
    match payload {
        Value::Object(map) => vec![RawRecord::new(map)],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_object().map(RawRecord::new))
            .collect(),
        _ => Vec::new(),
    }
}

/// Like [`records`], but also unwraps a list nested under one of `keys`
/// (e.g. `{"data": [...]}`).
pub(crate) fn records_in<'a>(payload: &'a Value, keys: &[&str]) -> Vec<RawRecord<'a>> {
    if let Value::Object(map) = payload {
        for key in keys {
            if let Some(inner @ Value::Array(_)) = map.get(*key) {
                return records(inner);
            }
        }
    }
    records(payload)
}

/// Read-only view over one JSON object with tolerant field accessors.
///
/// Every accessor takes candidate names in priority order; the first
/// present, non-null candidate wins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawRecord<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> RawRecord<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn field(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.map.get(*name))
            .find(|v| !v.is_null())
    }

    /// Non-empty trimmed text, numbers rendered as text.
    pub(crate) fn opt_text(&self, names: &[&str]) -> Option<String> {
        let text = match self.field(names)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    pub(crate) fn text(&self, names: &[&str]) -> String {
        self.opt_text(names).unwrap_or_default()
    }

    /// Non-negative integer counter. Floats truncate, negatives clamp to 0.
    pub(crate) fn opt_count(&self, names: &[&str]) -> Option<u64> {
        let n = self.opt_number(names)?;
        Some(if n <= 0.0 { 0 } else { n.trunc() as u64 })
    }

    pub(crate) fn count(&self, names: &[&str]) -> u64 {
        self.opt_count(names).unwrap_or(0)
    }

    /// Positive integer identifier; `0` and negatives count as absent.
    pub(crate) fn opt_id(&self, names: &[&str]) -> Option<u64> {
        self.opt_count(names).filter(|id| *id > 0)
    }

    /// Hour figure: finite and non-negative.
    pub(crate) fn opt_hours(&self, names: &[&str]) -> Option<f64> {
        self.opt_number(names).map(|h| h.max(0.0))
    }

    pub(crate) fn hours(&self, names: &[&str]) -> f64 {
        self.opt_hours(names).unwrap_or(0.0)
    }

    /// Monetary figure: finite, may be negative (adjustments).
    pub(crate) fn opt_amount(&self, names: &[&str]) -> Option<f64> {
        self.opt_number(names)
    }

    pub(crate) fn object(&self, names: &[&str]) -> Option<RawRecord<'a>> {
        match self.field(names)? {
            Value::Object(map) => Some(RawRecord::new(map)),
            _ => None,
        }
    }

    pub(crate) fn list(&self, names: &[&str]) -> Vec<RawRecord<'a>> {
        match self.field(names) {
            Some(v @ Value::Array(_)) => records(v),
            _ => Vec::new(),
        }
    }

    fn opt_number(&self, names: &[&str]) -> Option<f64> {
        let n = match self.field(names)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }
}
