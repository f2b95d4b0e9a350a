//! Lenient payload decoding.

use serde_json::{Map, Value};

/// A bus payload: the raw text plus an opportunistic JSON decoding of it.
///
/// Anything that does not decode to a JSON object is treated as an empty
/// record; handlers read fields as optional.
#[derive(Debug, Clone)]
pub struct Payload {
    raw: String,
    record: Value,
}

impl Payload {
    pub fn decode(bytes: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        let record = match serde_json::from_str::<Value>(&raw) {
            Ok(value @ Value::Object(_)) => value,
            _ => Value::Object(Map::new()),
        };
        Self { raw, record }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Raw text with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.raw.trim()
    }

    /// Look up a dotted path such as `SML.Leistung`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.record, |value, key| value.as_object()?.get(key))
            .filter(|v| !v.is_null())
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        self.field(path)?.as_f64()
    }

    pub fn string(&self, path: &str) -> Option<&str> {
        self.field(path)?.as_str()
    }

    /// Join the given fields into one comparable value, `:`-separated.
    /// Missing fields contribute an empty part; `None` if all are missing.
    pub fn composite(&self, fields: &[String]) -> Option<String> {
        let parts: Vec<Option<String>> = fields
            .iter()
            .map(|f| {
                self.field(f).map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .collect();

        if parts.iter().all(Option::is_none) {
            return None;
        }
        Some(
            parts
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect::<Vec<_>>()
                .join(":"),
        )
    }
}
