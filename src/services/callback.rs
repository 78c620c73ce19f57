//! Gateway callback payload parsing
//!
//! The gateway is inconsistent about how it delivers callbacks: JSON on some
//! channels, form-urlencoded on others, and occasionally a bare query string
//! with no content type at all. Everything is normalized into a flat string
//! map before any field is read, and the raw map is what gets recorded on the
//! donation's event trail.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Normalizes a callback body into a flat string map.
///
/// JSON objects keep their top-level entries (scalars stringified, nulls
/// dropped, nested values rendered as compact JSON). Anything else is decoded
/// as form-urlencoded pairs, which also covers raw query-string bodies. A
/// body declared as JSON but unparseable yields an empty map rather than a
/// garbage form parse.
pub fn parse_callback_payload(content_type: Option<&str>, body: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    let declared_json = content_type
        .map(|ct| ct.to_lowercase().contains("json"))
        .unwrap_or(false);
    let looks_like_json = trimmed.starts_with(['{', '[']);

    if declared_json || looks_like_json {
        if let Ok(JsonValue::Object(fields)) = serde_json::from_str::<JsonValue>(trimmed) {
            let mut map = HashMap::new();
            for (key, value) in fields {
                let rendered = match value {
                    JsonValue::Null => continue,
                    JsonValue::String(s) => s,
                    JsonValue::Number(n) => n.to_string(),
                    JsonValue::Bool(b) => b.to_string(),
                    other => other.to_string(),
                };
                map.insert(key, rendered);
            }
            return map;
        }
        if declared_json {
            return HashMap::new();
        }
    }

    parse_form_pairs(trimmed)
}

fn parse_form_pairs(body: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        let key = percent_decode(key);
        if key.trim().is_empty() {
            continue;
        }
        map.insert(key, percent_decode(value));
    }
    map
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    // Malformed escape, keep the literal percent sign
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Well-known callback fields resolved from their gateway aliases.
#[derive(Debug, Clone, Default)]
pub struct CallbackFields {
    pub reference: Option<String>,
    pub bill_code: Option<String>,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
    pub amount: Option<String>,
}

impl CallbackFields {
    /// Resolves fields from the flat map. For each field the first alias
    /// carrying a non-blank value wins; the reference aliases are ordered by
    /// how the gateway names the merchant reference across its channels.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            reference: first_non_blank(map, &["order_id", "refno", "payment_reference", "reference"]),
            bill_code: first_non_blank(map, &["billcode", "bill_code"]),
            status: first_non_blank(map, &["status"]),
            transaction_id: first_non_blank(map, &["transaction_id", "transactionId"]),
            reason: first_non_blank(map, &["reason"]),
            amount: first_non_blank(map, &["amount"]),
        }
    }
}

fn first_non_blank(map: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = map.get(*key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}
