//! Redaction helpers for diagnostics dumps
//!
//! Property values that may identify a user (RFID tags, card ids, credentials)
//! are replaced by a short hash so dumps can be shared.

use crate::store::Property;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

/// Property ids known to carry personal data
const SENSITIVE_PROPERTY_IDS: &[&str] = &[crate::api::ID_AUTH_PLUG_AND_CHARGE_ID];

const SENSITIVE_FRAGMENTS: &[&str] = &[
    "rfid", "tag", "card", "token", "user", "password", "secret", "key",
];

pub fn is_sensitive_property(id: &str) -> bool {
    if SENSITIVE_PROPERTY_IDS.contains(&id) {
        return true;
    }
    let lower = id.to_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// `<redacted:xxxxxxxx>`; empty and sentinel values are kept as they are
pub fn hash_value(value: &Value) -> Value {
    let text = match value {
        Value::Null => return Value::String("<none>".to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.is_empty() || text == crate::api::NO_TAG {
        return Value::String(text);
    }
    Value::String(format!("<redacted:{}>", short_hash(&text)))
}

/// First 8 hex characters of the SHA-256 of `text`
pub fn short_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Properties keyed by id with sensitive ones reduced to id, category and a marker
pub fn sanitize_properties<'a, I>(properties: I) -> Value
where
    I: IntoIterator<Item = &'a Property>,
{
    let mut sorted: Vec<&Property> = properties.into_iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = Map::new();
    for prop in sorted {
        let entry = if is_sensitive_property(&prop.id) {
            json!({
                "id": prop.id,
                "value": "<redacted>",
                "cat": prop.category.as_deref().unwrap_or("unknown"),
            })
        } else {
            serde_json::to_value(prop).unwrap_or(Value::Null)
        };
        out.insert(prop.id.clone(), entry);
    }
    Value::Object(out)
}
