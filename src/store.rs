//! Property store and pending-write queue
//!
//! Properties arrive in pages of `{properties: [...], total: n}` per category
//! and are merged by id. Writes requested by callers are coalesced per id in
//! the [`UpdateQueue`] until the scheduler drains them.

use crate::api;
use crate::error::{Result, WallboxError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One device property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "cat", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Device metadata we do not interpret (type, access, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Property {
    pub fn new(id: &str, value: Value, category: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            value,
            category: category.map(str::to_string),
            extra: Map::new(),
        }
    }

    /// Build from a raw JSON object; ids may come as numbers
    pub(crate) fn from_json(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let id = match obj.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let category = obj.get("cat").and_then(Value::as_str).map(str::to_string);
        let extra = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "id" | "value" | "cat"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self {
            id,
            value: obj.get("value").cloned().unwrap_or(Value::Null),
            category,
            extra,
        })
    }
}

/// One validated page of a category listing
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPage {
    pub properties: Vec<Property>,
    pub total: u64,
}

impl PropertyPage {
    /// Validate the `{properties: list, total: int}` envelope.
    ///
    /// Every entry must be an object carrying an id; one bad entry rejects the
    /// whole page.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| WallboxError::protocol("Property page is not an object"))?;
        let raw = obj
            .get("properties")
            .and_then(Value::as_array)
            .ok_or_else(|| WallboxError::protocol("Missing or invalid 'properties' list"))?;
        let total = obj
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| WallboxError::protocol("Missing or invalid 'total'"))?;

        let properties = raw
            .iter()
            .map(Property::from_json)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| WallboxError::protocol("Property without id"))?;

        Ok(Self { properties, total })
    }

    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(&value)
    }
}

/// Render a value the way the device expects it in a write body
pub fn value_to_wire(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Properties keyed by id
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    properties: HashMap<String, Property>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert every property; ids not in `props` are left alone
    pub fn merge<I: IntoIterator<Item = Property>>(&mut self, props: I) {
        for prop in props {
            self.properties.insert(prop.id.clone(), prop);
        }
    }

    /// Replace only properties we already know about, keeping a known
    /// category when the update carries none
    pub fn refresh_existing<I: IntoIterator<Item = Property>>(&mut self, props: I) -> usize {
        let mut refreshed = 0;
        for mut prop in props {
            if let Some(slot) = self.properties.get_mut(&prop.id) {
                if prop.category.is_none() {
                    prop.category = slot.category.take();
                }
                *slot = prop;
                refreshed += 1;
            }
        }
        refreshed
    }

    pub fn get(&self, id: &str) -> Option<&Property> {
        self.properties.get(id)
    }

    pub fn value(&self, id: &str) -> Option<&Value> {
        self.properties.get(id).map(|p| &p.value)
    }

    /// Apply a confirmed write. Returns the category of the property, if known.
    pub fn set_value(&mut self, id: &str, value: Value) -> Option<String> {
        let prop = self.properties.get_mut(id)?;
        prop.value = value;
        prop.category.clone()
    }

    /// Socket count reported by the device, 1 when unknown
    pub fn number_of_sockets(&self) -> u32 {
        match self.value(api::ID_NUMBER_OF_SOCKETS) {
            Some(Value::Number(n)) => n.as_u64().map_or(1, |n| n as u32),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
            _ => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }
}

/// Pending writes, at most one per property id
#[derive(Debug, Clone, Default)]
pub struct UpdateQueue {
    pending: BTreeMap<String, Value>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write; a later write for the same id replaces the earlier one
    pub fn upsert(&mut self, id: &str, value: Value) {
        self.pending.insert(id.to_string(), value);
    }

    /// Copy of the queue to send without holding the lock
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.pending
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop the entry only if it still holds the value that was sent.
    ///
    /// Returns false when a newer value arrived meanwhile; it stays queued.
    pub fn remove_if_unchanged(&mut self, id: &str, sent: &Value) -> bool {
        match self.pending.get(id) {
            Some(current) if current == sent => {
                self.pending.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.pending.get(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_validation_accepts_envelope() {
        let page = PropertyPage::from_value(&json!({
            "version": 2,
            "properties": [
                {"id": "2129_0", "value": 16, "cat": "generic", "access": 1},
                {"id": 5, "value": "x"}
            ],
            "total": 2
        }))
        .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.properties[0].category.as_deref(), Some("generic"));
        assert_eq!(page.properties[0].extra.get("access"), Some(&json!(1)));
        assert_eq!(page.properties[1].id, "5");
    }

    #[test]
    fn test_page_validation_rejects_bad_shapes() {
        assert!(PropertyPage::from_value(&json!([])).is_err());
        assert!(PropertyPage::from_value(&json!({"properties": []})).is_err());
        assert!(PropertyPage::from_value(&json!({"properties": {}, "total": 1})).is_err());
        assert!(PropertyPage::from_value(&json!({"properties": [], "total": "1"})).is_err());
        assert!(
            PropertyPage::from_value(&json!({"properties": [{"value": 1}], "total": 1})).is_err()
        );
        assert!(PropertyPage::parse("{not json").is_err());
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(value_to_wire(&json!(16)), "16");
        assert_eq!(value_to_wire(&json!("L2")), "L2");
        assert_eq!(value_to_wire(&json!(1.5)), "1.5");
    }

    #[test]
    fn test_store_merge_and_set() {
        let mut store = PropertyStore::new();
        store.merge(vec![Property::new("2129_0", json!(16), Some("generic"))]);
        assert_eq!(store.set_value("2129_0", json!(10)), Some("generic".to_string()));
        assert_eq!(store.value("2129_0"), Some(&json!(10)));
        assert_eq!(store.set_value("missing", json!(1)), None);
        assert_eq!(
            store.refresh_existing(vec![
                Property::new("2129_0", json!(12), Some("generic")),
                Property::new("9999_0", json!(1), None),
            ]),
            1
        );
        assert!(store.get("9999_0").is_none());
    }

    #[test]
    fn test_number_of_sockets() {
        let mut store = PropertyStore::new();
        assert_eq!(store.number_of_sockets(), 1);
        store.merge(vec![Property::new("205E_0", json!(2), None)]);
        assert_eq!(store.number_of_sockets(), 2);
        store.merge(vec![Property::new("205E_0", json!("2"), None)]);
        assert_eq!(store.number_of_sockets(), 2);
    }

    #[test]
    fn test_queue_keeps_newer_value() {
        let mut queue = UpdateQueue::new();
        queue.upsert("2129_0", json!(10));
        let sent = queue.snapshot();
        queue.upsert("2129_0", json!(12));
        assert!(!queue.remove_if_unchanged("2129_0", &sent[0].1));
        assert_eq!(queue.get("2129_0"), Some(&json!(12)));
        assert!(queue.remove_if_unchanged("2129_0", &json!(12)));
        assert!(queue.is_empty());
    }
}
