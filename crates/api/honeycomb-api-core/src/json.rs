//! JSON mapping for state values.
//!
//! Telemetry JSON is plain: numbers, strings, booleans, arrays and objects map onto
//! the matching [`StateValue`] variants. The one shorthand is `{ "buffer": [..] }`,
//! which becomes a numeric [`StateValue::Buffer`]. Loaded payload bytes are
//! serialized as `{ "bytes": <len> }` and never read back.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

use crate::value::{StateRecord, StateValue};

impl StateValue {
    /// Convert a JSON value. Fails only on a malformed `buffer` shorthand.
    pub fn from_json(value: JsonValue) -> Result<StateValue, String> {
        Ok(match value {
            JsonValue::Null => StateValue::Null,
            JsonValue::Bool(b) => StateValue::Bool(b),
            JsonValue::Number(n) => StateValue::Number(
                n.as_f64()
                    .ok_or_else(|| format!("number {n} is not representable as f64"))?,
            ),
            JsonValue::String(s) => StateValue::Text(s),
            JsonValue::Array(items) => StateValue::List(
                items
                    .into_iter()
                    .map(StateValue::from_json)
                    .collect::<Result<Vec<_>, _>>()?
                    .into(),
            ),
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(JsonValue::Array(items)) = obj.get("buffer") {
                        let mut values = Vec::with_capacity(items.len());
                        for item in items {
                            values.push(
                                item.as_f64()
                                    .ok_or_else(|| "buffer entries must be numbers".to_string())?,
                            );
                        }
                        return Ok(StateValue::Buffer(Arc::from(values)));
                    }
                }
                StateValue::Record(StateRecord::from_json_map(obj)?)
            }
        })
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            StateValue::Null => JsonValue::Null,
            StateValue::Bool(b) => JsonValue::Bool(*b),
            StateValue::Number(n) => json!(n),
            StateValue::Text(s) => JsonValue::String(s.clone()),
            StateValue::Buffer(values) => json!({ "buffer": &values[..] }),
            StateValue::Bytes(bytes) => json!({ "bytes": bytes.len() }),
            StateValue::List(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
            StateValue::Record(r) => r.to_json(),
        }
    }
}

impl StateRecord {
    pub fn from_json_map(obj: Map<String, JsonValue>) -> Result<StateRecord, String> {
        let mut record = StateRecord::with_capacity(obj.len());
        for (k, v) in obj {
            record.insert(k, StateValue::from_json(v)?);
        }
        Ok(record)
    }

    /// Convert a JSON object. Any other JSON shape is rejected.
    pub fn from_json(value: JsonValue) -> Result<StateRecord, String> {
        match value {
            JsonValue::Object(obj) => StateRecord::from_json_map(obj),
            other => Err(format!("expected a JSON object for state, found {other}")),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        let mut obj = Map::with_capacity(self.len());
        for (k, v) in self.iter() {
            obj.insert(k.to_string(), v.to_json());
        }
        JsonValue::Object(obj)
    }
}

impl Serialize for StateValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D>(deserializer: D) -> Result<StateValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = JsonValue::deserialize(deserializer)?;
        StateValue::from_json(v).map_err(de::Error::custom)
    }
}

impl Serialize for StateRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StateRecord {
    fn deserialize<D>(deserializer: D) -> Result<StateRecord, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = JsonValue::deserialize(deserializer)?;
        StateRecord::from_json(v).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_maps_to_variants() {
        let r = StateRecord::from_json(json!({
            "x": 1.5,
            "name": "mast",
            "ok": true,
            "cleared": null,
            "markers": [{ "id": 1 }],
            "pose": { "qw": 1.0 }
        }))
        .unwrap();
        assert_eq!(r.get("x"), Some(&StateValue::Number(1.5)));
        assert_eq!(r.get("name"), Some(&StateValue::text("mast")));
        assert_eq!(r.get("ok"), Some(&StateValue::Bool(true)));
        assert_eq!(r.get("cleared"), Some(&StateValue::Null));
        assert!(matches!(r.get("markers"), Some(StateValue::List(l)) if l.len() == 1));
        assert_eq!(r.get("pose").unwrap().as_record().unwrap().number("qw"), Some(1.0));
    }

    #[test]
    fn buffer_shorthand() {
        let v = StateValue::from_json(json!({ "buffer": [1, 2, 3] })).unwrap();
        assert_eq!(v, StateValue::buffer(vec![1.0, 2.0, 3.0]));
        assert_eq!(v.to_json(), json!({ "buffer": [1.0, 2.0, 3.0] }));
        assert!(StateValue::from_json(json!({ "buffer": ["a"] })).is_err());
    }

    #[test]
    fn record_requires_object() {
        assert!(StateRecord::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn serde_roundtrip_through_strings() {
        let s = r#"{"a":{"b":2.0},"c":"d"}"#;
        let r: StateRecord = serde_json::from_str(s).unwrap();
        let back: StateRecord = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(r, back);
    }
}
