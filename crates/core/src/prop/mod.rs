use serde_json::{Map, Value};

use crate::{Result, StageError};

/// A networked sensor device taking part in a song.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prop {
    pub id: String,
    /// Connection settings, e.g. broker address and topic.
    pub network_details: Map<String, Value>,
    pub sensor_settings: Map<String, Value>,
}

impl Prop {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_settings(
        id: impl Into<String>,
        network_details: Map<String, Value>,
        sensor_settings: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            network_details,
            sensor_settings,
        }
    }

    /// Projects the prop into the mapping stored under a song's `props` key.
    pub fn to_mapping(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert(
            "network_details".into(),
            Value::Object(self.network_details.clone()),
        );
        map.insert(
            "sensor_settings".into(),
            Value::Object(self.sensor_settings.clone()),
        );
        Value::Object(map)
    }

    /// Replaces every field from `data`. Nothing is assigned unless all three
    /// keys are present and well typed.
    pub fn load_from_mapping(&mut self, data: &Value) -> Result<()> {
        let map = data.as_object().ok_or_else(|| StageError::InvalidField {
            field: "prop".into(),
            expected: "a mapping",
        })?;

        let id = match required(map, "id")? {
            Value::String(id) => id.clone(),
            _ => {
                return Err(StageError::InvalidField {
                    field: "id".into(),
                    expected: "a string",
                })
            }
        };
        let network_details = required_mapping(map, "network_details")?;
        let sensor_settings = required_mapping(map, "sensor_settings")?;

        self.id = id;
        self.network_details = network_details;
        self.sensor_settings = sensor_settings;
        Ok(())
    }

    pub fn from_mapping(data: &Value) -> Result<Self> {
        let mut prop = Self::default();
        prop.load_from_mapping(data)?;
        Ok(prop)
    }
}

fn required<'a>(map: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    map.get(field)
        .ok_or_else(|| StageError::MissingField(field.to_string()))
}

fn required_mapping(map: &Map<String, Value>, field: &str) -> Result<Map<String, Value>> {
    match required(map, field)? {
        Value::Object(inner) => Ok(inner.clone()),
        _ => Err(StageError::InvalidField {
            field: field.to_string(),
            expected: "a mapping",
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn projects_all_fields() {
        let mut prop = Prop::new("glove");
        prop.network_details
            .insert("topic".into(), json!("props/glove"));

        assert_eq!(
            prop.to_mapping(),
            json!({
                "id": "glove",
                "network_details": {"topic": "props/glove"},
                "sensor_settings": {}
            })
        );
    }

    #[test]
    fn loading_replaces_every_field() {
        let mut prop = Prop::new("old");
        prop.load_from_mapping(&json!({
            "id": "new",
            "network_details": {"ip": "10.0.0.4"},
            "sensor_settings": {"threshold": 0.3}
        }))
        .unwrap();

        assert_eq!(prop.id, "new");
        assert_eq!(prop.network_details.get("ip"), Some(&json!("10.0.0.4")));
        assert_eq!(prop.sensor_settings.get("threshold"), Some(&json!(0.3)));
    }

    #[test]
    fn missing_field_leaves_prop_untouched() {
        let mut prop = Prop::new("p1");
        let err = prop
            .load_from_mapping(&json!({"id": "p2", "network_details": {}}))
            .unwrap_err();

        assert!(matches!(err, StageError::MissingField(ref f) if f == "sensor_settings"));
        assert_eq!(prop, Prop::new("p1"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = Prop::from_mapping(&json!({
            "id": 7,
            "network_details": {},
            "sensor_settings": {}
        }))
        .unwrap_err();
        assert!(matches!(err, StageError::InvalidField { ref field, .. } if field == "id"));

        let err = Prop::from_mapping(&json!(["not", "a", "map"])).unwrap_err();
        assert!(matches!(err, StageError::InvalidField { .. }));
    }
}
