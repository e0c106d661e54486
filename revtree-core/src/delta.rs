use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One typed slice of a tracked item's state.
///
/// The core never interprets `data`; only the item type's diff logic does.
/// A `null` payload inside a diff means "this delta type went away".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub description: String,
    pub delta_type: String,
    #[serde(default)]
    pub data: Value,
}

impl Delta {
    pub fn new(delta_type: impl Into<String>, data: Value) -> Self {
        let delta_type = delta_type.into();
        Self {
            description: delta_type.clone(),
            delta_type,
            data,
        }
    }

    pub fn removal(delta_type: impl Into<String>) -> Self {
        Self::new(delta_type, Value::Null)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_removal(&self) -> bool {
        self.data.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_creation() {
        let delta = Delta::new("tempo", json!(120)).with_description("Tempo");

        assert_eq!(delta.delta_type, "tempo");
        assert_eq!(delta.description, "Tempo");
        assert!(!delta.is_removal());
        assert!(Delta::removal("tempo").is_removal());
    }

    #[test]
    fn test_missing_data_reads_as_removal() {
        let delta: Delta =
            serde_json::from_str(r#"{"description":"x","delta_type":"x"}"#).unwrap();
        assert!(delta.is_removal());
    }
}
