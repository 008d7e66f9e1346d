//! Property values.
//!
//! A value is an opaque JSON payload recorded for one target. For select
//! fields the payload is a single option id string; for multiselect fields it
//! is an array of option id strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ids::{FieldId, GroupId, ValueId};

/// A concrete value of a field for one target.
///
/// # Examples
///
/// ```
/// use propgate::{FieldId, GroupId, PropertyValue};
/// use serde_json::json;
///
/// let v = PropertyValue::new(GroupId::new(), FieldId::new(), "user", "alice", json!(["opt1"]));
/// assert_eq!(v.option_ids().unwrap(), vec!["opt1".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Value id.
    pub id: ValueId,
    /// Group of the value's field.
    pub group_id: GroupId,
    /// Field the value is recorded under.
    pub field_id: FieldId,
    /// Kind of target, e.g. `user`.
    #[serde(default)]
    pub target_type: String,
    /// Target the value describes.
    pub target_id: String,
    /// Raw payload; option ids for select types.
    pub value: JsonValue,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Last update time.
    pub update_at: DateTime<Utc>,
    /// Set when soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
}

impl PropertyValue {
    /// Creates a value with a fresh id.
    #[must_use]
    pub fn new(
        group_id: GroupId,
        field_id: FieldId,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        value: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ValueId::new(),
            group_id,
            field_id,
            target_type: target_type.into(),
            target_id: target_id.into(),
            value,
            create_at: now,
            update_at: now,
            delete_at: None,
        }
    }

    /// Whether the value is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.delete_at.is_some()
    }

    /// Option ids carried by the payload.
    ///
    /// A string payload yields one id, an array yields its string members
    /// (non-strings are skipped). Any other payload yields `None`.
    #[must_use]
    pub fn option_ids(&self) -> Option<Vec<String>> {
        option_ids(&self.value)
    }
}

/// Option ids carried by a raw payload; see [`PropertyValue::option_ids`].
#[must_use]
pub fn option_ids(payload: &JsonValue) -> Option<Vec<String>> {
    match payload {
        JsonValue::String(s) => Some(vec![s.clone()]),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_ids_from_payload_shapes() {
        assert_eq!(option_ids(&json!("opt1")), Some(vec!["opt1".to_string()]));
        assert_eq!(
            option_ids(&json!(["a", 1, "b"])),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(option_ids(&json!(42)), None);
        assert_eq!(option_ids(&JsonValue::Null), None);
    }

    #[test]
    fn new_value_is_live() {
        let v = PropertyValue::new(GroupId::new(), FieldId::new(), "user", "bob", json!("x"));
        assert!(!v.is_deleted());
        assert_eq!(v.create_at, v.update_at);
    }
}
