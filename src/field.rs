//! Property groups, fields and their typed attributes.
//!
//! A field's attributes travel over the wire as a loose JSON object. Here
//! they are parsed once into [`FieldAttrs`] so that an invalid access mode
//! is rejected when the field is constructed, never when it is read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::caller::PluginId;
use crate::error::ValidationError;
use crate::ids::{FieldId, GroupId};

/// Attribute key holding the access mode.
pub const ATTR_ACCESS_MODE: &str = "access_mode";
/// Attribute key holding the protected flag.
pub const ATTR_PROTECTED: &str = "protected";
/// Attribute key holding the owning plugin id.
pub const ATTR_SOURCE_PLUGIN_ID: &str = "source_plugin_id";
/// Attribute key holding select options.
pub const ATTR_OPTIONS: &str = "options";

/// A namespace of fields, e.g. "custom profile attributes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyGroup {
    /// Group id.
    pub id: GroupId,
    /// Unique group name.
    pub name: String,
}

impl PropertyGroup {
    /// Creates a group with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
        }
    }
}

/// Read-side visibility policy of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Everyone sees everything.
    #[default]
    Public,
    /// Only the source plugin sees options and values.
    SourceOnly,
    /// Callers see what they share with the target.
    SharedOnly,
}

impl AccessMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::SourceOnly => "source_only",
            Self::SharedOnly => "shared_only",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ValidationError;

    /// The empty string is the default mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "public" => Ok(Self::Public),
            "source_only" => Ok(Self::SourceOnly),
            "shared_only" => Ok(Self::SharedOnly),
            other => Err(ValidationError::InvalidAccessMode {
                value: other.to_string(),
            }),
        }
    }
}

/// Data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text.
    Text,
    /// One option id.
    Select,
    /// A list of option ids.
    Multiselect,
    /// A date.
    Date,
    /// One user id.
    User,
    /// A list of user ids.
    Multiuser,
}

impl FieldType {
    /// Types whose values are drawn from the field's option list.
    #[must_use]
    pub const fn has_options(&self) -> bool {
        matches!(self, Self::Select | Self::Multiselect)
    }

    /// Types whose value payload is a JSON array.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Multiselect | Self::Multiuser)
    }

    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Select => "select",
            Self::Multiselect => "multiselect",
            Self::Date => "date",
            Self::User => "user",
            Self::Multiuser => "multiuser",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One choice of a select or multiselect field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Option id stored in values.
    pub id: String,
    /// Display name.
    #[serde(default, alias = "value")]
    pub name: String,
    /// Optional display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl FieldOption {
    /// Creates an option without a color.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
        }
    }
}

/// Typed view of a field's attribute bag.
///
/// Unknown keys are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, JsonValue>", into = "Map<String, JsonValue>")]
pub struct FieldAttrs {
    /// Read visibility.
    pub access_mode: AccessMode,
    /// Only the source plugin may write the field or its values.
    pub protected: bool,
    /// Owning plugin, set only through the plugin create path.
    pub source_plugin_id: Option<PluginId>,
    /// Choices of a select or multiselect field.
    pub options: Vec<FieldOption>,
    /// Keys this crate does not interpret.
    pub extra: Map<String, JsonValue>,
}

fn invalid_attr(key: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidAttribute {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl FieldAttrs {
    /// Parse a raw attribute bag.
    ///
    /// Missing, null and empty-string entries take their defaults.
    pub fn from_map(mut map: Map<String, JsonValue>) -> Result<Self, ValidationError> {
        let access_mode = match map.remove(ATTR_ACCESS_MODE) {
            None | Some(JsonValue::Null) => AccessMode::Public,
            Some(JsonValue::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ValidationError::InvalidAccessMode {
                    value: other.to_string(),
                })
            }
        };

        let protected = match map.remove(ATTR_PROTECTED) {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(b)) => b,
            Some(other) => {
                return Err(invalid_attr(
                    ATTR_PROTECTED,
                    format!("expected a boolean, got {other}"),
                ))
            }
        };

        let source_plugin_id = match map.remove(ATTR_SOURCE_PLUGIN_ID) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) if s.is_empty() => None,
            Some(JsonValue::String(s)) => Some(PluginId::new(s)?),
            Some(other) => {
                return Err(invalid_attr(
                    ATTR_SOURCE_PLUGIN_ID,
                    format!("expected a string, got {other}"),
                ))
            }
        };

        let options = match map.remove(ATTR_OPTIONS) {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(raw) => serde_json::from_value::<Vec<FieldOption>>(raw)
                .map_err(|e| invalid_attr(ATTR_OPTIONS, e.to_string()))?,
        };

        Ok(Self {
            access_mode,
            protected,
            source_plugin_id,
            options,
            extra: map,
        })
    }

    /// Parse attributes from any JSON value; only objects (or null) are accepted.
    pub fn from_json(value: JsonValue) -> Result<Self, ValidationError> {
        match value {
            JsonValue::Null => Ok(Self::default()),
            JsonValue::Object(map) => Self::from_map(map),
            other => Err(invalid_attr("attrs", format!("expected an object, got {other}"))),
        }
    }

    /// Render back to a raw attribute bag.
    #[must_use]
    pub fn to_map(&self) -> Map<String, JsonValue> {
        let mut map = self.extra.clone();
        map.insert(
            ATTR_ACCESS_MODE.to_string(),
            JsonValue::String(self.access_mode.as_str().to_string()),
        );
        map.insert(ATTR_PROTECTED.to_string(), JsonValue::Bool(self.protected));
        if let Some(source) = &self.source_plugin_id {
            map.insert(
                ATTR_SOURCE_PLUGIN_ID.to_string(),
                JsonValue::String(source.as_str().to_string()),
            );
        }
        if !self.options.is_empty() {
            map.insert(
                ATTR_OPTIONS.to_string(),
                serde_json::to_value(&self.options).unwrap_or(JsonValue::Null),
            );
        }
        map
    }
}

impl TryFrom<Map<String, JsonValue>> for FieldAttrs {
    type Error = ValidationError;

    fn try_from(map: Map<String, JsonValue>) -> Result<Self, Self::Error> {
        Self::from_map(map)
    }
}

impl From<FieldAttrs> for Map<String, JsonValue> {
    fn from(attrs: FieldAttrs) -> Self {
        attrs.to_map()
    }
}

/// A named, typed attribute definition in a group.
///
/// # Examples
///
/// ```
/// use propgate::{AccessMode, FieldOption, FieldType, GroupId, PropertyField};
///
/// let field = PropertyField::new(GroupId::new(), "Department", FieldType::Select)
///     .with_access_mode(AccessMode::SharedOnly)
///     .with_options(vec![FieldOption::new("eng", "Engineering")]);
/// assert_eq!(field.attrs.options.len(), 1);
/// assert!(!field.is_protected());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyField {
    /// Field id.
    pub id: FieldId,
    /// Group the field belongs to.
    pub group_id: GroupId,
    /// Name, unique per group and target among live fields.
    pub name: String,
    /// Kind of values the field holds.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Optional scope; empty for group-wide fields.
    #[serde(default)]
    pub target_type: String,
    /// Optional scope; empty for group-wide fields.
    #[serde(default)]
    pub target_id: String,
    /// Access attributes and options.
    #[serde(default)]
    pub attrs: FieldAttrs,
    /// Creation time.
    pub create_at: DateTime<Utc>,
    /// Last update time.
    pub update_at: DateTime<Utc>,
    /// Set when soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
    /// Starts at 1 and increments on every stored update.
    #[serde(default)]
    pub version: u64,
}

impl PropertyField {
    /// Creates an unprotected public field with a fresh id.
    #[must_use]
    pub fn new(group_id: GroupId, name: impl Into<String>, field_type: FieldType) -> Self {
        let now = Utc::now();
        Self {
            id: FieldId::new(),
            group_id,
            name: name.into(),
            field_type,
            target_type: String::new(),
            target_id: String::new(),
            attrs: FieldAttrs::default(),
            create_at: now,
            update_at: now,
            delete_at: None,
            version: 1,
        }
    }

    /// Sets the access mode.
    #[must_use]
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.attrs.access_mode = mode;
        self
    }

    /// Sets the option list.
    #[must_use]
    pub fn with_options(mut self, options: Vec<FieldOption>) -> Self {
        self.attrs.options = options;
        self
    }

    /// Sets the protected flag.
    #[must_use]
    pub fn with_protected(mut self, protected: bool) -> Self {
        self.attrs.protected = protected;
        self
    }

    /// Sets the owning plugin.
    #[must_use]
    pub fn with_source_plugin(mut self, plugin: PluginId) -> Self {
        self.attrs.source_plugin_id = Some(plugin);
        self
    }

    /// Scopes the field to a target.
    #[must_use]
    pub fn with_target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = target_type.into();
        self.target_id = target_id.into();
        self
    }

    /// Read visibility of the field.
    #[must_use]
    pub const fn access_mode(&self) -> AccessMode {
        self.attrs.access_mode
    }

    /// Whether writes are restricted to the source plugin.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.attrs.protected
    }

    /// The owning plugin, if any.
    #[must_use]
    pub const fn source_plugin_id(&self) -> Option<&PluginId> {
        self.attrs.source_plugin_id.as_ref()
    }

    /// Whether the field is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.delete_at.is_some()
    }

    /// Owner name for error messages; empty when the field has no owner.
    #[must_use]
    pub fn owner_label(&self) -> String {
        self.source_plugin_id()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default()
    }
}
