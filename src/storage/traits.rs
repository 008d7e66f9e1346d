//! Abstract storage traits for property groups, fields and values.
//!
//! These traits are the plain CRUD collaborator the engine sits in front of.
//! They carry no policy: anything that can reach a store can read and write
//! every row. The engine is the only component that should hold one.
//!
//! # Fences
//!
//! Every mutating call takes a slice of [`FieldFence`]s captured when the
//! engine checked access. Implementations must apply the whole call
//! atomically and reject it with [`StorageError::Conflict`] if any fenced
//! field is gone or its version moved since the check. This closes the
//! window between authorization and write without the engine owning a
//! transaction. Fences always refer to fields of the same backing store.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::field::{PropertyField, PropertyGroup};
use crate::ids::{FieldId, GroupId, ValueId};
use crate::value::PropertyValue;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Group not found.
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Field not found (or soft-deleted).
    #[error("Field not found: {0}")]
    FieldNotFound(FieldId),

    /// Value not found (or soft-deleted).
    #[error("Value not found: {0}")]
    ValueNotFound(ValueId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A fenced field changed between check and write.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// The version of a field the caller's write was authorized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldFence {
    /// The fenced field.
    pub field_id: FieldId,
    /// Version seen when access was checked.
    pub version: u64,
}

impl FieldFence {
    /// Fence on the current version of `field`.
    #[must_use]
    pub const fn of(field: &PropertyField) -> Self {
        Self {
            field_id: field.id,
            version: field.version,
        }
    }
}

/// Keyset pagination position: results strictly after `(create_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchCursor {
    /// Creation time of the last item seen.
    pub create_at: DateTime<Utc>,
    /// Id of the last item seen.
    pub id: Uuid,
}

impl SearchCursor {
    /// Cursor positioned after `field`.
    #[must_use]
    pub fn after_field(field: &PropertyField) -> Self {
        Self {
            create_at: field.create_at,
            id: *field.id.as_uuid(),
        }
    }

    /// Cursor positioned after `value`.
    #[must_use]
    pub fn after_value(value: &PropertyValue) -> Self {
        Self {
            create_at: value.create_at,
            id: *value.id.as_uuid(),
        }
    }
}

/// Field search filter. `per_page == 0` means no limit.
#[derive(Debug, Clone)]
pub struct FieldSearch {
    /// Group to search.
    pub group_id: GroupId,
    /// Match this target type only.
    pub target_type: Option<String>,
    /// Match this target id only.
    pub target_id: Option<String>,
    /// Resume after this position.
    pub cursor: Option<SearchCursor>,
    /// Page size.
    pub per_page: usize,
}

impl FieldSearch {
    /// All live fields of a group.
    #[must_use]
    pub const fn in_group(group_id: GroupId) -> Self {
        Self {
            group_id,
            target_type: None,
            target_id: None,
            cursor: None,
            per_page: 0,
        }
    }
}

/// Value search filter. `per_page == 0` means no limit; an empty
/// `target_ids` matches every target.
#[derive(Debug, Clone)]
pub struct ValueSearch {
    /// Group to search.
    pub group_id: GroupId,
    /// Match this target type only.
    pub target_type: Option<String>,
    /// Match any of these targets.
    pub target_ids: Vec<String>,
    /// Match this field only.
    pub field_id: Option<FieldId>,
    /// Resume after this position.
    pub cursor: Option<SearchCursor>,
    /// Page size.
    pub per_page: usize,
}

impl ValueSearch {
    /// All live values of a group.
    #[must_use]
    pub const fn in_group(group_id: GroupId) -> Self {
        Self {
            group_id,
            target_type: None,
            target_ids: Vec::new(),
            field_id: None,
            cursor: None,
            per_page: 0,
        }
    }

    /// Restrict to one field.
    #[must_use]
    pub fn for_field(mut self, field_id: FieldId) -> Self {
        self.field_id = Some(field_id);
        self
    }

    /// Restrict to one target id.
    #[must_use]
    pub fn for_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_ids = vec![target_id.into()];
        self
    }
}

/// Storage trait for property groups.
pub trait GroupStore: Send + Sync {
    /// Return the group named `name`, creating it if needed.
    fn register(&self, name: &str) -> Result<PropertyGroup, StorageError>;

    /// Get a group by id.
    fn get(&self, id: GroupId) -> Result<Option<PropertyGroup>, StorageError>;

    /// Get a group by name.
    fn get_by_name(&self, name: &str) -> Result<Option<PropertyGroup>, StorageError>;
}

/// Storage trait for property fields.
///
/// Reads never return soft-deleted fields.
pub trait FieldStore: Send + Sync {
    /// Insert a new field. Fails on duplicate id or duplicate
    /// `(group_id, target_id, name)` among live fields.
    fn create_field(&self, field: PropertyField) -> Result<PropertyField, StorageError>;

    /// Get a field of a group by id.
    fn get_field(&self, group_id: GroupId, id: FieldId) -> Result<Option<PropertyField>, StorageError>;

    /// Get a field of a group by target id and name.
    fn get_field_by_name(
        &self,
        group_id: GroupId,
        target_id: &str,
        name: &str,
    ) -> Result<Option<PropertyField>, StorageError>;

    /// Get the live fields among `ids`, in request order, skipping unknown ids.
    fn get_fields(&self, group_id: GroupId, ids: &[FieldId]) -> Result<Vec<PropertyField>, StorageError>;

    /// Search live fields ordered by `(create_at, id)`.
    fn search_fields(&self, search: &FieldSearch) -> Result<Vec<PropertyField>, StorageError>;

    /// Replace existing fields. All or nothing. Bumps `version` and `update_at`.
    fn update_fields(
        &self,
        fields: Vec<PropertyField>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyField>, StorageError>;

    /// Soft-delete a field.
    fn delete_field(&self, group_id: GroupId, id: FieldId, fences: &[FieldFence]) -> Result<(), StorageError>;
}

/// Storage trait for property values.
///
/// Reads never return soft-deleted values.
pub trait ValueStore: Send + Sync {
    /// Insert new values. All or nothing. Fails on duplicate id or a second
    /// live value for the same `(field_id, target_type, target_id)`.
    fn create_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError>;

    /// Get a value of a group by id.
    fn get_value(&self, group_id: GroupId, id: ValueId) -> Result<Option<PropertyValue>, StorageError>;

    /// Get the live values among `ids`, in request order, skipping unknown ids.
    fn get_values(&self, group_id: GroupId, ids: &[ValueId]) -> Result<Vec<PropertyValue>, StorageError>;

    /// Search live values ordered by `(create_at, id)`.
    fn search_values(&self, search: &ValueSearch) -> Result<Vec<PropertyValue>, StorageError>;

    /// Replace the payloads of existing values. All or nothing.
    fn update_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError>;

    /// Insert or replace by `(field_id, target_type, target_id)`. All or nothing.
    fn upsert_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError>;

    /// Soft-delete one value.
    fn delete_value(&self, group_id: GroupId, id: ValueId, fences: &[FieldFence]) -> Result<(), StorageError>;

    /// Soft-delete every value of a target. Returns the number deleted.
    ///
    /// `fences` is the full set of fields the caller was authorized for.
    /// A live target value under a live field outside that set fails the
    /// call with [`StorageError::Conflict`].
    fn delete_values_for_target(
        &self,
        group_id: GroupId,
        target_type: &str,
        target_id: &str,
        fences: &[FieldFence],
    ) -> Result<usize, StorageError>;

    /// Soft-delete every value of a field. Returns the number deleted.
    fn delete_values_for_field(
        &self,
        group_id: GroupId,
        field_id: FieldId,
        fences: &[FieldFence],
    ) -> Result<usize, StorageError>;
}
