//! Error types for propgate.
//!
//! All errors are strongly typed using thiserror. Every error maps onto one
//! of a small set of kinds (see [`ErrorKind`]) so that an API layer can turn
//! them into status codes without matching on individual variants.
//!
//! Read-path denial is never an error: restricted fields come back with
//! their options redacted and restricted values come back as `None`.

use std::fmt;

use thiserror::Error;

use crate::ids::{FieldId, GroupId, ValueId};

/// Input rejected before any authorization or storage work happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Unknown `access_mode` string.
    #[error("Invalid access mode '{value}': expected one of public, source_only, shared_only")]
    InvalidAccessMode {
        /// The rejected string.
        value: String,
    },

    /// Malformed attribute value.
    #[error("Invalid attribute '{key}': {reason}")]
    InvalidAttribute {
        /// Attribute key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Plugin id was empty.
    #[error("Plugin id cannot be empty")]
    EmptyPluginId,

    /// Plugin id outside the allowed grammar.
    #[error("Invalid plugin id '{plugin_id}': {reason}")]
    InvalidPluginId {
        /// The rejected id.
        plugin_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Update tried to change or clear `source_plugin_id`.
    #[error("Field {field_id}: source_plugin_id is immutable (current: '{current}', requested: '{requested}')")]
    ImmutableSourcePlugin {
        /// Field being updated.
        field_id: FieldId,
        /// Stored owner.
        current: String,
        /// Owner in the request.
        requested: String,
    },

    /// Update tried to move a value to another field.
    #[error("Value {value_id} belongs to field {current}; it cannot be moved to field {requested}")]
    ImmutableValueField {
        /// Value being updated.
        value_id: ValueId,
        /// Stored field.
        current: FieldId,
        /// Field in the request.
        requested: FieldId,
    },

    /// A required input was empty.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Input name.
        field: String,
    },

    /// An input exceeded its length limit.
    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        /// Input name.
        field: String,
        /// Limit in bytes.
        max_length: usize,
    },

    /// Access mode not allowed for the field type.
    #[error("Access mode {mode} is not supported for {field_type} fields")]
    UnsupportedAccessMode {
        /// Requested mode.
        mode: String,
        /// Field type.
        field_type: String,
    },

    /// Two options share an id.
    #[error("Duplicate option id '{option_id}'")]
    DuplicateOption {
        /// Repeated id.
        option_id: String,
    },

    /// Item does not belong to the requested group.
    #[error("Item belongs to group {actual}, expected group {expected}")]
    GroupMismatch {
        /// Group named by the call.
        expected: GroupId,
        /// Group on the item.
        actual: GroupId,
    },

    /// Bulk call over the configured limit.
    #[error("Batch of {actual} items exceeds the maximum of {max}")]
    BatchTooLarge {
        /// Items supplied.
        actual: usize,
        /// Configured limit.
        max: usize,
    },

    /// Unique key already taken.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Engine configuration rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}

/// Write-side authorization failures.
///
/// Messages always name the owning plugin so operators can diagnose
/// protections left behind by uninstalled plugins.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Write to a protected field by someone other than its owner.
    #[error("Field {field_id} is protected and can only be modified by plugin '{owner}'")]
    ProtectedField {
        /// Protected field.
        field_id: FieldId,
        /// Owning plugin.
        owner: String,
    },

    /// Delete of a protected field whose owner is still installed.
    #[error("Field {field_id} is protected and can only be deleted by plugin '{owner}' while it is installed")]
    ProtectedFieldDelete {
        /// Protected field.
        field_id: FieldId,
        /// Owning plugin.
        owner: String,
    },

    /// Generic create supplied `source_plugin_id`.
    #[error("source_plugin_id cannot be set directly; use the plugin creation path")]
    SourcePluginNotAllowed,

    /// Generic create supplied `protected`.
    #[error("protected can only be set by plugins")]
    ProtectedNotAllowed,

    /// Only the source plugin may turn `protected` on.
    #[error("Field {field_id} can only be marked protected by its source plugin '{owner}'")]
    ProtectNotOwner {
        /// Field being updated.
        field_id: FieldId,
        /// Owning plugin, empty if none.
        owner: String,
    },
}

/// Unknown group, field or value.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// No group with this name or id.
    #[error("Property group not found: {0}")]
    Group(String),

    /// No live field with this id.
    #[error("Property field not found: {0}")]
    Field(FieldId),

    /// No live field with this name.
    #[error("Property field not found: '{name}' (group {group_id})")]
    FieldByName {
        /// Group searched.
        group_id: GroupId,
        /// Requested name.
        name: String,
    },

    /// No live value with this id.
    #[error("Property value not found: {0}")]
    Value(ValueId),
}

/// Coarse classification of a [`PropError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`PropError::NotFound`].
    NotFound,
    /// [`PropError::PermissionDenied`].
    PermissionDenied,
    /// [`PropError::InvalidInput`].
    InvalidInput,
    /// [`PropError::Storage`].
    Storage,
    /// [`PropError::Internal`].
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidInput => "invalid_input",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Top-level error type for propgate.
#[derive(Debug, Error)]
pub enum PropError {
    /// Input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Write not authorized.
    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] AccessError),

    /// Referenced item missing.
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Store failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Backend message.
        message: String,
        /// A fenced field changed between the access check and the write.
        conflict: bool,
    },

    /// Invariant broken inside the engine.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl PropError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a permission error.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if the input was rejected.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns true if the caller may retry the same request.
    ///
    /// Only fence conflicts qualify: the field changed underneath the
    /// request and a retry re-runs the access check against the new state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { conflict: true, .. })
    }
}

/// Result type alias for propgate operations.
pub type PropResult<T> = Result<T, PropError>;
