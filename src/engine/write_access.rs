//! Write-side authorization.
//!
//! `protected` gates writes independently of the read-side access mode.
//! Only the plugin recorded in `source_plugin_id` may write a protected
//! field or its values. The single exception is deletion of a protected
//! field whose owner is no longer installed, which anyone may perform.

use tracing::{debug, warn};

use crate::caller::Caller;
use crate::error::{AccessError, PropResult, ValidationError};
use crate::field::PropertyField;
use crate::plugins::PluginRegistry;

/// Generic (non-plugin) field creation may set neither ownership attribute.
pub(crate) fn check_generic_create(field: &PropertyField) -> Result<(), AccessError> {
    if field.source_plugin_id().is_some() {
        return Err(AccessError::SourcePluginNotAllowed);
    }
    if field.is_protected() {
        return Err(AccessError::ProtectedNotAllowed);
    }
    Ok(())
}

/// Authorize replacing `existing` with `updated`.
///
/// The immutability check runs first so that an owner trying to rename
/// itself gets `InvalidInput` rather than a permission error.
pub(crate) fn check_field_update(
    caller: &Caller,
    existing: &PropertyField,
    updated: &PropertyField,
) -> PropResult<()> {
    if existing.source_plugin_id() != updated.source_plugin_id() {
        return Err(ValidationError::ImmutableSourcePlugin {
            field_id: existing.id,
            current: existing.owner_label(),
            requested: updated.owner_label(),
        }
        .into());
    }

    let is_source = caller.is_source(existing.source_plugin_id());

    if existing.is_protected() && !is_source {
        debug!(%caller, field_id = %existing.id, owner = %existing.owner_label(), "protected field update denied");
        return Err(AccessError::ProtectedField {
            field_id: existing.id,
            owner: existing.owner_label(),
        }
        .into());
    }

    if !existing.is_protected() && updated.is_protected() && !is_source {
        debug!(%caller, field_id = %existing.id, "protect flag change denied");
        return Err(AccessError::ProtectNotOwner {
            field_id: existing.id,
            owner: existing.owner_label(),
        }
        .into());
    }

    Ok(())
}

/// Authorize deleting `field`.
pub(crate) fn check_field_delete(
    caller: &Caller,
    field: &PropertyField,
    plugins: &dyn PluginRegistry,
) -> Result<(), AccessError> {
    if !field.is_protected() || caller.is_source(field.source_plugin_id()) {
        return Ok(());
    }

    let owner = field.owner_label();
    let installed = field
        .source_plugin_id()
        .is_some_and(|p| plugins.is_installed(p.as_str()));
    if !installed {
        warn!(%caller, field_id = %field.id, owner = %owner, "deleting orphaned protected field");
        return Ok(());
    }

    debug!(%caller, field_id = %field.id, owner = %owner, "protected field delete denied");
    Err(AccessError::ProtectedFieldDelete {
        field_id: field.id,
        owner,
    })
}

/// Authorize any value write (create, update, upsert, delete) against the
/// value's field.
pub(crate) fn check_value_write(caller: &Caller, field: &PropertyField) -> Result<(), AccessError> {
    if !field.is_protected() || caller.is_source(field.source_plugin_id()) {
        return Ok(());
    }
    debug!(%caller, field_id = %field.id, owner = %field.owner_label(), "protected value write denied");
    Err(AccessError::ProtectedField {
        field_id: field.id,
        owner: field.owner_label(),
    })
}
