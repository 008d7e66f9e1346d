//! Read-side filtering.
//!
//! Restriction never surfaces as an error. A restricted field is returned
//! with its options narrowed (possibly to nothing); a restricted value is
//! dropped entirely.
//!
//! For `shared_only` fields a caller's view is bounded by what the caller
//! recorded themselves: the options they selected, and for multiselect
//! values the intersection of their selection with the target's.

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::caller::Caller;
use crate::error::PropResult;
use crate::field::{AccessMode, PropertyField};
use crate::ids::{FieldId, GroupId};
use crate::storage::{ValueSearch, ValueStore};
use crate::value::{option_ids, PropertyValue};

use super::PropertyAccessEngine;

/// Payloads the caller recorded for each field, across every target type.
#[derive(Debug, Default)]
pub(crate) struct CallerValues {
    by_field: HashMap<FieldId, Vec<JsonValue>>,
}

impl CallerValues {
    /// Load the caller's own values in `group_id`, but only when one of
    /// `fields` actually needs them.
    pub(crate) fn load<'a, I>(
        values: &dyn ValueStore,
        caller: &Caller,
        group_id: GroupId,
        fields: I,
    ) -> PropResult<Self>
    where
        I: IntoIterator<Item = &'a PropertyField>,
    {
        let needed: Vec<FieldId> = fields
            .into_iter()
            .filter(|f| {
                f.access_mode() == AccessMode::SharedOnly && !caller.is_source(f.source_plugin_id())
            })
            .map(|f| f.id)
            .collect();

        let Some(target_id) = caller.target_id() else {
            return Ok(Self::default());
        };
        if needed.is_empty() {
            return Ok(Self::default());
        }

        let mut search = ValueSearch::in_group(group_id).for_target(target_id);
        if let [only] = needed.as_slice() {
            search = search.for_field(*only);
        }

        let own = values
            .search_values(&search)
            .map_err(PropertyAccessEngine::storage_err)?;

        let mut by_field: HashMap<FieldId, Vec<JsonValue>> = HashMap::new();
        for v in own {
            if needed.contains(&v.field_id) {
                by_field.entry(v.field_id).or_default().push(v.value);
            }
        }
        Ok(Self { by_field })
    }

    fn payloads(&self, field_id: FieldId) -> &[JsonValue] {
        self.by_field.get(&field_id).map_or(&[][..], Vec::as_slice)
    }

    fn option_ids(&self, field_id: FieldId) -> HashSet<String> {
        self.payloads(field_id)
            .iter()
            .filter_map(option_ids)
            .flatten()
            .collect()
    }
}

/// Apply field read rules.
pub(crate) fn filter_field(caller: &Caller, mut field: PropertyField, own: &CallerValues) -> PropertyField {
    if caller.is_source(field.source_plugin_id()) {
        return field;
    }

    match field.access_mode() {
        AccessMode::Public => {}
        AccessMode::SourceOnly => {
            if !field.attrs.options.is_empty() {
                debug!(%caller, field_id = %field.id, "redacting source_only options");
            }
            field.attrs.options.clear();
        }
        AccessMode::SharedOnly => {
            let mine = own.option_ids(field.id);
            field.attrs.options.retain(|o| mine.contains(&o.id));
        }
    }
    field
}

/// Apply value read rules. `None` means the caller may not see the value.
pub(crate) fn filter_value(
    caller: &Caller,
    field: &PropertyField,
    mut value: PropertyValue,
    own: &CallerValues,
) -> Option<PropertyValue> {
    if caller.is_source(field.source_plugin_id()) {
        return Some(value);
    }

    match field.access_mode() {
        AccessMode::Public => Some(value),
        AccessMode::SourceOnly => None,
        AccessMode::SharedOnly if field.field_type.is_multi() => {
            let mine = own.option_ids(field.id);
            let theirs = value.option_ids()?;
            let shared = intersect_ordered(&theirs, &mine);
            if shared.is_empty() {
                return None;
            }
            value.value = JsonValue::Array(shared.into_iter().map(JsonValue::String).collect());
            Some(value)
        }
        AccessMode::SharedOnly => own
            .payloads(field.id)
            .iter()
            .any(|p| *p == value.value)
            .then_some(value),
    }
}

/// Members of `target` that are also in `mine`, in `target` order, deduplicated.
pub(crate) fn intersect_ordered(target: &[String], mine: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(target.len());
    target
        .iter()
        .filter(|id| mine.contains(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}
