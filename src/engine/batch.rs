//! All-or-nothing authorization for bulk writes.
//!
//! A batch may touch many fields across many groups. Every distinct field is
//! resolved and checked before anything is written; the first failure aborts
//! the whole batch with that field's error. On success the caller gets the
//! fences the store must honor when writing.

use std::collections::{HashMap, HashSet};

use crate::caller::Caller;
use crate::error::{NotFoundError, PropResult};
use crate::field::PropertyField;
use crate::ids::{FieldId, GroupId};
use crate::storage::{FieldFence, FieldStore};

use super::write_access::check_value_write;
use super::PropertyAccessEngine;

/// Fields a batch was authorized against.
#[derive(Debug, Default)]
pub(crate) struct AuthorizedBatch {
    fences: Vec<FieldFence>,
}

impl AuthorizedBatch {
    pub(crate) fn fences(&self) -> &[FieldFence] {
        &self.fences
    }

    pub(crate) fn len(&self) -> usize {
        self.fences.len()
    }
}

/// What to do with a referenced field that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissingField {
    /// Fail the batch with `NotFound`.
    Reject,
    /// Nothing left to protect; skip it.
    Skip,
}

/// Distinct `(group, field)` pairs in first-seen order.
fn distinct_refs<I>(refs: I) -> Vec<(GroupId, FieldId)>
where
    I: IntoIterator<Item = (GroupId, FieldId)>,
{
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(*r)).collect()
}

/// Resolve and check every field referenced by a value batch.
pub(crate) fn authorize_value_writes<I>(
    fields: &dyn FieldStore,
    caller: &Caller,
    refs: I,
    missing: MissingField,
) -> PropResult<AuthorizedBatch>
where
    I: IntoIterator<Item = (GroupId, FieldId)>,
{
    let refs = distinct_refs(refs);

    // One store round trip per group.
    let mut per_group: Vec<(GroupId, Vec<FieldId>)> = Vec::new();
    for (group_id, field_id) in &refs {
        match per_group.iter_mut().find(|(g, _)| g == group_id) {
            Some((_, ids)) => ids.push(*field_id),
            None => per_group.push((*group_id, vec![*field_id])),
        }
    }

    let mut resolved: HashMap<FieldId, PropertyField> = HashMap::with_capacity(refs.len());
    for (group_id, ids) in &per_group {
        let found = fields
            .get_fields(*group_id, ids)
            .map_err(PropertyAccessEngine::storage_err)?;
        resolved.extend(found.into_iter().map(|f| (f.id, f)));
    }

    let mut batch = AuthorizedBatch::default();
    for (_, field_id) in refs {
        let Some(field) = resolved.remove(&field_id) else {
            if missing == MissingField::Skip {
                continue;
            }
            return Err(NotFoundError::Field(field_id).into());
        };
        check_value_write(caller, &field)?;
        batch.fences.push(FieldFence::of(&field));
    }
    Ok(batch)
}
