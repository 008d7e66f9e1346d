//! In-memory storage backend.
//!
//! Thread-safe implementation of all three storage traits over one shared
//! state, so that value writes can check fences on fields. Intended for
//! embedded usage, tests, and as a reference implementation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::field::{PropertyField, PropertyGroup};
use crate::ids::{FieldId, GroupId, ValueId};
use crate::storage::traits::{
    FieldFence, FieldSearch, FieldStore, GroupStore, SearchCursor, StorageError, ValueSearch,
    ValueStore,
};
use crate::value::PropertyValue;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn after_cursor(create_at: chrono::DateTime<Utc>, id: &Uuid, cursor: Option<&SearchCursor>) -> bool {
    cursor.map_or(true, |c| (create_at, *id) > (c.create_at, c.id))
}

fn paginate<T>(mut items: Vec<T>, per_page: usize) -> Vec<T> {
    if per_page > 0 {
        items.truncate(per_page);
    }
    items
}

#[derive(Debug, Default)]
struct State {
    groups: HashMap<GroupId, PropertyGroup>,
    group_by_name: HashMap<String, GroupId>,
    fields: HashMap<FieldId, PropertyField>,
    values: HashMap<ValueId, PropertyValue>,
}

impl State {
    fn live_field(&self, group_id: GroupId, id: FieldId) -> Option<&PropertyField> {
        self.fields
            .get(&id)
            .filter(|f| f.group_id == group_id && !f.is_deleted())
    }

    fn live_value(&self, group_id: GroupId, id: ValueId) -> Option<&PropertyValue> {
        self.values
            .get(&id)
            .filter(|v| v.group_id == group_id && !v.is_deleted())
    }

    fn check_fences(&self, fences: &[FieldFence]) -> Result<(), StorageError> {
        for fence in fences {
            match self.fields.get(&fence.field_id) {
                None => {
                    return Err(StorageError::Conflict(format!(
                        "field {} no longer exists",
                        fence.field_id
                    )))
                }
                Some(f) if f.is_deleted() => {
                    return Err(StorageError::Conflict(format!(
                        "field {} was deleted",
                        fence.field_id
                    )))
                }
                Some(f) if f.version != fence.version => {
                    return Err(StorageError::Conflict(format!(
                        "field {} changed: authorized at version {}, now {}",
                        fence.field_id, fence.version, f.version
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn name_taken(&self, field: &PropertyField, ignore: &HashSet<FieldId>) -> bool {
        self.fields.values().any(|f| {
            !f.is_deleted()
                && !ignore.contains(&f.id)
                && f.group_id == field.group_id
                && f.target_id == field.target_id
                && f.name == field.name
        })
    }

    fn value_for_key(&self, value: &PropertyValue) -> Option<ValueId> {
        self.values
            .values()
            .find(|v| {
                !v.is_deleted()
                    && v.group_id == value.group_id
                    && v.field_id == value.field_id
                    && v.target_type == value.target_type
                    && v.target_id == value.target_id
            })
            .map(|v| v.id)
    }

    fn require_live_field(&self, group_id: GroupId, id: FieldId) -> Result<(), StorageError> {
        self.live_field(group_id, id)
            .map(|_| ())
            .ok_or(StorageError::FieldNotFound(id))
    }
}

fn field_key(field: &PropertyField) -> (GroupId, String, String) {
    (field.group_id, field.target_id.clone(), field.name.clone())
}

fn value_key(value: &PropertyValue) -> (GroupId, FieldId, String, String) {
    (
        value.group_id,
        value.field_id,
        value.target_type.clone(),
        value.target_id.clone(),
    )
}

/// Thread-safe in-memory property store.
#[derive(Debug, Default)]
pub struct InMemoryPropertyStore {
    state: RwLock<State>,
}

impl InMemoryPropertyStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values including tombstones.
    pub fn raw_value_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("value.raw_count"))?;
        Ok(state.values.len())
    }
}

impl GroupStore for InMemoryPropertyStore {
    fn register(&self, name: &str) -> Result<PropertyGroup, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("group.register"))?;
        if let Some(id) = state.group_by_name.get(name).copied() {
            return state
                .groups
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::BackendError(format!("group index points at missing group {id}")));
        }

        let group = PropertyGroup::new(name);
        state.group_by_name.insert(group.name.clone(), group.id);
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn get(&self, id: GroupId) -> Result<Option<PropertyGroup>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("group.get"))?;
        Ok(state.groups.get(&id).cloned())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<PropertyGroup>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("group.get_by_name"))?;
        Ok(state
            .group_by_name
            .get(name)
            .and_then(|id| state.groups.get(id))
            .cloned())
    }
}

impl FieldStore for InMemoryPropertyStore {
    fn create_field(&self, mut field: PropertyField) -> Result<PropertyField, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("field.create"))?;
        if state.fields.contains_key(&field.id) {
            return Err(StorageError::DuplicateKey(field.id.to_string()));
        }
        if state.name_taken(&field, &HashSet::new()) {
            return Err(StorageError::DuplicateKey(format!(
                "field '{}' already exists for target '{}' in group {}",
                field.name, field.target_id, field.group_id
            )));
        }

        let now = Utc::now();
        field.create_at = now;
        field.update_at = now;
        field.delete_at = None;
        field.version = 1;
        state.fields.insert(field.id, field.clone());
        Ok(field)
    }

    fn get_field(&self, group_id: GroupId, id: FieldId) -> Result<Option<PropertyField>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("field.get"))?;
        Ok(state.live_field(group_id, id).cloned())
    }

    fn get_field_by_name(
        &self,
        group_id: GroupId,
        target_id: &str,
        name: &str,
    ) -> Result<Option<PropertyField>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("field.get_by_name"))?;
        Ok(state
            .fields
            .values()
            .find(|f| {
                !f.is_deleted() && f.group_id == group_id && f.target_id == target_id && f.name == name
            })
            .cloned())
    }

    fn get_fields(&self, group_id: GroupId, ids: &[FieldId]) -> Result<Vec<PropertyField>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("field.get_many"))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.live_field(group_id, *id).cloned())
            .collect())
    }

    fn search_fields(&self, search: &FieldSearch) -> Result<Vec<PropertyField>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("field.search"))?;
        let mut fields: Vec<PropertyField> = state
            .fields
            .values()
            .filter(|f| !f.is_deleted() && f.group_id == search.group_id)
            .filter(|f| search.target_type.as_deref().map_or(true, |t| f.target_type == t))
            .filter(|f| search.target_id.as_deref().map_or(true, |t| f.target_id == t))
            .filter(|f| after_cursor(f.create_at, f.id.as_uuid(), search.cursor.as_ref()))
            .cloned()
            .collect();
        fields.sort_by(|a, b| (a.create_at, a.id).cmp(&(b.create_at, b.id)));
        Ok(paginate(fields, search.per_page))
    }

    fn update_fields(
        &self,
        fields: Vec<PropertyField>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyField>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("field.update"))?;
        state.check_fences(fences)?;

        let batch_ids: HashSet<FieldId> = fields.iter().map(|f| f.id).collect();
        if batch_ids.len() != fields.len() {
            return Err(StorageError::DuplicateKey(
                "field appears more than once in update batch".to_string(),
            ));
        }

        let mut batch_names = HashSet::with_capacity(fields.len());
        for field in &fields {
            state.require_live_field(field.group_id, field.id)?;
            if state.name_taken(field, &batch_ids) || !batch_names.insert(field_key(field)) {
                return Err(StorageError::DuplicateKey(format!(
                    "field '{}' already exists for target '{}' in group {}",
                    field.name, field.target_id, field.group_id
                )));
            }
        }

        let now = Utc::now();
        let mut out = Vec::with_capacity(fields.len());
        for mut field in fields {
            let Some(existing) = state.fields.get(&field.id) else {
                return Err(StorageError::FieldNotFound(field.id));
            };
            field.create_at = existing.create_at;
            field.version = existing.version + 1;
            field.update_at = now;
            field.delete_at = None;
            state.fields.insert(field.id, field.clone());
            out.push(field);
        }
        Ok(out)
    }

    fn delete_field(&self, group_id: GroupId, id: FieldId, fences: &[FieldFence]) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("field.delete"))?;
        state.check_fences(fences)?;
        state.require_live_field(group_id, id)?;

        let now = Utc::now();
        let field = state
            .fields
            .get_mut(&id)
            .ok_or(StorageError::FieldNotFound(id))?;
        field.delete_at = Some(now);
        field.update_at = now;
        field.version += 1;
        Ok(())
    }
}

impl ValueStore for InMemoryPropertyStore {
    fn create_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("value.create"))?;
        state.check_fences(fences)?;

        let mut batch_ids = HashSet::with_capacity(values.len());
        let mut batch_keys = HashSet::with_capacity(values.len());
        for value in &values {
            if state.values.contains_key(&value.id) || !batch_ids.insert(value.id) {
                return Err(StorageError::DuplicateKey(value.id.to_string()));
            }
            state.require_live_field(value.group_id, value.field_id)?;
            if state.value_for_key(value).is_some() || !batch_keys.insert(value_key(value)) {
                return Err(StorageError::DuplicateKey(format!(
                    "value for field {} and target '{}' already exists",
                    value.field_id, value.target_id
                )));
            }
        }

        let now = Utc::now();
        let mut out = Vec::with_capacity(values.len());
        for mut value in values {
            value.create_at = now;
            value.update_at = now;
            value.delete_at = None;
            state.values.insert(value.id, value.clone());
            out.push(value);
        }
        Ok(out)
    }

    fn get_value(&self, group_id: GroupId, id: ValueId) -> Result<Option<PropertyValue>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("value.get"))?;
        Ok(state.live_value(group_id, id).cloned())
    }

    fn get_values(&self, group_id: GroupId, ids: &[ValueId]) -> Result<Vec<PropertyValue>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("value.get_many"))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.live_value(group_id, *id).cloned())
            .collect())
    }

    fn search_values(&self, search: &ValueSearch) -> Result<Vec<PropertyValue>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("value.search"))?;
        let mut values: Vec<PropertyValue> = state
            .values
            .values()
            .filter(|v| !v.is_deleted() && v.group_id == search.group_id)
            .filter(|v| search.target_type.as_deref().map_or(true, |t| v.target_type == t))
            .filter(|v| search.target_ids.is_empty() || search.target_ids.contains(&v.target_id))
            .filter(|v| search.field_id.map_or(true, |f| v.field_id == f))
            .filter(|v| after_cursor(v.create_at, v.id.as_uuid(), search.cursor.as_ref()))
            .cloned()
            .collect();
        values.sort_by(|a, b| (a.create_at, a.id).cmp(&(b.create_at, b.id)));
        Ok(paginate(values, search.per_page))
    }

    fn update_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("value.update"))?;
        state.check_fences(fences)?;

        let mut batch_ids = HashSet::with_capacity(values.len());
        for value in &values {
            if state.live_value(value.group_id, value.id).is_none() {
                return Err(StorageError::ValueNotFound(value.id));
            }
            if !batch_ids.insert(value.id) {
                return Err(StorageError::DuplicateKey(format!(
                    "value {} appears more than once in update batch",
                    value.id
                )));
            }
        }

        let now = Utc::now();
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let stored = state
                .values
                .get_mut(&value.id)
                .ok_or(StorageError::ValueNotFound(value.id))?;
            stored.value = value.value;
            stored.update_at = now;
            out.push(stored.clone());
        }
        Ok(out)
    }

    fn upsert_values(
        &self,
        values: Vec<PropertyValue>,
        fences: &[FieldFence],
    ) -> Result<Vec<PropertyValue>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("value.upsert"))?;
        state.check_fences(fences)?;

        for value in &values {
            state.require_live_field(value.group_id, value.field_id)?;
        }

        let now = Utc::now();
        let mut out = Vec::with_capacity(values.len());
        for mut value in values {
            if let Some(existing_id) = state.value_for_key(&value) {
                let stored = state
                    .values
                    .get_mut(&existing_id)
                    .ok_or(StorageError::ValueNotFound(existing_id))?;
                stored.value = value.value;
                stored.update_at = now;
                out.push(stored.clone());
                continue;
            }

            if state.values.contains_key(&value.id) {
                value.id = ValueId::new();
            }
            value.create_at = now;
            value.update_at = now;
            value.delete_at = None;
            state.values.insert(value.id, value.clone());
            out.push(value);
        }
        Ok(out)
    }

    fn delete_value(&self, group_id: GroupId, id: ValueId, fences: &[FieldFence]) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("value.delete"))?;
        state.check_fences(fences)?;
        if state.live_value(group_id, id).is_none() {
            return Err(StorageError::ValueNotFound(id));
        }

        let now = Utc::now();
        let value = state
            .values
            .get_mut(&id)
            .ok_or(StorageError::ValueNotFound(id))?;
        value.delete_at = Some(now);
        value.update_at = now;
        Ok(())
    }

    fn delete_values_for_target(
        &self,
        group_id: GroupId,
        target_type: &str,
        target_id: &str,
        fences: &[FieldFence],
    ) -> Result<usize, StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("value.delete_for_target"))?;
        state.check_fences(fences)?;

        let is_target = |v: &PropertyValue| {
            !v.is_deleted()
                && v.group_id == group_id
                && v.target_type == target_type
                && v.target_id == target_id
        };
        // Every target value under a live field must have been authorized.
        let fenced: HashSet<FieldId> = fences.iter().map(|f| f.field_id).collect();
        if let Some(unfenced) = state.values.values().find(|v| {
            is_target(v)
                && !fenced.contains(&v.field_id)
                && state.live_field(group_id, v.field_id).is_some()
        }) {
            return Err(StorageError::Conflict(format!(
                "value {} of field {} was not authorized",
                unfenced.id, unfenced.field_id
            )));
        }

        let now = Utc::now();
        let mut deleted = 0;
        for value in state.values.values_mut() {
            if is_target(&*value) {
                value.delete_at = Some(now);
                value.update_at = now;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn delete_values_for_field(
        &self,
        group_id: GroupId,
        field_id: FieldId,
        fences: &[FieldFence],
    ) -> Result<usize, StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("value.delete_for_field"))?;
        state.check_fences(fences)?;

        let now = Utc::now();
        let mut deleted = 0;
        for value in state.values.values_mut() {
            if !value.is_deleted() && value.group_id == group_id && value.field_id == field_id {
                value.delete_at = Some(now);
                value.update_at = now;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
