//! The property access engine.
//!
//! [`PropertyAccessEngine`] sits in front of the plain property stores and
//! decides, per [`Caller`], what may be read and written. Reads are filtered
//! (never rejected); writes are authorized per distinct field and then
//! forwarded to the store together with the fences they were checked against.

mod batch;
mod read_access;
mod write_access;

use std::collections::{HashMap, HashSet};
use std::iter;
use std::sync::Arc;

use tracing::{debug, info};

use crate::caller::{Caller, PluginId};
use crate::config::{EngineConfig, ManagedGroup};
use crate::error::{NotFoundError, PropError, PropResult, ValidationError};
use crate::field::{PropertyField, PropertyGroup};
use crate::ids::{FieldId, GroupId, ValueId};
use crate::plugins::PluginRegistry;
use crate::storage::{
    FieldFence, FieldSearch, FieldStore, GroupStore, StorageError, ValueSearch, ValueStore,
};
use crate::validation::{validate_batch_len, validate_field, validate_value, MAX_NAME_LEN};
use crate::value::PropertyValue;

use batch::{authorize_value_writes, MissingField};
use read_access::{filter_field, filter_value, CallerValues};
use write_access::{check_field_delete, check_field_update, check_generic_create};

/// Access-controlled facade over the property stores.
#[derive(Clone)]
pub struct PropertyAccessEngine {
    groups: Arc<dyn GroupStore>,
    fields: Arc<dyn FieldStore>,
    values: Arc<dyn ValueStore>,
    plugins: Arc<dyn PluginRegistry>,
    config: EngineConfig,
}

impl PropertyAccessEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(
        groups: Arc<dyn GroupStore>,
        fields: Arc<dyn FieldStore>,
        values: Arc<dyn ValueStore>,
        plugins: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            groups,
            fields,
            values,
            plugins,
            config: EngineConfig::default(),
        }
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(
        groups: Arc<dyn GroupStore>,
        fields: Arc<dyn FieldStore>,
        values: Arc<dyn ValueStore>,
        plugins: Arc<dyn PluginRegistry>,
        config: EngineConfig,
    ) -> PropResult<Self> {
        config.validate()?;
        Ok(Self {
            groups,
            fields,
            values,
            plugins,
            config,
        })
    }

    /// Create an engine over a single store implementing all three traits.
    #[must_use]
    pub fn from_store<S>(store: Arc<S>, plugins: Arc<dyn PluginRegistry>) -> Self
    where
        S: GroupStore + FieldStore + ValueStore + 'static,
    {
        let groups: Arc<dyn GroupStore> = store.clone();
        let fields: Arc<dyn FieldStore> = store.clone();
        let values: Arc<dyn ValueStore> = store;
        Self::new(groups, fields, values, plugins)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get a reference to the group store.
    pub fn group_store(&self) -> &Arc<dyn GroupStore> {
        &self.groups
    }

    /// Get a reference to the field store.
    pub fn field_store(&self) -> &Arc<dyn FieldStore> {
        &self.fields
    }

    /// Get a reference to the value store.
    pub fn value_store(&self) -> &Arc<dyn ValueStore> {
        &self.values
    }

    /// Access the plugin registry used for orphan checks.
    pub fn plugin_registry(&self) -> &Arc<dyn PluginRegistry> {
        &self.plugins
    }

    /// Resolve the configured managed group.
    pub fn managed_group(&self) -> PropResult<ManagedGroup> {
        ManagedGroup::resolve(&self.config, self.groups.as_ref())
    }

    pub(crate) fn storage_err(err: StorageError) -> PropError {
        match err {
            StorageError::GroupNotFound(name) => NotFoundError::Group(name).into(),
            StorageError::FieldNotFound(id) => NotFoundError::Field(id).into(),
            StorageError::ValueNotFound(id) => NotFoundError::Value(id).into(),
            StorageError::DuplicateKey(key) => ValidationError::Duplicate(key).into(),
            StorageError::Conflict(message) => PropError::Storage {
                message,
                conflict: true,
            },
            StorageError::BackendError(message) => PropError::Storage {
                message,
                conflict: false,
            },
        }
    }

    fn ensure_group_exists(&self, id: GroupId) -> PropResult<()> {
        match self.groups.get(id).map_err(Self::storage_err)? {
            Some(_) => Ok(()),
            None => Err(NotFoundError::Group(id.to_string()).into()),
        }
    }

    fn require_field(&self, group_id: GroupId, field_id: FieldId) -> PropResult<PropertyField> {
        self.fields
            .get_field(group_id, field_id)
            .map_err(Self::storage_err)?
            .ok_or_else(|| NotFoundError::Field(field_id).into())
    }

    fn filter_fields(
        &self,
        caller: &Caller,
        group_id: GroupId,
        fields: Vec<PropertyField>,
    ) -> PropResult<Vec<PropertyField>> {
        let own = CallerValues::load(self.values.as_ref(), caller, group_id, &fields)?;
        Ok(fields
            .into_iter()
            .map(|f| filter_field(caller, f, &own))
            .collect())
    }

    fn filter_values(
        &self,
        caller: &Caller,
        group_id: GroupId,
        values: Vec<PropertyValue>,
    ) -> PropResult<Vec<PropertyValue>> {
        if values.is_empty() {
            return Ok(values);
        }

        let mut seen = HashSet::new();
        let ids: Vec<FieldId> = values
            .iter()
            .map(|v| v.field_id)
            .filter(|id| seen.insert(*id))
            .collect();
        let fields: HashMap<FieldId, PropertyField> = self
            .fields
            .get_fields(group_id, &ids)
            .map_err(Self::storage_err)?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let own = CallerValues::load(self.values.as_ref(), caller, group_id, fields.values())?;
        Ok(values
            .into_iter()
            .filter_map(|v| {
                // Values whose field is gone are not readable.
                let field = fields.get(&v.field_id)?;
                filter_value(caller, field, v, &own)
            })
            .collect())
    }

    fn single<T>(items: Vec<T>, what: &str) -> PropResult<T> {
        items
            .into_iter()
            .next()
            .ok_or_else(|| PropError::internal(format!("store returned no {what}")))
    }

    // --- groups -----------------------------------------------------------

    /// Return the group named `name`, creating it if needed.
    pub fn register_property_group(&self, name: &str) -> PropResult<PropertyGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            }
            .into());
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "name".to_string(),
                max_length: MAX_NAME_LEN,
            }
            .into());
        }

        let group = self.groups.register(name).map_err(Self::storage_err)?;
        info!(group_id = %group.id, name = %group.name, "registered property group");
        Ok(group)
    }

    /// Look up a registered group by name.
    pub fn get_property_group(&self, name: &str) -> PropResult<PropertyGroup> {
        self.groups
            .get_by_name(name)
            .map_err(Self::storage_err)?
            .ok_or_else(|| NotFoundError::Group(name.to_string()).into())
    }

    // --- fields -----------------------------------------------------------

    /// Create a field through the generic path.
    ///
    /// Never allowed to set `protected` or `source_plugin_id`, whoever the
    /// caller is.
    pub fn create_property_field(&self, caller: &Caller, field: PropertyField) -> PropResult<PropertyField> {
        self.ensure_group_exists(field.group_id)?;
        validate_field(&field)?;
        if let Err(err) = check_generic_create(&field) {
            debug!(%caller, name = %field.name, "generic field create denied");
            return Err(err.into());
        }

        let created = self.fields.create_field(field).map_err(Self::storage_err)?;
        info!(%caller, field_id = %created.id, group_id = %created.group_id, name = %created.name, "created property field");
        Ok(created)
    }

    /// Create a field owned by `plugin_id`.
    ///
    /// Any `source_plugin_id` already on `field` is replaced by `plugin_id`.
    pub fn create_property_field_for_plugin(
        &self,
        plugin_id: &str,
        mut field: PropertyField,
    ) -> PropResult<PropertyField> {
        let plugin = PluginId::new(plugin_id)?;
        self.ensure_group_exists(field.group_id)?;

        if let Some(supplied) = field.source_plugin_id().filter(|p| **p != plugin) {
            debug!(supplied = %supplied, plugin = %plugin, "overwriting supplied source_plugin_id");
        }
        field.attrs.source_plugin_id = Some(plugin);
        validate_field(&field)?;

        let created = self.fields.create_field(field).map_err(Self::storage_err)?;
        info!(
            field_id = %created.id,
            group_id = %created.group_id,
            name = %created.name,
            plugin = %created.owner_label(),
            protected = created.is_protected(),
            "created plugin property field"
        );
        Ok(created)
    }

    /// Get one field, filtered for `caller`.
    pub fn get_property_field(
        &self,
        caller: &Caller,
        group_id: GroupId,
        field_id: FieldId,
    ) -> PropResult<PropertyField> {
        let field = self.require_field(group_id, field_id)?;
        let own = CallerValues::load(self.values.as_ref(), caller, group_id, iter::once(&field))?;
        Ok(filter_field(caller, field, &own))
    }

    /// Get one field by target id and name, filtered for `caller`.
    pub fn get_property_field_by_name(
        &self,
        caller: &Caller,
        group_id: GroupId,
        target_id: &str,
        name: &str,
    ) -> PropResult<PropertyField> {
        let field = self
            .fields
            .get_field_by_name(group_id, target_id, name)
            .map_err(Self::storage_err)?
            .ok_or_else(|| NotFoundError::FieldByName {
                group_id,
                name: name.to_string(),
            })?;
        let own = CallerValues::load(self.values.as_ref(), caller, group_id, iter::once(&field))?;
        Ok(filter_field(caller, field, &own))
    }

    /// Get the live fields among `ids`, filtered for `caller`. Unknown ids
    /// are skipped.
    pub fn get_property_fields(
        &self,
        caller: &Caller,
        group_id: GroupId,
        ids: &[FieldId],
    ) -> PropResult<Vec<PropertyField>> {
        let fields = self.fields.get_fields(group_id, ids).map_err(Self::storage_err)?;
        self.filter_fields(caller, group_id, fields)
    }

    /// Search fields, filtered for `caller`.
    pub fn search_property_fields(
        &self,
        caller: &Caller,
        mut search: FieldSearch,
    ) -> PropResult<Vec<PropertyField>> {
        search.per_page = self.config.page_size(search.per_page);
        let fields = self.fields.search_fields(&search).map_err(Self::storage_err)?;
        self.filter_fields(caller, search.group_id, fields)
    }

    /// Update one field.
    pub fn update_property_field(
        &self,
        caller: &Caller,
        group_id: GroupId,
        field: PropertyField,
    ) -> PropResult<PropertyField> {
        let updated = self.update_property_fields(caller, group_id, vec![field])?;
        Self::single(updated, "field")
    }

    /// Update many fields of one group. All or nothing.
    pub fn update_property_fields(
        &self,
        caller: &Caller,
        group_id: GroupId,
        fields: Vec<PropertyField>,
    ) -> PropResult<Vec<PropertyField>> {
        validate_batch_len(fields.len(), self.config.max_batch_size)?;
        if fields.is_empty() {
            return Ok(fields);
        }
        for field in &fields {
            if field.group_id != group_id {
                return Err(ValidationError::GroupMismatch {
                    expected: group_id,
                    actual: field.group_id,
                }
                .into());
            }
            validate_field(field)?;
        }

        let ids: Vec<FieldId> = fields.iter().map(|f| f.id).collect();
        let existing: HashMap<FieldId, PropertyField> = self
            .fields
            .get_fields(group_id, &ids)
            .map_err(Self::storage_err)?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        for field in &fields {
            let current = existing
                .get(&field.id)
                .ok_or(NotFoundError::Field(field.id))?;
            check_field_update(caller, current, field)?;
        }

        let fences: Vec<FieldFence> = existing.values().map(FieldFence::of).collect();
        let updated = self
            .fields
            .update_fields(fields, &fences)
            .map_err(Self::storage_err)?;
        info!(%caller, %group_id, count = updated.len(), "updated property fields");
        Ok(updated)
    }

    /// Soft-delete a field and its values.
    pub fn delete_property_field(&self, caller: &Caller, group_id: GroupId, field_id: FieldId) -> PropResult<()> {
        let field = self.require_field(group_id, field_id)?;
        check_field_delete(caller, &field, self.plugins.as_ref())?;

        self.fields
            .delete_field(group_id, field_id, &[FieldFence::of(&field)])
            .map_err(Self::storage_err)?;
        let removed = self
            .values
            .delete_values_for_field(group_id, field_id, &[])
            .map_err(Self::storage_err)?;
        info!(%caller, %field_id, %group_id, values = removed, "deleted property field");
        Ok(())
    }

    // --- values -----------------------------------------------------------

    /// Create one value.
    pub fn create_property_value(&self, caller: &Caller, value: PropertyValue) -> PropResult<PropertyValue> {
        let created = self.create_property_values(caller, vec![value])?;
        Self::single(created, "value")
    }

    /// Create many values, possibly across fields and groups. All or nothing.
    pub fn create_property_values(
        &self,
        caller: &Caller,
        values: Vec<PropertyValue>,
    ) -> PropResult<Vec<PropertyValue>> {
        validate_batch_len(values.len(), self.config.max_batch_size)?;
        if values.is_empty() {
            return Ok(values);
        }
        values.iter().try_for_each(validate_value)?;

        let batch = authorize_value_writes(
            self.fields.as_ref(),
            caller,
            values.iter().map(|v| (v.group_id, v.field_id)),
            MissingField::Reject,
        )?;
        debug!(%caller, items = values.len(), fields = batch.len(), "authorized value create");
        self.values
            .create_values(values, batch.fences())
            .map_err(Self::storage_err)
    }

    /// Get one value. `Ok(None)` when the caller may not see it or its
    /// field no longer exists.
    pub fn get_property_value(
        &self,
        caller: &Caller,
        group_id: GroupId,
        value_id: ValueId,
    ) -> PropResult<Option<PropertyValue>> {
        let value = self
            .values
            .get_value(group_id, value_id)
            .map_err(Self::storage_err)?
            .ok_or(NotFoundError::Value(value_id))?;
        Ok(self.filter_values(caller, group_id, vec![value])?.pop())
    }

    /// Get the live values among `ids`, omitting those hidden from `caller`.
    pub fn get_property_values(
        &self,
        caller: &Caller,
        group_id: GroupId,
        ids: &[ValueId],
    ) -> PropResult<Vec<PropertyValue>> {
        let values = self.values.get_values(group_id, ids).map_err(Self::storage_err)?;
        self.filter_values(caller, group_id, values)
    }

    /// Search values, omitting those hidden from `caller`.
    ///
    /// The page is cut before filtering, so a page may hold fewer items than
    /// requested even when more exist.
    pub fn search_property_values(
        &self,
        caller: &Caller,
        mut search: ValueSearch,
    ) -> PropResult<Vec<PropertyValue>> {
        search.per_page = self.config.page_size(search.per_page);
        let values = self.values.search_values(&search).map_err(Self::storage_err)?;
        self.filter_values(caller, search.group_id, values)
    }

    /// Replace the payload of one value.
    pub fn update_property_value(
        &self,
        caller: &Caller,
        group_id: GroupId,
        value: PropertyValue,
    ) -> PropResult<PropertyValue> {
        let updated = self.update_property_values(caller, group_id, vec![value])?;
        Self::single(updated, "value")
    }

    /// Replace the payloads of many values of one group. All or nothing.
    ///
    /// Access is checked against the field each value is stored under; a
    /// value cannot be moved to another field.
    pub fn update_property_values(
        &self,
        caller: &Caller,
        group_id: GroupId,
        values: Vec<PropertyValue>,
    ) -> PropResult<Vec<PropertyValue>> {
        validate_batch_len(values.len(), self.config.max_batch_size)?;
        if values.is_empty() {
            return Ok(values);
        }
        for value in &values {
            if value.group_id != group_id {
                return Err(ValidationError::GroupMismatch {
                    expected: group_id,
                    actual: value.group_id,
                }
                .into());
            }
            validate_value(value)?;
        }

        let ids: Vec<ValueId> = values.iter().map(|v| v.id).collect();
        let stored: HashMap<ValueId, PropertyValue> = self
            .values
            .get_values(group_id, &ids)
            .map_err(Self::storage_err)?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();

        let mut refs = Vec::with_capacity(values.len());
        for value in &values {
            let current = stored.get(&value.id).ok_or(NotFoundError::Value(value.id))?;
            if current.field_id != value.field_id {
                return Err(ValidationError::ImmutableValueField {
                    value_id: value.id,
                    current: current.field_id,
                    requested: value.field_id,
                }
                .into());
            }
            refs.push((group_id, current.field_id));
        }

        let batch = authorize_value_writes(self.fields.as_ref(), caller, refs, MissingField::Reject)?;
        debug!(%caller, items = values.len(), fields = batch.len(), "authorized value update");
        self.values
            .update_values(values, batch.fences())
            .map_err(Self::storage_err)
    }

    /// Insert or replace one value.
    pub fn upsert_property_value(&self, caller: &Caller, value: PropertyValue) -> PropResult<PropertyValue> {
        let upserted = self.upsert_property_values(caller, vec![value])?;
        Self::single(upserted, "value")
    }

    /// Insert or replace many values keyed by field and target. All or nothing.
    pub fn upsert_property_values(
        &self,
        caller: &Caller,
        values: Vec<PropertyValue>,
    ) -> PropResult<Vec<PropertyValue>> {
        validate_batch_len(values.len(), self.config.max_batch_size)?;
        if values.is_empty() {
            return Ok(values);
        }
        values.iter().try_for_each(validate_value)?;

        let batch = authorize_value_writes(
            self.fields.as_ref(),
            caller,
            values.iter().map(|v| (v.group_id, v.field_id)),
            MissingField::Reject,
        )?;
        debug!(%caller, items = values.len(), fields = batch.len(), "authorized value upsert");
        self.values
            .upsert_values(values, batch.fences())
            .map_err(Self::storage_err)
    }

    /// Soft-delete one value. Values of deleted fields may always be removed.
    pub fn delete_property_value(&self, caller: &Caller, group_id: GroupId, value_id: ValueId) -> PropResult<()> {
        let value = self
            .values
            .get_value(group_id, value_id)
            .map_err(Self::storage_err)?
            .ok_or(NotFoundError::Value(value_id))?;

        let batch = authorize_value_writes(
            self.fields.as_ref(),
            caller,
            iter::once((group_id, value.field_id)),
            MissingField::Skip,
        )?;
        self.values
            .delete_value(group_id, value_id, batch.fences())
            .map_err(Self::storage_err)
    }

    /// Soft-delete every value recorded for one target.
    ///
    /// Fails without deleting anything if any of the target's values belongs
    /// to a field the caller may not write.
    pub fn delete_property_values_for_target(
        &self,
        caller: &Caller,
        group_id: GroupId,
        target_type: &str,
        target_id: &str,
    ) -> PropResult<usize> {
        let mut search = ValueSearch::in_group(group_id).for_target(target_id);
        search.target_type = Some(target_type.to_string());
        let existing = self.values.search_values(&search).map_err(Self::storage_err)?;

        // The store refuses the delete if a value under an unfenced field
        // appeared after this search.
        let batch = authorize_value_writes(
            self.fields.as_ref(),
            caller,
            existing.iter().map(|v| (group_id, v.field_id)),
            MissingField::Skip,
        )?;
        let removed = self
            .values
            .delete_values_for_target(group_id, target_type, target_id, batch.fences())
            .map_err(Self::storage_err)?;
        info!(%caller, %group_id, target_type, target_id, removed, "deleted target property values");
        Ok(removed)
    }

    /// Soft-delete every value of one field.
    pub fn delete_property_values_for_field(
        &self,
        caller: &Caller,
        group_id: GroupId,
        field_id: FieldId,
    ) -> PropResult<usize> {
        let batch = authorize_value_writes(
            self.fields.as_ref(),
            caller,
            iter::once((group_id, field_id)),
            MissingField::Skip,
        )?;
        let removed = self
            .values
            .delete_values_for_field(group_id, field_id, batch.fences())
            .map_err(Self::storage_err)?;
        info!(%caller, %group_id, %field_id, removed, "deleted field property values");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::field::{AccessMode, FieldOption, FieldType};
    use crate::plugins::StaticPluginRegistry;
    use crate::storage::InMemoryPropertyStore;

    fn engine() -> (PropertyAccessEngine, Arc<InMemoryPropertyStore>, GroupId) {
        let store = Arc::new(InMemoryPropertyStore::new());
        let plugins = Arc::new(StaticPluginRegistry::with_installed(["plugin1", "plugin2"]));
        let eng = PropertyAccessEngine::from_store(Arc::clone(&store), plugins);
        let group = eng.register_property_group("cpa").unwrap();
        (eng, store, group.id)
    }

    fn owned_select(group_id: GroupId, mode: AccessMode) -> PropertyField {
        PropertyField::new(group_id, "Skills", FieldType::Select)
            .with_access_mode(mode)
            .with_protected(true)
            .with_options(vec![FieldOption::new("opt1", "One"), FieldOption::new("opt2", "Two")])
    }

    #[test]
    fn storage_errors_map_to_kinds() {
        use crate::error::ErrorKind;

        let cases = [
            (StorageError::GroupNotFound("g".into()), ErrorKind::NotFound),
            (StorageError::FieldNotFound(FieldId::new()), ErrorKind::NotFound),
            (StorageError::ValueNotFound(ValueId::new()), ErrorKind::NotFound),
            (StorageError::DuplicateKey("k".into()), ErrorKind::InvalidInput),
            (StorageError::BackendError("io".into()), ErrorKind::Storage),
        ];
        for (err, kind) in cases {
            assert_eq!(PropertyAccessEngine::storage_err(err).kind(), kind);
        }
        assert!(PropertyAccessEngine::storage_err(StorageError::Conflict("moved".into())).is_retryable());
    }

    #[test]
    fn with_config_rejects_invalid() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let plugins: Arc<dyn PluginRegistry> = Arc::new(StaticPluginRegistry::new());
        let cfg = EngineConfig {
            max_batch_size: 0,
            ..EngineConfig::default()
        };
        let res = PropertyAccessEngine::with_config(store.clone(), store.clone(), store, plugins, cfg);
        assert!(res.is_err());
    }

    #[test]
    fn register_group_validates_name() {
        let (eng, _, group_id) = engine();
        assert!(eng.register_property_group("  ").unwrap_err().is_invalid_input());
        assert_eq!(eng.register_property_group("cpa").unwrap().id, group_id);
        assert_eq!(eng.get_property_group("cpa").unwrap().id, group_id);
        assert!(eng.get_property_group("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn create_field_requires_known_group() {
        let (eng, _, _) = engine();
        let field = PropertyField::new(GroupId::new(), "Team", FieldType::Text);
        assert!(eng
            .create_property_field(&Caller::Anonymous, field)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn plugin_path_overwrites_supplied_owner() {
        let (eng, _, group_id) = engine();
        let spoofed = owned_select(group_id, AccessMode::SourceOnly)
            .with_source_plugin(PluginId::new("plugin2").unwrap());
        let created = eng.create_property_field_for_plugin("plugin1", spoofed).unwrap();
        assert_eq!(created.source_plugin_id().map(PluginId::as_str), Some("plugin1"));

        let bad = owned_select(group_id, AccessMode::Public);
        assert!(eng
            .create_property_field_for_plugin("", bad.clone())
            .unwrap_err()
            .is_invalid_input());
        assert!(eng
            .create_property_field_for_plugin("bad id!", bad)
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn update_rejects_group_mismatch_and_unknown_field() {
        let (eng, _, group_id) = engine();
        let other = eng.register_property_group("other").unwrap();
        let field = eng
            .create_property_field(&Caller::Anonymous, PropertyField::new(group_id, "Team", FieldType::Text))
            .unwrap();

        let err = eng
            .update_property_field(&Caller::Anonymous, other.id, field.clone())
            .unwrap_err();
        assert!(err.is_invalid_input());

        let ghost = PropertyField::new(group_id, "Ghost", FieldType::Text);
        assert!(eng
            .update_property_field(&Caller::Anonymous, group_id, ghost)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn delete_field_cascades_to_values() {
        let (eng, store, group_id) = engine();
        let field = eng
            .create_property_field(&Caller::Anonymous, PropertyField::new(group_id, "Team", FieldType::Text))
            .unwrap();
        let value = eng
            .create_property_value(
                &Caller::Anonymous,
                PropertyValue::new(group_id, field.id, "user", "alice", json!("red")),
            )
            .unwrap();

        eng.delete_property_field(&Caller::Anonymous, group_id, field.id).unwrap();
        assert!(store.get_value(group_id, value.id).unwrap().is_none());
        assert!(eng
            .get_property_field(&Caller::Anonymous, group_id, field.id)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn batch_size_limit_applies() {
        let store = Arc::new(InMemoryPropertyStore::new());
        let plugins: Arc<dyn PluginRegistry> = Arc::new(StaticPluginRegistry::new());
        let cfg = EngineConfig {
            max_batch_size: 1,
            ..EngineConfig::default()
        };
        let eng = PropertyAccessEngine::with_config(store.clone(), store.clone(), store, plugins, cfg).unwrap();
        let group = eng.register_property_group("cpa").unwrap();
        let field = eng
            .create_property_field(&Caller::Anonymous, PropertyField::new(group.id, "Team", FieldType::Text))
            .unwrap();
        let values = vec![
            PropertyValue::new(group.id, field.id, "user", "a", json!("x")),
            PropertyValue::new(group.id, field.id, "user", "b", json!("y")),
        ];
        assert!(eng
            .create_property_values(&Caller::Anonymous, values)
            .unwrap_err()
            .is_invalid_input());
    }

    #[test]
    fn update_value_checks_stored_field() {
        let (eng, _, group_id) = engine();
        let open = eng
            .create_property_field(&Caller::Anonymous, PropertyField::new(group_id, "Team", FieldType::Text))
            .unwrap();
        let owned = eng
            .create_property_field_for_plugin(
                "plugin1",
                PropertyField::new(group_id, "Badge", FieldType::Text).with_protected(true),
            )
            .unwrap();
        let plugin1 = Caller::plugin("plugin1").unwrap();
        let stored = eng
            .create_property_value(&plugin1, PropertyValue::new(group_id, owned.id, "user", "alice", json!("gold")))
            .unwrap();

        // Pointing the update at an open field does not bypass protection.
        let mut moved = stored.clone();
        moved.field_id = open.id;
        moved.value = json!("tin");
        let err = eng
            .update_property_value(&Caller::user("mallory"), group_id, moved)
            .unwrap_err();
        assert!(err.is_invalid_input());

        let mut edit = stored;
        edit.value = json!("tin");
        assert!(eng
            .update_property_value(&Caller::user("mallory"), group_id, edit.clone())
            .unwrap_err()
            .is_permission_denied());
        assert_eq!(eng.update_property_value(&plugin1, group_id, edit).unwrap().value, json!("tin"));
    }

    #[test]
    fn value_of_deleted_field_reads_as_none() {
        let (eng, store, group_id) = engine();
        let field = eng
            .create_property_field(&Caller::Anonymous, PropertyField::new(group_id, "Team", FieldType::Text))
            .unwrap();
        let value = eng
            .create_property_value(
                &Caller::Anonymous,
                PropertyValue::new(group_id, field.id, "user", "alice", json!("red")),
            )
            .unwrap();

        // Delete the field behind the engine's back.
        store.delete_field(group_id, field.id, &[]).unwrap();
        assert!(eng
            .get_property_value(&Caller::Anonymous, group_id, value.id)
            .unwrap()
            .is_none());
        assert!(eng
            .get_property_value(&Caller::Anonymous, group_id, ValueId::new())
            .unwrap_err()
            .is_not_found());
    }
}
