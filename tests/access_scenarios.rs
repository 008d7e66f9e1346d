use propgate::{
    AccessMode, Caller, FieldAttrs, FieldOption, FieldSearch, FieldType, GroupId,
    InMemoryPropertyStore, PluginId, PropertyAccessEngine, PropertyField, PropertyValue,
    StaticPluginRegistry, ValueSearch,
};
use serde_json::json;
use std::sync::Arc;

fn engine_with_plugins(installed: &[&str]) -> (PropertyAccessEngine, Arc<StaticPluginRegistry>, GroupId) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(InMemoryPropertyStore::new());
    let plugins = Arc::new(StaticPluginRegistry::with_installed(installed.iter().copied()));
    let engine = PropertyAccessEngine::from_store(store, plugins.clone());
    let group = engine.register_property_group("custom_profile_attributes").unwrap();
    (engine, plugins, group.id)
}

fn plugin(id: &str) -> Caller {
    Caller::plugin(id).unwrap()
}

fn options(ids: &[&str]) -> Vec<FieldOption> {
    ids.iter().map(|id| FieldOption::new(*id, id.to_uppercase())).collect()
}

#[test]
fn source_only_protected_field_between_two_plugins() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1", "plugin2"]);

    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Clearance", FieldType::Select)
                .with_access_mode(AccessMode::SourceOnly)
                .with_protected(true)
                .with_options(options(&["opt1", "opt2"])),
        )
        .unwrap();

    let own_view = engine.get_property_field(&plugin("plugin1"), group_id, field.id).unwrap();
    assert_eq!(own_view.attrs.options.len(), 2);

    let other_view = engine.get_property_field(&plugin("plugin2"), group_id, field.id).unwrap();
    assert!(other_view.attrs.options.is_empty());
    assert_eq!(other_view.name, "Clearance");

    let attempt = PropertyValue::new(group_id, field.id, "user", "alice", json!("opt1"));
    let err = engine
        .create_property_value(&plugin("plugin2"), attempt.clone())
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(err.to_string().contains("plugin1"));

    let stored = engine.create_property_value(&plugin("plugin1"), attempt).unwrap();
    assert!(engine
        .get_property_value(&plugin("plugin2"), group_id, stored.id)
        .unwrap()
        .is_none());
    assert!(engine
        .get_property_value(&Caller::user("alice"), group_id, stored.id)
        .unwrap()
        .is_none());
    assert_eq!(
        engine
            .get_property_value(&plugin("plugin1"), group_id, stored.id)
            .unwrap()
            .map(|v| v.value),
        Some(json!("opt1"))
    );
}

#[test]
fn shared_only_multiselect_shows_intersection() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);

    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Interests", FieldType::Multiselect)
                .with_access_mode(AccessMode::SharedOnly)
                .with_options(options(&["opt1", "opt2", "opt3"])),
        )
        .unwrap();

    let alice = Caller::user("alice");
    let bob = Caller::user("bob");
    let alice_value = engine
        .create_property_value(
            &alice,
            PropertyValue::new(group_id, field.id, "user", "alice", json!(["opt1", "opt2"])),
        )
        .unwrap();
    engine
        .create_property_value(
            &bob,
            PropertyValue::new(group_id, field.id, "user", "bob", json!(["opt1", "opt3"])),
        )
        .unwrap();

    let seen = engine
        .get_property_value(&bob, group_id, alice_value.id)
        .unwrap()
        .unwrap();
    assert_eq!(seen.value, json!(["opt1"]));

    // Bob's view of the field only carries the options he picked himself.
    let bob_field = engine.get_property_field(&bob, group_id, field.id).unwrap();
    let ids: Vec<_> = bob_field.attrs.options.iter().map(|o| o.id.clone()).collect();
    assert_eq!(ids, vec!["opt1".to_string(), "opt3".to_string()]);

    // The source plugin sees everything untouched.
    let full = engine
        .get_property_value(&plugin("plugin1"), group_id, alice_value.id)
        .unwrap()
        .unwrap();
    assert_eq!(full.value, json!(["opt1", "opt2"]));

    // The stored payload is never modified by a filtered read.
    let again = engine
        .get_property_value(&alice, group_id, alice_value.id)
        .unwrap()
        .unwrap();
    assert_eq!(again.value, json!(["opt1", "opt2"]));
}

#[test]
fn shared_only_without_own_values_sees_nothing() {
    let (engine, _, group_id) = engine_with_plugins(&[]);

    let field = engine
        .create_property_field(
            &Caller::Anonymous,
            PropertyField::new(group_id, "Team", FieldType::Select)
                .with_access_mode(AccessMode::SharedOnly)
                .with_options(options(&["red", "blue"])),
        )
        .unwrap();
    let value = engine
        .create_property_value(
            &Caller::user("alice"),
            PropertyValue::new(group_id, field.id, "user", "alice", json!("red")),
        )
        .unwrap();

    let carol = Caller::user("carol");
    assert!(engine
        .get_property_field(&carol, group_id, field.id)
        .unwrap()
        .attrs
        .options
        .is_empty());
    assert!(engine.get_property_value(&carol, group_id, value.id).unwrap().is_none());
    assert!(engine
        .get_property_value(&Caller::Anonymous, group_id, value.id)
        .unwrap()
        .is_none());

    // Once carol records the same choice, alice's value becomes visible.
    engine
        .create_property_value(
            &carol,
            PropertyValue::new(group_id, field.id, "user", "carol", json!("red")),
        )
        .unwrap();
    let seen = engine.get_property_value(&carol, group_id, value.id).unwrap().unwrap();
    assert_eq!(seen.value, json!("red"));
}

#[test]
fn generic_create_cannot_claim_ownership() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);

    let protected = PropertyField::new(group_id, "Badge", FieldType::Text).with_protected(true);
    for caller in [Caller::Anonymous, Caller::user("admin"), plugin("plugin1")] {
        let err = engine.create_property_field(&caller, protected.clone()).unwrap_err();
        assert!(err.is_permission_denied(), "{caller} should be denied");
    }

    let owned = PropertyField::new(group_id, "Badge", FieldType::Text)
        .with_source_plugin(PluginId::new("plugin1").unwrap());
    assert!(engine
        .create_property_field(&plugin("plugin1"), owned)
        .unwrap_err()
        .is_permission_denied());
}

#[test]
fn source_plugin_id_is_immutable_for_everyone() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1", "plugin2"]);
    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Badge", FieldType::Text),
        )
        .unwrap();

    for caller in [plugin("plugin1"), plugin("plugin2"), Caller::user("admin"), Caller::Anonymous] {
        let mut moved = field.clone();
        moved.attrs.source_plugin_id = Some(PluginId::new("plugin2").unwrap());
        let err = engine.update_property_field(&caller, group_id, moved).unwrap_err();
        assert!(err.is_invalid_input(), "{caller}: {err}");

        let mut cleared = field.clone();
        cleared.attrs.source_plugin_id = None;
        assert!(engine
            .update_property_field(&caller, group_id, cleared)
            .unwrap_err()
            .is_invalid_input());
    }

    let stored = engine.get_property_field(&Caller::Anonymous, group_id, field.id).unwrap();
    assert_eq!(stored.source_plugin_id().map(PluginId::as_str), Some("plugin1"));
    assert_eq!(stored.version, 1);
}

#[test]
fn orphaned_protected_field_delete_yes_update_no() {
    let (engine, plugins, group_id) = engine_with_plugins(&["plugin1", "plugin2"]);
    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Badge", FieldType::Text).with_protected(true),
        )
        .unwrap();

    // Installed owner: nobody else may delete.
    assert!(engine
        .delete_property_field(&plugin("plugin2"), group_id, field.id)
        .unwrap_err()
        .is_permission_denied());

    plugins.uninstall("plugin1");

    let mut renamed = field.clone();
    renamed.name = "Stolen".to_string();
    let err = engine
        .update_property_field(&plugin("plugin2"), group_id, renamed.clone())
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(err.to_string().contains("plugin1"));
    assert!(engine
        .update_property_field(&Caller::user("admin"), group_id, renamed)
        .unwrap_err()
        .is_permission_denied());

    engine
        .delete_property_field(&plugin("plugin2"), group_id, field.id)
        .unwrap();
    assert!(engine
        .get_property_field(&Caller::Anonymous, group_id, field.id)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn protect_flag_only_settable_by_source() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);
    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Level", FieldType::Text),
        )
        .unwrap();

    let locked = field.clone().with_protected(true);
    assert!(engine
        .update_property_field(&Caller::user("admin"), group_id, locked.clone())
        .unwrap_err()
        .is_permission_denied());

    let updated = engine
        .update_property_field(&plugin("plugin1"), group_id, locked)
        .unwrap();
    assert!(updated.is_protected());
    assert_eq!(updated.version, 2);
}

#[test]
fn invalid_access_mode_rejected_at_deserialization() {
    let err = FieldAttrs::from_json(json!({ "access_mode": "private" })).unwrap_err();
    assert!(err.to_string().contains("private"));

    let raw = json!({
        "id": uuid::Uuid::new_v4(),
        "group_id": uuid::Uuid::new_v4(),
        "name": "Team",
        "type": "select",
        "target_type": "",
        "target_id": "",
        "attrs": { "access_mode": "everyone" },
        "create_at": "2024-01-01T00:00:00Z",
        "update_at": "2024-01-01T00:00:00Z",
        "delete_at": null,
        "version": 1
    });
    assert!(serde_json::from_value::<PropertyField>(raw).is_err());

    let attrs = FieldAttrs::from_json(json!({ "color_scheme": "dark" })).unwrap();
    assert_eq!(attrs.access_mode, AccessMode::Public);
}

#[test]
fn search_filters_each_field_and_drops_hidden_values() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);

    let public = engine
        .create_property_field(
            &Caller::Anonymous,
            PropertyField::new(group_id, "Public", FieldType::Select).with_options(options(&["a"])),
        )
        .unwrap();
    let secret = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Secret", FieldType::Select)
                .with_access_mode(AccessMode::SourceOnly)
                .with_options(options(&["s"])),
        )
        .unwrap();

    let fields = engine
        .search_property_fields(&Caller::user("alice"), FieldSearch::in_group(group_id))
        .unwrap();
    assert_eq!(fields.len(), 2);
    for f in &fields {
        if f.id == public.id {
            assert_eq!(f.attrs.options.len(), 1);
        } else {
            assert_eq!(f.id, secret.id);
            assert!(f.attrs.options.is_empty());
        }
    }

    engine
        .create_property_values(
            &plugin("plugin1"),
            vec![
                PropertyValue::new(group_id, public.id, "user", "alice", json!("a")),
                PropertyValue::new(group_id, secret.id, "user", "alice", json!("s")),
            ],
        )
        .unwrap();

    let alice_sees = engine
        .search_property_values(&Caller::user("alice"), ValueSearch::in_group(group_id).for_target("alice"))
        .unwrap();
    assert_eq!(alice_sees.len(), 1);
    assert_eq!(alice_sees[0].field_id, public.id);

    let plugin_sees = engine
        .search_property_values(&plugin("plugin1"), ValueSearch::in_group(group_id))
        .unwrap();
    assert_eq!(plugin_sees.len(), 2);
}

#[test]
fn legacy_caller_ids_map_to_users() {
    assert_eq!(Caller::from_legacy_id(""), Caller::Anonymous);
    assert_eq!(Caller::from_legacy_id("u1"), Caller::user("u1"));

    // A user whose id happens to equal a plugin id is still not that plugin.
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);
    let field = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Badge", FieldType::Text).with_protected(true),
        )
        .unwrap();
    let value = PropertyValue::new(group_id, field.id, "user", "u1", json!("x"));
    assert!(engine
        .create_property_value(&Caller::from_legacy_id("plugin1"), value)
        .unwrap_err()
        .is_permission_denied());
}

#[test]
fn bulk_and_by_name_reads_filter_each_item() {
    let (engine, _, group_id) = engine_with_plugins(&["plugin1"]);
    let source = plugin("plugin1");

    let tags = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Tags", FieldType::Multiselect)
                .with_access_mode(AccessMode::SharedOnly)
                .with_options(options(&["a", "b", "c"])),
        )
        .unwrap();
    let team = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Team", FieldType::Select)
                .with_access_mode(AccessMode::SharedOnly)
                .with_options(options(&["a", "b"])),
        )
        .unwrap();
    let rank = engine
        .create_property_field_for_plugin(
            "plugin1",
            PropertyField::new(group_id, "Rank", FieldType::Select)
                .with_access_mode(AccessMode::SourceOnly)
                .with_options(options(&["s"])),
        )
        .unwrap();

    let alice_values = engine
        .create_property_values(
            &source,
            vec![
                PropertyValue::new(group_id, tags.id, "user", "alice", json!(["a", "b"])),
                PropertyValue::new(group_id, team.id, "user", "alice", json!("a")),
                PropertyValue::new(group_id, rank.id, "user", "alice", json!("s")),
            ],
        )
        .unwrap();
    engine
        .create_property_values(
            &source,
            vec![
                PropertyValue::new(group_id, tags.id, "user", "bob", json!(["b", "c"])),
                PropertyValue::new(group_id, team.id, "user", "bob", json!("b")),
            ],
        )
        .unwrap();

    let bob = Caller::user("bob");
    let option_ids = |f: &PropertyField| f.attrs.options.iter().map(|o| o.id.clone()).collect::<Vec<_>>();

    // Both shared_only fields are narrowed in one call, each to bob's own picks.
    let fields = engine
        .get_property_fields(&bob, group_id, &[tags.id, team.id, rank.id])
        .unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(option_ids(&fields[0]), vec!["b", "c"]);
    assert_eq!(option_ids(&fields[1]), vec!["b"]);
    assert!(fields[2].attrs.options.is_empty());

    // Hidden values are left out, not returned empty.
    let ids: Vec<_> = alice_values.iter().map(|v| v.id).collect();
    let values = engine.get_property_values(&bob, group_id, &ids).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].field_id, tags.id);
    assert_eq!(values[0].value, json!(["b"]));

    let full = engine.get_property_values(&source, group_id, &ids).unwrap();
    assert_eq!(full.len(), 3);
    assert_eq!(full[0].value, json!(["a", "b"]));

    let by_name = engine.get_property_field_by_name(&bob, group_id, "", "Tags").unwrap();
    assert_eq!(option_ids(&by_name), vec!["b", "c"]);
    let stranger = engine
        .get_property_field_by_name(&Caller::user("zed"), group_id, "", "Tags")
        .unwrap();
    assert_eq!(stranger.id, tags.id);
    assert!(stranger.attrs.options.is_empty());
    assert!(engine
        .get_property_field_by_name(&Caller::user("zed"), group_id, "", "Rank")
        .unwrap()
        .attrs
        .options
        .is_empty());
    assert!(engine
        .get_property_field_by_name(&bob, group_id, "", "Missing")
        .unwrap_err()
        .is_not_found());
}
