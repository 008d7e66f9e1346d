//! # propgate - Access control for shared property stores
//!
//! propgate is a policy layer that sits in front of a plain key/value
//! "property" store. Core application code and installable plugins share one
//! table of typed fields and values; propgate decides, per caller, what each
//! of them may read and write.
//!
//! ## Core Concepts
//!
//! - **Field**: a typed attribute definition with an access mode, an optional
//!   owning plugin and a `protected` write lock
//! - **Value**: the payload a target (usually a user) records for a field
//! - **Caller**: who is asking; anonymous, an end user, or a plugin
//! - **Engine**: filters reads and authorizes writes, all or nothing per batch
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use propgate::{
//!     AccessMode, Caller, FieldOption, FieldType, InMemoryPropertyStore, PropertyAccessEngine,
//!     PropertyField, PropertyValue, StaticPluginRegistry,
//! };
//! use serde_json::json;
//!
//! let store = Arc::new(InMemoryPropertyStore::new());
//! let plugins = Arc::new(StaticPluginRegistry::with_installed(["com.example.survey"]));
//! let engine = PropertyAccessEngine::from_store(store, plugins);
//!
//! let group = engine.register_property_group("custom_profile_attributes")?;
//! let field = engine.create_property_field_for_plugin(
//!     "com.example.survey",
//!     PropertyField::new(group.id, "Mood", FieldType::Select)
//!         .with_access_mode(AccessMode::SourceOnly)
//!         .with_protected(true)
//!         .with_options(vec![FieldOption::new("happy", "Happy")]),
//! )?;
//!
//! // Other callers see the field but not its options, and cannot write to it.
//! let seen = engine.get_property_field(&Caller::user("alice"), group.id, field.id)?;
//! assert!(seen.attrs.options.is_empty());
//!
//! let value = PropertyValue::new(group.id, field.id, "user", "alice", json!("happy"));
//! assert!(engine.create_property_value(&Caller::user("alice"), value).is_err());
//! # Ok::<(), propgate::PropError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod caller;
pub mod error;
pub mod field;
pub mod ids;
pub mod value;

// Policy and collaborators
pub mod config;
pub mod engine;
pub mod plugins;
pub mod storage;
pub mod validation;

// Re-export primary types at crate root for convenience
pub use caller::{Caller, PluginId};
pub use config::{EngineConfig, ManagedGroup, DEFAULT_MANAGED_GROUP};
pub use engine::PropertyAccessEngine;
pub use error::{AccessError, ErrorKind, NotFoundError, PropError, PropResult, ValidationError};
pub use field::{AccessMode, FieldAttrs, FieldOption, FieldType, PropertyField, PropertyGroup};
pub use ids::{FieldId, GroupId, ValueId};
pub use plugins::{PluginRegistry, StaticPluginRegistry};
pub use storage::{
    FieldFence, FieldSearch, FieldStore, GroupStore, InMemoryPropertyStore, SearchCursor,
    StorageError, ValueSearch, ValueStore,
};
pub use value::PropertyValue;
