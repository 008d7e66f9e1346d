//! Engine configuration and the managed property group.
//!
//! The group an application routes through the engine is resolved once at
//! startup into a [`ManagedGroup`] and owned by the application. The engine
//! itself keeps no cached group id.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::PropertyAccessEngine;
use crate::error::{PropResult, ValidationError};
use crate::field::PropertyGroup;
use crate::ids::GroupId;
use crate::storage::GroupStore;

/// Default name of the group holding custom profile attributes.
pub const DEFAULT_MANAGED_GROUP: &str = "custom_profile_attributes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the group the application registers at startup.
    pub managed_group: String,
    /// Max items in one bulk call.
    pub max_batch_size: usize,
    /// Page size used when a search does not ask for one.
    pub default_page_size: usize,
    /// Hard cap on search page size.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            managed_group: DEFAULT_MANAGED_GROUP.to_string(),
            max_batch_size: 1000,
            default_page_size: 60,
            max_page_size: 500,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidConfig {
            reason: reason.to_string(),
        };
        if self.managed_group.trim().is_empty() {
            return Err(invalid("managed_group must not be empty"));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size must be positive"));
        }
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err(invalid("page sizes must be positive"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(invalid("default_page_size exceeds max_page_size"));
        }
        Ok(())
    }

    /// Page size to use for a request asking for `requested` (0 = default).
    #[must_use]
    pub fn page_size(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}

/// The group resolved from [`EngineConfig::managed_group`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedGroup {
    group: PropertyGroup,
}

impl ManagedGroup {
    /// Register (get-or-create) the configured group.
    pub fn resolve(config: &EngineConfig, groups: &dyn GroupStore) -> PropResult<Self> {
        config.validate()?;
        let group = groups
            .register(config.managed_group.trim())
            .map_err(PropertyAccessEngine::storage_err)?;
        info!(group_id = %group.id, name = %group.name, "resolved managed property group");
        Ok(Self { group })
    }

    /// Id of the managed group.
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.group.id
    }

    /// Name of the managed group.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.group.name
    }

    /// The resolved group record.
    #[must_use]
    pub const fn group(&self) -> &PropertyGroup {
        &self.group
    }
}
