//! Plugin installation lookups.
//!
//! The engine only needs one bit of plugin lifecycle state: whether the
//! owner of a protected field is still installed. That decides whether an
//! orphaned protected field may be deleted by someone else.

use std::collections::HashSet;
use std::sync::RwLock;

/// Answers "is this plugin currently installed?".
pub trait PluginRegistry: Send + Sync {
    /// True if a plugin with exactly this id is installed.
    fn is_installed(&self, plugin_id: &str) -> bool;
}

impl<F> PluginRegistry for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_installed(&self, plugin_id: &str) -> bool {
        self(plugin_id)
    }
}

/// In-memory set of installed plugins.
#[derive(Debug, Default)]
pub struct StaticPluginRegistry {
    installed: RwLock<HashSet<String>>,
}

impl StaticPluginRegistry {
    /// Create an empty registry (nothing installed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given plugins installed.
    #[must_use]
    pub fn with_installed<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            installed: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Mark a plugin installed.
    pub fn install(&self, plugin_id: impl Into<String>) {
        if let Ok(mut guard) = self.installed.write() {
            guard.insert(plugin_id.into());
        }
    }

    /// Mark a plugin uninstalled.
    pub fn uninstall(&self, plugin_id: &str) {
        if let Ok(mut guard) = self.installed.write() {
            guard.remove(plugin_id);
        }
    }
}

impl PluginRegistry for StaticPluginRegistry {
    fn is_installed(&self, plugin_id: &str) -> bool {
        self.installed
            .read()
            .map(|g| g.contains(plugin_id))
            .unwrap_or(false)
    }
}
