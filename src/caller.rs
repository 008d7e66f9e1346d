//! Caller identity.
//!
//! Identity is resolved upstream (sessions, tokens, plugin RPC) and handed
//! to the engine as a [`Caller`]. The engine never infers a role from the
//! shape of a string.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum plugin id length accepted by the plugin runtime.
pub const MIN_PLUGIN_ID_LEN: usize = 3;

/// Maximum plugin id length accepted by the plugin runtime.
pub const MAX_PLUGIN_ID_LEN: usize = 190;

static PLUGIN_ID_RE: OnceLock<Regex> = OnceLock::new();

fn plugin_id_re() -> &'static Regex {
    PLUGIN_ID_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap()
    })
}

/// Validated identifier of an installable plugin.
///
/// # Examples
///
/// ```
/// use propgate::PluginId;
///
/// let id = PluginId::new("com.example.survey").unwrap();
/// assert_eq!(id.as_str(), "com.example.survey");
/// assert!(PluginId::new("").is_err());
/// assert!(PluginId::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginId(String);

impl PluginId {
    /// Validate and wrap a plugin id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::EmptyPluginId);
        }
        if id.len() < MIN_PLUGIN_ID_LEN || id.len() > MAX_PLUGIN_ID_LEN {
            return Err(ValidationError::InvalidPluginId {
                reason: format!(
                    "length must be between {MIN_PLUGIN_ID_LEN} and {MAX_PLUGIN_ID_LEN}"
                ),
                plugin_id: id,
            });
        }
        if !plugin_id_re().is_match(&id) {
            return Err(ValidationError::InvalidPluginId {
                plugin_id: id,
                reason: "only letters, digits, '.', '_' and '-' are allowed".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the plugin id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PluginId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PluginId> for String {
    fn from(id: PluginId) -> Self {
        id.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Caller {
    /// No identity (system-internal core code acting without a user).
    Anonymous,
    /// An end user, identified by the id values are recorded against.
    User(String),
    /// An installed plugin.
    Plugin(PluginId),
}

impl Caller {
    /// The anonymous caller.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self::Anonymous
    }

    /// An end-user caller. An empty id collapses to [`Caller::Anonymous`].
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() {
            Self::Anonymous
        } else {
            Self::User(id)
        }
    }

    /// A plugin caller.
    pub fn plugin(id: impl Into<String>) -> Result<Self, ValidationError> {
        PluginId::new(id).map(Self::Plugin)
    }

    /// Map the single-string caller form used by older call sites.
    ///
    /// An empty string is anonymous; anything else is an end user. Plugin
    /// callers must be constructed explicitly with [`Caller::plugin`].
    #[must_use]
    pub fn from_legacy_id(id: &str) -> Self {
        Self::user(id)
    }

    /// The plugin identity, if this caller is a plugin.
    #[must_use]
    pub const fn plugin_id(&self) -> Option<&PluginId> {
        match self {
            Self::Plugin(id) => Some(id),
            _ => None,
        }
    }

    /// The target id under which this caller's own values are recorded.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
            Self::Plugin(id) => Some(id.as_str()),
        }
    }

    /// True if this caller is the plugin recorded as `owner`.
    ///
    /// The comparison is a literal match on the plugin id string.
    #[must_use]
    pub fn is_source(&self, owner: Option<&PluginId>) -> bool {
        match (self, owner) {
            (Self::Plugin(id), Some(owner)) => id == owner,
            _ => false,
        }
    }

    /// Returns true for the anonymous caller.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Plugin(id) => write!(f, "plugin:{id}"),
        }
    }
}
