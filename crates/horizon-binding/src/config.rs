//! Registry-wide binding configuration.
//!
//! A [`BindingConfig`] is handed to a [`ManagerRegistry`](crate::ManagerRegistry)
//! when it is created and is shared by every manager it produces. It can be
//! built in code or loaded from TOML:
//!
//! ```
//! use horizon_binding::{BindingConfig, NameMatching, PendingEditPolicy};
//!
//! let config = BindingConfig::from_toml_str(r#"
//! pending_edit_policy = "reject"
//! name_matching = "exact"
//! "#).unwrap();
//!
//! assert_eq!(config.pending_edit_policy, PendingEditPolicy::Reject);
//! assert_eq!(config.name_matching, NameMatching::Exact);
//! ```

use serde::{Deserialize, Serialize};

/// Errors from loading or saving a [`BindingConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML text could not be parsed into a configuration.
    #[error("invalid binding configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be written as TOML.
    #[error("cannot serialize binding configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// What `add_new` does while an earlier add-new row is still pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingEditPolicy {
    /// Commit the pending row, then append the next one.
    #[default]
    ImplicitCommit,
    /// Fail with [`BindingError::EditInProgress`](crate::BindingError::EditInProgress).
    Reject,
}

/// How relation path segments are matched against member names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatching {
    /// Exact-case matches win; otherwise names match ignoring case.
    #[default]
    CaseInsensitive,
    /// Only exact-case matches.
    Exact,
}

impl NameMatching {
    /// Returns `true` if `candidate` matches `segment` under this policy,
    /// ignoring the exact-match preference.
    pub fn matches(self, candidate: &str, segment: &str) -> bool {
        match self {
            Self::CaseInsensitive => candidate.eq_ignore_ascii_case(segment),
            Self::Exact => candidate == segment,
        }
    }
}

/// Configuration shared by a registry and its managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub pending_edit_policy: PendingEditPolicy,
    pub name_matching: NameMatching,
    /// Assert that managers are only used on the thread that created the
    /// registry.
    pub check_thread_affinity: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            pending_edit_policy: PendingEditPolicy::default(),
            name_matching: NameMatching::default(),
            check_thread_affinity: cfg!(debug_assertions),
        }
    }
}

impl BindingConfig {
    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Sets the pending edit policy.
    pub fn with_pending_edit_policy(mut self, policy: PendingEditPolicy) -> Self {
        self.pending_edit_policy = policy;
        self
    }

    /// Sets the name matching policy.
    pub fn with_name_matching(mut self, matching: NameMatching) -> Self {
        self.name_matching = matching;
        self
    }

    /// Enables or disables thread affinity checks.
    pub fn with_thread_affinity_checks(mut self, enabled: bool) -> Self {
        self.check_thread_affinity = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.pending_edit_policy, PendingEditPolicy::ImplicitCommit);
        assert_eq!(config.name_matching, NameMatching::CaseInsensitive);
        assert_eq!(config.check_thread_affinity, cfg!(debug_assertions));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BindingConfig::from_toml_str("check_thread_affinity = false").unwrap();
        assert!(!config.check_thread_affinity);
        assert_eq!(config.name_matching, NameMatching::CaseInsensitive);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BindingConfig::default()
            .with_pending_edit_policy(PendingEditPolicy::Reject)
            .with_thread_affinity_checks(false);
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("pending_edit_policy = \"reject\""));
        assert_eq!(BindingConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let err = BindingConfig::from_toml_str("name_matching = \"fuzzy\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_name_matching() {
        assert!(NameMatching::CaseInsensitive.matches("Orders", "orders"));
        assert!(!NameMatching::Exact.matches("Orders", "orders"));
        assert!(NameMatching::Exact.matches("Orders", "Orders"));
    }
}
