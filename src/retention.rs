//! Retention policy provider (§4.7): a thread-safe, case-insensitive map
//! from `domain` to [`RetentionMode`], consulted by the hot store at
//! header-insert time and by the archive coordinator.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::RetentionMode;

/// Thread-safe, case-insensitive `domain -> RetentionMode` lookup.
///
/// Unknown domains resolve to the provider's configured default. Mutations
/// are permitted at runtime and are immediately visible to concurrent
/// readers, following the teacher's preference for simple `std` sync
/// primitives over a bespoke lock-free structure.
pub struct RetentionPolicyProvider {
    default_mode: RetentionMode,
    overrides: RwLock<HashMap<String, RetentionMode>>,
}

impl RetentionPolicyProvider {
    /// Create a provider whose unconfigured domains resolve to `default_mode`.
    pub fn new(default_mode: RetentionMode) -> Self {
        Self {
            default_mode,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the retention mode for `domain`, case-insensitively.
    pub fn get_policy(&self, domain: &str) -> RetentionMode {
        let key = domain.to_ascii_lowercase();
        self.overrides
            .read()
            .expect("retention policy lock poisoned")
            .get(&key)
            .copied()
            .unwrap_or(self.default_mode)
    }

    /// Set (or replace) the retention mode for `domain`.
    pub fn set_policy(&self, domain: &str, mode: RetentionMode) {
        let key = domain.to_ascii_lowercase();
        self.overrides
            .write()
            .expect("retention policy lock poisoned")
            .insert(key, mode);
    }
}

impl Default for RetentionPolicyProvider {
    /// A provider defaulting unconfigured domains to [`RetentionMode::ColdArchivable`],
    /// matching the spec's stated typical default.
    fn default() -> Self {
        Self::new(RetentionMode::ColdArchivable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_domain_returns_default() {
        let provider = RetentionPolicyProvider::new(RetentionMode::ColdArchivable);
        assert_eq!(provider.get_policy("unseen"), RetentionMode::ColdArchivable);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let provider = RetentionPolicyProvider::default();
        provider.set_policy("Orders", RetentionMode::FullHistory);
        assert_eq!(provider.get_policy("orders"), RetentionMode::FullHistory);
        assert_eq!(provider.get_policy("ORDERS"), RetentionMode::FullHistory);
    }

    #[test]
    fn override_replaces_previous_value() {
        let provider = RetentionPolicyProvider::default();
        provider.set_policy("orders", RetentionMode::FullHistory);
        provider.set_policy("orders", RetentionMode::HardDeletable);
        assert_eq!(provider.get_policy("orders"), RetentionMode::HardDeletable);
    }
}
