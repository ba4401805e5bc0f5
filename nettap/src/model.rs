//! Shadow model of the expected subsystem state.
//!
//! [`TopologyModel`] is the harness's own authoritative record, derived
//! purely from the operations it issued. Verification compares the real
//! subsystem against this model, never the other way around.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{MacAddr, DEFAULT_HOOK};

/// Expected hook set and classification map of the classifier node.
#[derive(Debug, Clone)]
pub struct TopologyModel {
    hooks: BTreeSet<String>,
    rules: HashMap<MacAddr, String>,
}

impl TopologyModel {
    /// Fresh model: only the sentinel hook exists, no rules.
    pub fn new() -> Self {
        let mut hooks = BTreeSet::new();
        hooks.insert(DEFAULT_HOOK.to_string());
        Self {
            hooks,
            rules: HashMap::new(),
        }
    }

    /// Record an expected hook creation. Returns false if the name was
    /// already expected (scenarios never do this).
    pub fn add_hook(&mut self, name: &str) -> bool {
        self.hooks.insert(name.to_string())
    }

    /// Record an expected hook removal. Rules owned by the hook go with it.
    pub fn remove_hook(&mut self, name: &str) -> bool {
        let removed = self.hooks.remove(name);
        if removed {
            self.rules.retain(|_, owner| owner != name);
        }
        removed
    }

    /// True when the model expects `name` to exist.
    pub fn contains_hook(&self, name: &str) -> bool {
        self.hooks.contains(name)
    }

    /// Record an expected classification. Overwrites any prior mapping for
    /// `key`; the sentinel clears it.
    pub fn classify(&mut self, key: MacAddr, hook: &str) {
        if hook == DEFAULT_HOOK {
            self.rules.remove(&key);
        } else {
            self.rules.insert(key, hook.to_string());
        }
    }

    /// Record an expected full reset of the classification map.
    pub fn reset(&mut self) {
        self.rules.clear();
    }

    /// Expected hook names as a canonical sorted sequence.
    ///
    /// Creation order is not controlled under concurrent dispatch, so every
    /// equality check against this snapshot must be order-independent;
    /// sorting here makes that the only possible comparison.
    pub fn snapshot_hooks(&self) -> Vec<String> {
        self.hooks.iter().cloned().collect()
    }

    /// Expected per-hook rule counts. Every expected hook appears, with
    /// zero for hooks owning no rules; the sentinel always reads zero.
    pub fn expected_counts(&self) -> BTreeMap<String, u64> {
        let mut counts: BTreeMap<String, u64> =
            self.hooks.iter().map(|h| (h.clone(), 0)).collect();
        for owner in self.rules.values() {
            *counts.entry(owner.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of keys currently mapped to a non-sentinel hook.
    pub fn rule_count(&self) -> u64 {
        self.rules.len() as u64
    }
}

impl Default for TopologyModel {
    fn default() -> Self {
        Self::new()
    }
}
