//! Append-only classification ledger for randomized scenarios.
//!
//! The subsystem's only introspection is aggregate counts and unordered
//! set queries; there is no per-key provenance. Randomized scenarios
//! therefore record every (key, chosen-hook) decision in this ledger as
//! they dispatch, and verification recomputes expected counts by folding
//! the ledger afterward.
//!
//! This is the only mutable state shared across concurrently dispatched
//! tasks. Each append takes the lock once, so an entry lands as a single
//! atomic unit. The ledger is write-only during dispatch and read-only
//! during verification, which rules out read/write races by construction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::types::{MacAddr, DEFAULT_HOOK};

/// One recorded classification decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Classified address.
    pub key: MacAddr,
    /// Hook the address was routed to (may be the sentinel).
    pub hook: String,
}

/// Append-only log of classification decisions.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decision. Atomic with respect to concurrent appends.
    pub fn append(&self, key: MacAddr, hook: &str) {
        let mut entries = self.entries.lock().expect("ledger lock poisoned");
        entries.push(LedgerEntry {
            key,
            hook: hook.to_string(),
        });
    }

    /// Number of recorded decisions.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("ledger lock poisoned").len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The final hook assignment per key: the last recorded decision wins,
    /// matching the subsystem's overwrite semantics.
    pub fn final_assignments(&self) -> HashMap<MacAddr, String> {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        let mut last: HashMap<MacAddr, String> = HashMap::new();
        for entry in entries.iter() {
            last.insert(entry.key, entry.hook.clone());
        }
        last
    }

    /// Expected per-hook rule counts implied by the ledger.
    ///
    /// Keys whose final assignment is the sentinel contribute to no hook:
    /// routing to the sentinel clears the rule.
    pub fn expected_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for (_, hook) in self.final_assignments() {
            if hook != DEFAULT_HOOK {
                *counts.entry(hook).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Keys whose final assignment is the sentinel.
    pub fn sentinel_keys(&self) -> u64 {
        self.final_assignments()
            .values()
            .filter(|hook| hook.as_str() == DEFAULT_HOOK)
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u64) -> MacAddr {
        MacAddr::from_index(i)
    }

    #[test]
    fn counts_exclude_sentinel_keys() {
        let ledger = Ledger::new();
        ledger.append(key(1), "out1");
        ledger.append(key(2), "out1");
        ledger.append(key(3), DEFAULT_HOOK);

        let counts = ledger.expected_counts();
        assert_eq!(counts.get("out1"), Some(&2));
        assert_eq!(counts.get(DEFAULT_HOOK), None);
        assert_eq!(ledger.sentinel_keys(), 1);
    }

    #[test]
    fn last_decision_per_key_wins() {
        let ledger = Ledger::new();
        ledger.append(key(1), "out1");
        ledger.append(key(1), "out2");

        let counts = ledger.expected_counts();
        assert_eq!(counts.get("out1"), None);
        assert_eq!(counts.get("out2"), Some(&1));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn concurrent_appends_all_land() {
        let ledger = std::sync::Arc::new(Ledger::new());
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    ledger.append(key(t * 1000 + i), "out1");
                }
            }));
        }
        for h in handles {
            h.join().expect("appender thread");
        }
        assert_eq!(ledger.len(), 800);
        assert_eq!(ledger.expected_counts()["out1"], 800);
    }
}
