//! Order-independent comparison between expected and observed state.
//!
//! Concurrent dispatch controls neither creation order nor listing order,
//! so every comparison here canonicalizes both sides before asserting
//! exact equality. A mismatch carries enough detail to name what differed.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::HookInfo;

/// A hook-name match pattern: an exact name, or a prefix wildcard written
/// with a trailing `*` (`out*` matches `out1`, `out2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountPattern {
    /// Matches exactly one hook name.
    Exact(String),
    /// Matches every hook name starting with the prefix.
    Prefix(String),
}

impl CountPattern {
    /// Parse a pattern string; a trailing `*` makes it a prefix wildcard.
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => CountPattern::Prefix(prefix.to_string()),
            None => CountPattern::Exact(pattern.to_string()),
        }
    }

    /// True when `name` matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            CountPattern::Exact(exact) => name == exact,
            CountPattern::Prefix(prefix) => name.starts_with(prefix),
        }
    }
}

impl fmt::Display for CountPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountPattern::Exact(name) => write!(f, "{name}"),
            CountPattern::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Why a comparison failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleMismatch {
    /// Expected and observed hook sets differ.
    HookSets {
        /// Canonical expected names.
        expected: Vec<String>,
        /// Canonical observed names.
        observed: Vec<String>,
    },
    /// Aggregated count over a pattern differs from the expectation.
    Counts {
        /// The pattern that was aggregated.
        pattern: String,
        /// Harness-computed expected total.
        expected: u64,
        /// Observed total.
        observed: u64,
    },
}

impl fmt::Display for OracleMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleMismatch::HookSets { expected, observed } => {
                let missing: Vec<&String> =
                    expected.iter().filter(|h| !observed.contains(h)).collect();
                let extra: Vec<&String> =
                    observed.iter().filter(|h| !expected.contains(h)).collect();
                write!(
                    f,
                    "hook sets differ: missing {missing:?}, unexpected {extra:?} (expected {expected:?}, observed {observed:?})"
                )
            }
            OracleMismatch::Counts {
                pattern,
                expected,
                observed,
            } => write!(
                f,
                "count over '{pattern}' differs: expected {expected}, observed {observed}"
            ),
        }
    }
}

/// Compare an expected hook-name sequence against an observed listing,
/// order-independently.
pub fn compare_hook_sets(
    expected: &[String],
    observed: &[HookInfo],
) -> Result<(), OracleMismatch> {
    let mut expected: Vec<String> = expected.to_vec();
    expected.sort();
    let mut observed: Vec<String> = observed.iter().map(|h| h.name.clone()).collect();
    observed.sort();
    if expected == observed {
        Ok(())
    } else {
        Err(OracleMismatch::HookSets { expected, observed })
    }
}

/// Compare an expected total against observed counts aggregated over every
/// hook matching `pattern`.
pub fn compare_counts(
    pattern: &CountPattern,
    expected: u64,
    observed: &BTreeMap<String, u64>,
) -> Result<(), OracleMismatch> {
    let total: u64 = observed
        .iter()
        .filter(|(name, _)| pattern.matches(name))
        .map(|(_, count)| count)
        .sum();
    if total == expected {
        Ok(())
    } else {
        Err(OracleMismatch::Counts {
            pattern: pattern.to_string(),
            expected,
            observed: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hooks(names: &[&str]) -> Vec<HookInfo> {
        names
            .iter()
            .map(|n| HookInfo {
                name: n.to_string(),
                rules: 0,
            })
            .collect()
    }

    #[test]
    fn hook_sets_ignore_order() {
        let expected = vec!["default".to_string(), "out1".to_string(), "out2".to_string()];
        let observed = hooks(&["out2", "default", "out1"]);
        assert!(compare_hook_sets(&expected, &observed).is_ok());
    }

    #[test]
    fn hook_set_mismatch_names_the_difference() {
        let expected = vec!["default".to_string(), "out1".to_string()];
        let observed = hooks(&["default", "out2"]);
        let err = compare_hook_sets(&expected, &observed).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("out1"));
        assert!(msg.contains("out2"));
    }

    #[test]
    fn count_patterns_aggregate() {
        let mut observed = BTreeMap::new();
        observed.insert("out1".to_string(), 3u64);
        observed.insert("out2".to_string(), 4u64);
        observed.insert("default".to_string(), 0u64);

        assert!(compare_counts(&CountPattern::parse("out1"), 3, &observed).is_ok());
        assert!(compare_counts(&CountPattern::parse("out*"), 7, &observed).is_ok());

        let err = compare_counts(&CountPattern::parse("out*"), 8, &observed).unwrap_err();
        assert_eq!(
            err,
            OracleMismatch::Counts {
                pattern: "out*".to_string(),
                expected: 8,
                observed: 7
            }
        );
    }

    #[test]
    fn unmatched_pattern_sums_to_zero() {
        let observed = BTreeMap::new();
        assert!(compare_counts(&CountPattern::parse("out*"), 0, &observed).is_ok());
    }
}
