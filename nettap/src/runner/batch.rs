//! Operation batches submitted for concurrent execution.

use std::fmt;

use crate::types::MacAddr;

/// One operation against the subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create a classifier hook linked to a fan-out hook.
    CreateLink {
        /// Hook created on the classifier.
        hook: String,
        /// Hook created on the fan-out peer.
        peer_hook: String,
    },
    /// Remove a classifier hook (and its link).
    RemoveLink {
        /// Hook to remove.
        hook: String,
    },
    /// Route an address to a hook.
    Classify {
        /// Address being classified.
        key: MacAddr,
        /// Target hook; the sentinel clears the rule.
        hook: String,
    },
    /// Clear the classifier's rule table.
    Reset,
}

impl Operation {
    /// True for operations that mutate topology structure and therefore
    /// must advance the node epoch: hook creation/removal and the full
    /// reset.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Operation::CreateLink { .. } | Operation::RemoveLink { .. } | Operation::Reset
        )
    }

    /// True for operations that also create or remove a hook on the
    /// fan-out peer and therefore must advance its epoch as well. A reset
    /// touches only the classifier's rule table.
    pub fn is_structural_on_peer(&self) -> bool {
        matches!(
            self,
            Operation::CreateLink { .. } | Operation::RemoveLink { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateLink { hook, .. } => write!(f, "create {hook}"),
            Operation::RemoveLink { hook } => write!(f, "remove {hook}"),
            Operation::Classify { key, hook } => write!(f, "classify {key} -> {hook}"),
            Operation::Reset => write!(f, "reset"),
        }
    }
}

/// What a scenario expects of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// The subsystem must accept the operation.
    Success,
    /// The subsystem must reject the operation (e.g. a reserved hook
    /// name). Acceptance is the failure here.
    Rejected,
}

/// An operation paired with its expectation.
#[derive(Debug, Clone)]
pub struct PlannedOp {
    /// The operation to dispatch.
    pub op: Operation,
    /// What counts as satisfying the scenario.
    pub expect: Expectation,
}

/// A set of operations dispatched concurrently within one join window.
///
/// The batch boundary is a synchronization barrier, not a transaction.
/// Scenarios must never put a create and a remove of the same hook name in
/// one batch: the subsystem's tie-break under that race is undefined, so
/// the harness is required to avoid constructing it.
#[derive(Debug, Clone, Default)]
pub struct OperationBatch {
    ops: Vec<PlannedOp>,
}

impl OperationBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation expected to succeed.
    pub fn push(&mut self, op: Operation) {
        self.ops.push(PlannedOp {
            op,
            expect: Expectation::Success,
        });
    }

    /// Add an operation with an explicit expectation.
    pub fn push_expecting(&mut self, op: Operation, expect: Expectation) {
        self.ops.push(PlannedOp { op, expect });
    }

    /// True when any operation in the batch is a structural mutation that
    /// is expected to be applied.
    pub fn is_structural(&self) -> bool {
        self.ops
            .iter()
            .any(|p| p.expect == Expectation::Success && p.op.is_structural())
    }

    /// True when any operation in the batch creates or removes a link,
    /// mutating the fan-out peer's structure as well.
    pub fn is_structural_on_peer(&self) -> bool {
        self.ops
            .iter()
            .any(|p| p.expect == Expectation::Success && p.op.is_structural_on_peer())
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<PlannedOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_detection_ignores_expected_rejections() {
        let mut batch = OperationBatch::new();
        batch.push(Operation::Classify {
            key: MacAddr::from_index(1),
            hook: "out1".into(),
        });
        assert!(!batch.is_structural());

        batch.push_expecting(
            Operation::CreateLink {
                hook: "default".into(),
                peer_hook: "linkx".into(),
            },
            Expectation::Rejected,
        );
        assert!(!batch.is_structural());
        assert!(!batch.is_structural_on_peer());

        batch.push(Operation::Reset);
        assert!(batch.is_structural());
        // A reset never touches the fan-out peer's structure.
        assert!(!batch.is_structural_on_peer());
        assert_eq!(batch.len(), 3);
    }
}
