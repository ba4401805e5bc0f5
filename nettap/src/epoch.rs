//! Per-node generation-counter monitoring.
//!
//! Every batch is bracketed by two epoch snapshots. A batch with no
//! structural mutation must leave the epoch unchanged; a batch with at
//! least one must strictly increase it. An absent epoch value is a
//! distinct failure in this harness's configuration, never a skip.

use std::fmt;

use crate::error::GatewayResult;
use crate::gateway::CommandGateway;

/// Why an epoch check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochViolation {
    /// The subsystem reported no epoch value.
    Missing,
    /// The epoch moved backwards.
    Regressed {
        /// Snapshot before the batch.
        before: u64,
        /// Snapshot after the batch.
        after: u64,
    },
    /// A structural batch left the epoch unchanged.
    Stalled {
        /// Epoch on both sides of the batch.
        epoch: u64,
    },
    /// A batch with no structural mutation advanced the epoch.
    UnexpectedAdvance {
        /// Snapshot before the batch.
        before: u64,
        /// Snapshot after the batch.
        after: u64,
    },
}

impl fmt::Display for EpochViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochViolation::Missing => write!(f, "epoch value absent"),
            EpochViolation::Regressed { before, after } => {
                write!(f, "epoch regressed from {before} to {after}")
            }
            EpochViolation::Stalled { epoch } => {
                write!(f, "epoch stalled at {epoch} across a structural batch")
            }
            EpochViolation::UnexpectedAdvance { before, after } => {
                write!(
                    f,
                    "epoch advanced from {before} to {after} across a non-structural batch"
                )
            }
        }
    }
}

/// Judge a before/after snapshot pair against the monotonicity contract.
///
/// Pure so it can be tested without a gateway.
pub fn judge(
    structural: bool,
    before: Option<u64>,
    after: Option<u64>,
) -> Result<(), EpochViolation> {
    let (before, after) = match (before, after) {
        (Some(b), Some(a)) => (b, a),
        _ => return Err(EpochViolation::Missing),
    };
    if after < before {
        return Err(EpochViolation::Regressed { before, after });
    }
    match (structural, after > before) {
        (true, false) => Err(EpochViolation::Stalled { epoch: before }),
        (false, true) => Err(EpochViolation::UnexpectedAdvance { before, after }),
        _ => Ok(()),
    }
}

/// Snapshots and checks one node's epoch around batches.
pub struct EpochMonitor<G> {
    gateway: std::sync::Arc<G>,
    node: String,
}

impl<G: CommandGateway> EpochMonitor<G> {
    /// Monitor the named node through `gateway`.
    pub fn new(gateway: std::sync::Arc<G>, node: &str) -> Self {
        Self {
            gateway,
            node: node.to_string(),
        }
    }

    /// Take an epoch snapshot. Called immediately before and after a batch.
    pub async fn snapshot(&self) -> GatewayResult<Option<u64>> {
        self.gateway.query_epoch(&self.node).await
    }

    /// Snapshot after a batch and judge against the pre-batch snapshot.
    pub async fn verify(
        &self,
        structural: bool,
        before: Option<u64>,
    ) -> GatewayResult<Result<(), EpochViolation>> {
        let after = self.snapshot().await?;
        Ok(judge(structural, before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_batch_must_advance() {
        assert!(judge(true, Some(3), Some(4)).is_ok());
        assert_eq!(
            judge(true, Some(3), Some(3)),
            Err(EpochViolation::Stalled { epoch: 3 })
        );
    }

    #[test]
    fn read_only_batch_must_hold() {
        assert!(judge(false, Some(3), Some(3)).is_ok());
        assert_eq!(
            judge(false, Some(3), Some(5)),
            Err(EpochViolation::UnexpectedAdvance {
                before: 3,
                after: 5
            })
        );
    }

    #[test]
    fn regression_and_absence_are_violations() {
        assert_eq!(
            judge(false, Some(3), Some(2)),
            Err(EpochViolation::Regressed {
                before: 3,
                after: 2
            })
        );
        assert_eq!(judge(true, None, Some(2)), Err(EpochViolation::Missing));
        assert_eq!(judge(true, Some(2), None), Err(EpochViolation::Missing));
    }
}
