//! Fork-join execution of operation batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::{GatewayError, HarnessError, HarnessResult};
use crate::gateway::CommandGateway;
use crate::ledger::Ledger;

use super::batch::{Expectation, Operation, OperationBatch, PlannedOp};

/// Where the runner is in its dispatch→join→verify cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    /// No batch in flight.
    Idle,
    /// Tasks are being spawned.
    Dispatching,
    /// Blocked at the join barrier until every task has completed.
    Joining,
    /// All tasks joined; outcomes are being assembled for the oracle.
    Verifying,
}

/// Result of one dispatched operation, keyed back to what was asked.
#[derive(Debug)]
pub struct OpOutcome {
    /// The operation that was dispatched.
    pub op: Operation,
    /// What the scenario expected of it.
    pub expect: Expectation,
    /// What the gateway returned.
    pub result: Result<(), GatewayError>,
}

impl OpOutcome {
    /// True when the result satisfies the expectation: success for
    /// [`Expectation::Success`], rejection for [`Expectation::Rejected`].
    pub fn satisfied(&self) -> bool {
        match self.expect {
            Expectation::Success => self.result.is_ok(),
            Expectation::Rejected => matches!(self.result, Err(GatewayError::Rejected(_))),
        }
    }

    /// One-line description for report messages.
    pub fn describe(&self) -> String {
        match (&self.expect, &self.result) {
            (Expectation::Success, Ok(())) => format!("{} applied", self.op),
            (Expectation::Success, Err(e)) => format!("{} failed: {e}", self.op),
            (Expectation::Rejected, Err(GatewayError::Rejected(reason))) => {
                format!("{} rejected as expected: {reason}", self.op)
            }
            (Expectation::Rejected, Ok(())) => {
                format!("{} was accepted but rejection was expected", self.op)
            }
            (Expectation::Rejected, Err(e)) => {
                format!("{} failed with the wrong error: {e}", self.op)
            }
        }
    }
}

/// Everything the verification phase needs to know about a joined batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Per-operation outcomes, in batch order.
    pub outcomes: Vec<OpOutcome>,
    /// Whether the batch contained an applied structural mutation.
    pub structural: bool,
    /// Whether the batch contained an applied link creation or removal,
    /// which mutates the fan-out peer's structure too.
    pub peer_structural: bool,
}

impl BatchOutcome {
    /// True when every operation satisfied its expectation.
    pub fn all_satisfied(&self) -> bool {
        self.outcomes.iter().all(OpOutcome::satisfied)
    }

    /// Outcomes that did not satisfy their expectation.
    pub fn unsatisfied(&self) -> impl Iterator<Item = &OpOutcome> {
        self.outcomes.iter().filter(|o| !o.satisfied())
    }
}

/// Fork-join executor enforcing the dispatch→join→verify discipline.
///
/// Every operation of a batch runs as an independently scheduled task with
/// no ordering guarantee relative to its siblings; the join is a full
/// barrier, and each task's individual outcome is collected rather than
/// discarded so dispatch failures stay attributable.
pub struct ConcurrentOperationRunner<G> {
    gateway: Arc<G>,
    classifier: String,
    fanout: String,
    op_timeout: Option<Duration>,
    phase: RunnerPhase,
    batch_seq: u64,
}

impl<G: CommandGateway + 'static> ConcurrentOperationRunner<G> {
    /// Runner dispatching against `gateway`, with hooks created on
    /// `classifier` and peered on `fanout`.
    pub fn new(gateway: Arc<G>, classifier: &str, fanout: &str) -> Self {
        Self {
            gateway,
            classifier: classifier.to_string(),
            fanout: fanout.to_string(),
            op_timeout: None,
            phase: RunnerPhase::Idle,
            batch_seq: 0,
        }
    }

    /// Attach a per-task timeout. A timed-out task yields
    /// [`GatewayError::Timeout`] instead of stalling the batch forever.
    pub fn with_op_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Current phase of the dispatch cycle.
    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Dispatch a batch, join, and return per-operation outcomes.
    pub async fn run_batch(&mut self, batch: OperationBatch) -> HarnessResult<BatchOutcome> {
        self.run_recorded(batch, None).await
    }

    /// Like [`run_batch`](Self::run_batch), but every successfully applied
    /// classify operation appends its (key, hook) decision to `ledger`
    /// inside the dispatching task, before the task reports completion.
    pub async fn run_recorded(
        &mut self,
        batch: OperationBatch,
        ledger: Option<Arc<Ledger>>,
    ) -> HarnessResult<BatchOutcome> {
        let structural = batch.is_structural();
        let peer_structural = batch.is_structural_on_peer();
        let planned = batch.into_ops();
        self.batch_seq += 1;
        let seq = self.batch_seq;

        self.phase = RunnerPhase::Dispatching;
        tracing::debug!(batch = seq, ops = planned.len(), structural, "dispatching batch");

        let mut tasks: JoinSet<(usize, Result<(), GatewayError>)> = JoinSet::new();
        for (index, PlannedOp { op, .. }) in planned.iter().enumerate() {
            let gateway = self.gateway.clone();
            let classifier = self.classifier.clone();
            let fanout = self.fanout.clone();
            let op = op.clone();
            let timeout = self.op_timeout;
            let ledger = ledger.clone();
            tasks.spawn(async move {
                let result =
                    dispatch_one(gateway.as_ref(), &classifier, &fanout, &op, timeout).await;
                if result.is_ok() {
                    if let (Some(ledger), Operation::Classify { key, hook }) = (&ledger, &op) {
                        ledger.append(*key, hook);
                    }
                }
                (index, result)
            });
        }

        // Full barrier: nothing is observed until every task has landed.
        self.phase = RunnerPhase::Joining;
        let mut results: Vec<Option<Result<(), GatewayError>>> =
            (0..planned.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => {
                    self.phase = RunnerPhase::Idle;
                    return Err(HarnessError::Environment(format!(
                        "dispatch task panicked: {e}"
                    )));
                }
            }
        }
        tracing::debug!(batch = seq, "batch joined");

        self.phase = RunnerPhase::Verifying;
        let outcomes: Vec<OpOutcome> = planned
            .into_iter()
            .zip(results)
            .map(|(PlannedOp { op, expect }, result)| OpOutcome {
                op,
                expect,
                result: result.expect("every spawned task joins exactly once"),
            })
            .collect();

        // An unreachable collaborator is fatal; an undecodable response
        // makes the batch unverifiable, so it aborts here instead of
        // flowing into the oracle.
        for outcome in &outcomes {
            match &outcome.result {
                Err(GatewayError::Unreachable(detail)) => {
                    self.phase = RunnerPhase::Idle;
                    return Err(HarnessError::Environment(format!(
                        "subsystem unreachable during '{}': {detail}",
                        outcome.op
                    )));
                }
                Err(e @ GatewayError::ParseFailure(_)) => {
                    self.phase = RunnerPhase::Idle;
                    return Err(HarnessError::Gateway(e.clone()));
                }
                _ => {}
            }
        }

        self.phase = RunnerPhase::Idle;
        Ok(BatchOutcome {
            outcomes,
            structural,
            peer_structural,
        })
    }
}

/// Execute one operation through the gateway.
async fn dispatch_one<G: CommandGateway>(
    gateway: &G,
    classifier: &str,
    fanout: &str,
    op: &Operation,
    timeout: Option<Duration>,
) -> Result<(), GatewayError> {
    let call = async {
        match op {
            Operation::CreateLink { hook, peer_hook } => {
                gateway
                    .create_link(classifier, hook, fanout, peer_hook)
                    .await
            }
            Operation::RemoveLink { hook } => gateway.remove_link(classifier, hook).await,
            Operation::Classify { key, hook } => gateway.set_rule(classifier, *key, hook).await,
            Operation::Reset => gateway.reset(classifier).await,
        }
    };
    match timeout {
        None => call.await,
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{SimSubsystem, TextGateway};
    use crate::types::{MacAddr, DEFAULT_HOOK};

    fn runner() -> ConcurrentOperationRunner<TextGateway<Arc<SimSubsystem>>> {
        let gateway = Arc::new(TextGateway::new(Arc::new(SimSubsystem::new(
            "filter", "switch",
        ))));
        ConcurrentOperationRunner::new(gateway, "filter", "switch")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_all_land() {
        let mut runner = runner();
        let mut batch = OperationBatch::new();
        for i in 1..=8 {
            batch.push(Operation::CreateLink {
                hook: format!("out{i}"),
                peer_hook: format!("link{i}"),
            });
        }
        let outcome = runner.run_batch(batch).await.expect("batch");
        assert!(outcome.structural);
        assert!(outcome.all_satisfied());
        assert_eq!(runner.phase(), RunnerPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn expected_rejection_is_satisfied() {
        let mut runner = runner();
        let mut batch = OperationBatch::new();
        batch.push_expecting(
            Operation::CreateLink {
                hook: DEFAULT_HOOK.to_string(),
                peer_hook: "linkx".to_string(),
            },
            Expectation::Rejected,
        );
        let outcome = runner.run_batch(batch).await.expect("batch");
        assert!(outcome.all_satisfied());
        assert!(!outcome.structural);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recorded_batch_feeds_the_ledger() {
        let mut runner = runner();
        let mut setup = OperationBatch::new();
        setup.push(Operation::CreateLink {
            hook: "out1".into(),
            peer_hook: "link1".into(),
        });
        runner.run_batch(setup).await.expect("setup");

        let ledger = Arc::new(Ledger::new());
        let mut batch = OperationBatch::new();
        for i in 0..16u64 {
            batch.push(Operation::Classify {
                key: MacAddr::from_index(i),
                hook: "out1".into(),
            });
        }
        let outcome = runner
            .run_recorded(batch, Some(ledger.clone()))
            .await
            .expect("batch");
        assert!(outcome.all_satisfied());
        assert_eq!(ledger.len(), 16);
        assert_eq!(ledger.expected_counts()["out1"], 16);
    }

    #[tokio::test]
    async fn unreachable_subsystem_is_an_environment_error() {
        let subsystem = Arc::new(SimSubsystem::new("filter", "switch"));
        subsystem.set_unreachable(true);
        let gateway = Arc::new(TextGateway::new(subsystem));
        let mut runner = ConcurrentOperationRunner::new(gateway, "filter", "switch");

        let mut batch = OperationBatch::new();
        batch.push(Operation::Reset);
        let err = runner.run_batch(batch).await.unwrap_err();
        assert!(matches!(err, HarnessError::Environment(_)));
    }
}
