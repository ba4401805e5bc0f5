//! Test scenarios driving the runner, oracle, and reporter.
//!
//! Each scenario builds an [`OperationBatch`] against the shadow
//! [`TopologyModel`], hands it to the [`ConcurrentOperationRunner`], and
//! validates the joined state through the oracle comparator and the epoch
//! monitor, recording every assertion on the TAP stream. Gates after the
//! foundational groups abort the run before a broken foundation can
//! cascade.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::HarnessConfig;
use crate::epoch::EpochMonitor;
use crate::error::HarnessResult;
use crate::gateway::CommandGateway;
use crate::ledger::Ledger;
use crate::model::TopologyModel;
use crate::oracle::{compare_counts, compare_hook_sets, CountPattern};
use crate::report::TapReporter;
use crate::runner::{ConcurrentOperationRunner, Expectation, Operation, OperationBatch};
use crate::types::{LinkMask, MacAddr, DEFAULT_HOOK};

/// The full harness: gateway, shadow model, runner, monitor, reporter.
pub struct Harness<G, W: Write> {
    gateway: Arc<G>,
    runner: ConcurrentOperationRunner<G>,
    monitor: EpochMonitor<G>,
    fanout_monitor: EpochMonitor<G>,
    model: TopologyModel,
    reporter: TapReporter<W>,
    config: HarnessConfig,
    rng: ChaCha8Rng,
    classifier: String,
    fanout: String,
    seed: u64,
    key_seq: u64,
}

impl<G: CommandGateway + 'static, W: Write> Harness<G, W> {
    /// Build a harness against `gateway`, reporting to `out`.
    pub fn new(
        gateway: Arc<G>,
        classifier: &str,
        fanout: &str,
        config: HarnessConfig,
        out: W,
    ) -> Self {
        let seed = if config.seed == 0 {
            rand::rng().random()
        } else {
            config.seed
        };
        tracing::info!(seed, "harness seed");

        let timeout = match config.op_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let runner = ConcurrentOperationRunner::new(gateway.clone(), classifier, fanout)
            .with_op_timeout(timeout);
        let monitor = EpochMonitor::new(gateway.clone(), classifier);
        let fanout_monitor = EpochMonitor::new(gateway.clone(), fanout);

        Self {
            gateway,
            runner,
            monitor,
            fanout_monitor,
            model: TopologyModel::new(),
            reporter: TapReporter::new(out),
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            classifier: classifier.to_string(),
            fanout: fanout.to_string(),
            seed,
            key_seq: 0,
        }
    }

    /// Run every scenario group in order, gating after the foundational
    /// ones, and finish the TAP stream.
    pub async fn run_all(&mut self) -> HarnessResult<()> {
        self.reporter.diag(&format!("seed {}", self.seed))?;
        self.setup().await?;
        self.hook_churn().await?;
        self.reporter.gate("hook churn sanity")?;
        self.bulk_classification().await?;
        self.reporter.gate("count sanity")?;
        let first_round_keys = self.randomized_classification().await?;
        self.rerandomized_reassignment(&first_round_keys).await?;
        self.epoch_checks().await?;
        self.final_reset().await?;
        self.reporter.finish()?;
        Ok(())
    }

    /// Cumulative failure count recorded so far.
    pub fn failures(&self) -> u32 {
        self.reporter.failures()
    }

    /// Number of assertions recorded so far.
    pub fn assertions(&self) -> u32 {
        self.reporter.assertions()
    }

    // === scenario groups =================================================

    /// Topology setup: configure the fan-out node and create the `peers`
    /// output hooks in one concurrent batch.
    async fn setup(&mut self) -> HarnessResult<()> {
        let configured = self
            .gateway
            .configure(
                &self.fanout,
                1,
                1,
                LinkMask::first(self.config.peers),
            )
            .await;
        if let Err(crate::error::GatewayError::Unreachable(detail)) = &configured {
            // Fatal before any assertion runs.
            return Err(crate::error::HarnessError::Environment(format!(
                "collaborator unreachable during setup: {detail}"
            )));
        }
        self.reporter
            .assert(configured.is_ok(), "setup: fan-out node configured")?;

        let mut batch = OperationBatch::new();
        for i in 1..=self.config.peers {
            let hook = format!("out{i}");
            batch.push(Operation::CreateLink {
                hook: hook.clone(),
                peer_hook: format!("link{i}"),
            });
            self.model.add_hook(&hook);
        }
        self.run_verified("setup", batch, None).await?;
        self.verify_hooks("setup").await
    }

    /// Hook churn: K concurrent creates (plus one reserved-name collision
    /// dispatched as an expected failure), join, verify; then K concurrent
    /// removes, join, verify the original set is restored.
    async fn hook_churn(&mut self) -> HarnessResult<()> {
        let churn: Vec<String> = (1..=self.config.churn_hooks)
            .map(|i| format!("churn{i}"))
            .collect();

        let mut create = OperationBatch::new();
        for (i, hook) in churn.iter().enumerate() {
            create.push(Operation::CreateLink {
                hook: hook.clone(),
                peer_hook: format!("clink{}", i + 1),
            });
            self.model.add_hook(hook);
        }
        // Colliding with the reserved sentinel must be rejected; the
        // assertion is "operation was rejected", not "state changed".
        create.push_expecting(
            Operation::CreateLink {
                hook: DEFAULT_HOOK.to_string(),
                peer_hook: "clink0".to_string(),
            },
            Expectation::Rejected,
        );
        self.run_verified("hook churn create", create, None).await?;
        self.verify_hooks("hook churn create").await?;

        let mut remove = OperationBatch::new();
        for hook in &churn {
            remove.push(Operation::RemoveLink { hook: hook.clone() });
            self.model.remove_hook(hook);
        }
        self.run_verified("hook churn remove", remove, None).await?;
        self.verify_hooks("hook churn remove").await
    }

    /// Bulk classification: I×J distinct keys, target hook alternating by
    /// outer-iteration parity, dispatched in one concurrent batch and
    /// checked against the closed-form count implied by the alternation.
    async fn bulk_classification(&mut self) -> HarnessResult<()> {
        let outer = u64::from(self.config.bulk_outer);
        let inner = u64::from(self.config.bulk_inner);
        let lanes = u64::from(self.config.peers.clamp(1, 2));

        let mut batch = OperationBatch::new();
        for i in 0..outer {
            let hook = format!("out{}", i % lanes + 1);
            for _ in 0..inner {
                let key = self.next_key();
                batch.push(Operation::Classify {
                    key,
                    hook: hook.clone(),
                });
                self.model.classify(key, &hook);
            }
        }
        self.run_verified("bulk classify", batch, None).await?;

        let observed = self.gateway.query_counts(&self.classifier).await?;
        for (hook, expected) in bulk_expected(outer, inner, lanes) {
            let check = compare_counts(&CountPattern::Exact(hook.clone()), expected, &observed);
            self.reporter
                .assert_check(check, &format!("bulk classify: count on {hook}"))?;
        }
        let total = compare_counts(&CountPattern::parse("out*"), outer * inner, &observed);
        self.reporter
            .assert_check(total, "bulk classify: aggregate count over out*")?;

        // Clear the table so the randomized round starts clean; the reset
        // doubles as the idempotent-reset sanity check.
        self.reset_and_verify("bulk classify teardown").await
    }

    /// Randomized classification: every fresh key is routed to a hook
    /// sampled uniformly from {default, out1..outN}; decisions land in the
    /// append-only ledger inside the dispatching tasks, and expected counts
    /// are recomputed from the ledger after the join.
    async fn randomized_classification(&mut self) -> HarnessResult<Vec<MacAddr>> {
        let keys: Vec<MacAddr> = (0..self.config.bulk_keys())
            .map(|_| self.next_key())
            .collect();
        let ledger = Arc::new(Ledger::new());

        let mut batch = OperationBatch::new();
        for &key in &keys {
            let hook = self.sample_hook();
            batch.push(Operation::Classify {
                key,
                hook: hook.clone(),
            });
            self.model.classify(key, &hook);
        }
        self.run_verified("random classify", batch, Some(ledger.clone()))
            .await?;
        self.verify_ledger_counts("random classify", &ledger).await?;

        Ok(keys)
    }

    /// Re-randomized reassignment: replay every key of the first round
    /// with a freshly sampled hook, record into a second ledger, and verify
    /// that reassignment is exclusive, never additive.
    async fn rerandomized_reassignment(&mut self, keys: &[MacAddr]) -> HarnessResult<()> {
        let ledger = Arc::new(Ledger::new());
        let mut batch = OperationBatch::new();
        for &key in keys {
            let hook = self.sample_hook();
            batch.push(Operation::Classify {
                key,
                hook: hook.clone(),
            });
            self.model.classify(key, &hook);
        }
        self.run_verified("reassignment", batch, Some(ledger.clone()))
            .await?;
        // Only the second ledger speaks for these keys now: a key's prior
        // contribution is excluded once reassigned.
        self.verify_ledger_counts("reassignment", &ledger).await
    }

    /// Epoch discipline over repeated batch pairs: a non-structural batch
    /// must hold the epoch, a structural one must advance it. Every batch
    /// already gets this check inside [`run_verified`]; this group stresses
    /// it `epoch_iters` times in isolation.
    async fn epoch_checks(&mut self) -> HarnessResult<()> {
        for iter in 1..=self.config.epoch_iters {
            let key = self.next_key();
            let hook = self.sample_hook();
            let mut quiet = OperationBatch::new();
            quiet.push(Operation::Classify {
                key,
                hook: hook.clone(),
            });
            self.model.classify(key, &hook);
            self.run_verified(&format!("epoch iter {iter} non-structural"), quiet, None)
                .await?;

            let churn_hook = format!("epoch{iter}");
            let mut create = OperationBatch::new();
            create.push(Operation::CreateLink {
                hook: churn_hook.clone(),
                peer_hook: format!("elink{iter}"),
            });
            self.model.add_hook(&churn_hook);
            self.run_verified(&format!("epoch iter {iter} create"), create, None)
                .await?;

            // Remove in a separate join window; create and remove of one
            // hook never share a batch.
            let mut remove = OperationBatch::new();
            remove.push(Operation::RemoveLink {
                hook: churn_hook.clone(),
            });
            self.model.remove_hook(&churn_hook);
            self.run_verified(&format!("epoch iter {iter} remove"), remove, None)
                .await?;
        }
        Ok(())
    }

    /// Final idempotent-reset property: reset from whatever state remains
    /// and verify every hook reads zero rules.
    async fn final_reset(&mut self) -> HarnessResult<()> {
        self.reset_and_verify("final reset").await
    }

    // === shared machinery ================================================

    /// Dispatch a batch with epoch snapshots around it; record one
    /// assertion for the batch outcome and one epoch-discipline assertion
    /// per node. Link churn is structural for both nodes; a reset only for
    /// the classifier.
    async fn run_verified(
        &mut self,
        label: &str,
        batch: OperationBatch,
        ledger: Option<Arc<Ledger>>,
    ) -> HarnessResult<()> {
        let ops = batch.len();
        let before = self.monitor.snapshot().await?;
        let peer_before = self.fanout_monitor.snapshot().await?;
        let outcome = self.runner.run_recorded(batch, ledger).await?;
        let epoch_check = self.monitor.verify(outcome.structural, before).await?;
        let peer_check = self
            .fanout_monitor
            .verify(outcome.peer_structural, peer_before)
            .await?;

        if outcome.all_satisfied() {
            self.reporter
                .pass(&format!("{label}: {ops} operation(s) satisfied"))?;
        } else {
            let detail: Vec<String> = outcome.unsatisfied().map(|o| o.describe()).collect();
            self.reporter
                .fail(&format!("{label}: {}", detail.join("; ")))?;
        }
        self.reporter
            .assert_check(epoch_check, &format!("{label}: classifier epoch discipline"))?;
        self.reporter
            .assert_check(peer_check, &format!("{label}: fan-out epoch discipline"))?;
        Ok(())
    }

    /// Compare the observed hook listing against the model snapshot,
    /// order-independently.
    async fn verify_hooks(&mut self, label: &str) -> HarnessResult<()> {
        let observed = self.gateway.query_hooks(&self.classifier).await?;
        let check = compare_hook_sets(&self.model.snapshot_hooks(), &observed);
        self.reporter
            .assert_check(check, &format!("{label}: hook set matches model"))?;
        Ok(())
    }

    /// Compare observed counts against a ledger's recomputed expectation:
    /// one assertion per output hook plus the conservation check over the
    /// `out*` aggregate.
    async fn verify_ledger_counts(&mut self, label: &str, ledger: &Ledger) -> HarnessResult<()> {
        let expected = ledger.expected_counts();
        let observed = self.gateway.query_counts(&self.classifier).await?;

        for i in 1..=self.config.peers {
            let hook = format!("out{i}");
            let want = expected.get(&hook).copied().unwrap_or(0);
            let check = compare_counts(&CountPattern::Exact(hook.clone()), want, &observed);
            self.reporter
                .assert_check(check, &format!("{label}: count on {hook}"))?;
        }

        let routed = ledger.len() as u64 - ledger.sentinel_keys();
        let conservation = compare_counts(&CountPattern::parse("out*"), routed, &observed);
        self.reporter.assert_check(
            conservation,
            &format!("{label}: conservation over out* ({routed} routed)"),
        )?;
        Ok(())
    }

    /// Reset the classifier and verify every hook reads zero rules.
    async fn reset_and_verify(&mut self, label: &str) -> HarnessResult<()> {
        let mut batch = OperationBatch::new();
        batch.push(Operation::Reset);
        self.model.reset();
        self.run_verified(label, batch, None).await?;

        let hooks = self.gateway.query_hooks(&self.classifier).await?;
        let dirty: Vec<&str> = hooks
            .iter()
            .filter(|h| h.rules != 0)
            .map(|h| h.name.as_str())
            .collect();
        self.reporter.assert(
            dirty.is_empty(),
            &format!("{label}: zero rules on every hook after reset"),
        )?;
        Ok(())
    }

    /// Mint a fresh, never-before-used classification key.
    fn next_key(&mut self) -> MacAddr {
        self.key_seq += 1;
        MacAddr::from_index(self.key_seq)
    }

    /// Sample a target hook uniformly from {default, out1..outN}.
    fn sample_hook(&mut self) -> String {
        let pick = self.rng.random_range(0..=self.config.peers);
        if pick == 0 {
            DEFAULT_HOOK.to_string()
        } else {
            format!("out{pick}")
        }
    }
}

/// Expected per-hook totals for a parity-alternating bulk round; exposed
/// for tests of the closed form.
pub fn bulk_expected(outer: u64, inner: u64, lanes: u64) -> BTreeMap<String, u64> {
    let mut expected = BTreeMap::new();
    for lane in 0..lanes {
        let count = inner * (outer / lanes + u64::from(outer % lanes > lane));
        expected.insert(format!("out{}", lane + 1), count);
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_closed_form_covers_uneven_splits() {
        // 5 outer iterations over 2 lanes: lane 0 gets 3, lane 1 gets 2.
        let expected = bulk_expected(5, 16, 2);
        assert_eq!(expected["out1"], 48);
        assert_eq!(expected["out2"], 32);

        // Single lane takes everything.
        let expected = bulk_expected(4, 8, 1);
        assert_eq!(expected["out1"], 32);
    }
}
