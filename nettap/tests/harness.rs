//! End-to-end tests driving the full harness against the simulated
//! subsystem, plus targeted scenarios for each testable property.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nettap::epoch::{judge, EpochViolation};
use nettap::oracle::{compare_counts, compare_hook_sets, CountPattern};
use nettap::runner::ConcurrentOperationRunner;
use nettap::{
    CommandGateway, ControlTransport, Expectation, GatewayError, GatewayResult, Harness,
    HarnessConfig, HarnessError, MacAddr, Operation, OperationBatch, SimSubsystem, TextGateway,
    DEFAULT_HOOK,
};

/// Write sink shared between the test and the reporter it hands off.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn sim_gateway() -> (
    Arc<SimSubsystem>,
    Arc<TextGateway<Arc<SimSubsystem>>>,
) {
    let subsystem = Arc::new(SimSubsystem::new("filter", "switch"));
    let gateway = Arc::new(TextGateway::new(subsystem.clone()));
    (subsystem, gateway)
}

fn config(seed: u64) -> HarnessConfig {
    HarnessConfig {
        seed,
        ..HarnessConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_run_is_clean_and_emits_a_plan() {
    let (_, gateway) = sim_gateway();
    let out = SharedBuf::default();
    let mut harness = Harness::new(gateway, "filter", "switch", config(42), out.clone());

    harness.run_all().await.expect("run");
    assert_eq!(harness.failures(), 0, "TAP stream:\n{}", out.contents());

    let tap = out.contents();
    assert!(tap.contains("ok 1 - "));
    let total = harness.assertions();
    assert!(tap.ends_with(&format!("1..{total}\n")));
    assert!(!tap.contains("not ok"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_run_is_deterministic_per_seed() {
    let mut streams = Vec::new();
    for _ in 0..2 {
        let (_, gateway) = sim_gateway();
        let out = SharedBuf::default();
        let mut harness = Harness::new(gateway, "filter", "switch", config(7), out.clone());
        harness.run_all().await.expect("run");
        assert_eq!(harness.failures(), 0, "TAP stream:\n{}", out.contents());
        streams.push(out.contents());
    }
    assert_eq!(streams[0], streams[1], "same seed must replay byte for byte");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn broken_foundation_trips_the_gate() {
    let (_, gateway) = sim_gateway();
    // Occupy a churn hook name so the churn create batch gets rejected.
    gateway
        .create_link("filter", "churn1", "switch", "stolen")
        .await
        .expect("pre-create");

    let out = SharedBuf::default();
    let mut harness = Harness::new(gateway, "filter", "switch", config(42), out.clone());
    let err = harness.run_all().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::GateTripped { .. }
    ));
    assert!(out.contents().contains("Bail out!"));
}

/// The worked example: start with {default}; concurrently create
/// {out1, out2, out3}; classify a key to out1, reclassify to out2; reset.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn example_scenario_from_first_principles() {
    let (_, gateway) = sim_gateway();
    let mut runner = ConcurrentOperationRunner::new(gateway.clone(), "filter", "switch");

    let mut create = OperationBatch::new();
    for i in 1..=3 {
        create.push(Operation::CreateLink {
            hook: format!("out{i}"),
            peer_hook: format!("link{i}"),
        });
    }
    let outcome = runner.run_batch(create).await.expect("create batch");
    assert!(outcome.all_satisfied());

    let expected: Vec<String> = ["default", "out1", "out2", "out3"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let observed = gateway.query_hooks("filter").await.expect("hooks");
    compare_hook_sets(&expected, &observed).expect("hook sets equal");

    let key: MacAddr = "00:00:00:00:00:01".parse().expect("mac");
    gateway.set_rule("filter", key, "out1").await.expect("rule");
    let counts = gateway.query_counts("filter").await.expect("counts");
    compare_counts(&CountPattern::parse("out1"), 1, &counts).expect("out1=1");

    gateway.set_rule("filter", key, "out2").await.expect("rule");
    let counts = gateway.query_counts("filter").await.expect("counts");
    compare_counts(&CountPattern::parse("out1"), 0, &counts).expect("out1=0");
    compare_counts(&CountPattern::parse("out2"), 1, &counts).expect("out2=1");

    let before = gateway.query_epoch("filter").await.expect("epoch").unwrap();
    gateway.reset("filter").await.expect("reset");
    let counts = gateway.query_counts("filter").await.expect("counts");
    compare_counts(&CountPattern::parse("out*"), 0, &counts).expect("all clear");
    let after = gateway.query_epoch("filter").await.expect("epoch").unwrap();
    assert!(after > before, "reset must advance the epoch");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn count_conservation_across_reassignment() {
    let (_, gateway) = sim_gateway();
    let mut runner = ConcurrentOperationRunner::new(gateway.clone(), "filter", "switch");

    let mut setup = OperationBatch::new();
    for i in 1..=2 {
        setup.push(Operation::CreateLink {
            hook: format!("out{i}"),
            peer_hook: format!("link{i}"),
        });
    }
    runner.run_batch(setup).await.expect("setup");

    // 32 keys to out1, then every second one reassigned to out2, every
    // fourth cleared to the sentinel.
    let keys: Vec<MacAddr> = (0..32).map(MacAddr::from_index).collect();
    let mut classify = OperationBatch::new();
    for &key in &keys {
        classify.push(Operation::Classify {
            key,
            hook: "out1".into(),
        });
    }
    runner.run_batch(classify).await.expect("classify");

    let mut reassign = OperationBatch::new();
    for (i, &key) in keys.iter().enumerate() {
        if i % 4 == 0 {
            reassign.push(Operation::Classify {
                key,
                hook: DEFAULT_HOOK.into(),
            });
        } else if i % 2 == 0 {
            reassign.push(Operation::Classify {
                key,
                hook: "out2".into(),
            });
        }
    }
    runner.run_batch(reassign).await.expect("reassign");

    let counts = gateway.query_counts("filter").await.expect("counts");
    // 8 cleared, 8 moved to out2, 16 untouched on out1.
    compare_counts(&CountPattern::parse("out1"), 16, &counts).expect("out1");
    compare_counts(&CountPattern::parse("out2"), 8, &counts).expect("out2");
    compare_counts(&CountPattern::parse("out*"), 24, &counts).expect("conservation");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserved_hook_collision_is_an_expected_failure() {
    let (_, gateway) = sim_gateway();
    let mut runner = ConcurrentOperationRunner::new(gateway.clone(), "filter", "switch");

    let mut batch = OperationBatch::new();
    batch.push(Operation::CreateLink {
        hook: "out1".into(),
        peer_hook: "link1".into(),
    });
    batch.push_expecting(
        Operation::CreateLink {
            hook: DEFAULT_HOOK.into(),
            peer_hook: "link0".into(),
        },
        Expectation::Rejected,
    );
    let outcome = runner.run_batch(batch).await.expect("batch");
    assert!(outcome.all_satisfied());

    // State unchanged by the rejected creation: only default and out1.
    let observed = gateway.query_hooks("filter").await.expect("hooks");
    let expected: Vec<String> = ["default", "out1"].iter().map(|s| s.to_string()).collect();
    compare_hook_sets(&expected, &observed).expect("hook sets equal");
}

#[tokio::test]
async fn absent_epoch_is_a_distinct_failure() {
    let (subsystem, gateway) = sim_gateway();
    subsystem.hide_epoch(true);

    let before = gateway.query_epoch("filter").await.expect("query");
    assert_eq!(before, None);
    assert_eq!(judge(false, before, Some(1)), Err(EpochViolation::Missing));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fanout_epoch_moves_with_link_churn_only() {
    let (_, gateway) = sim_gateway();
    let mut runner = ConcurrentOperationRunner::new(gateway.clone(), "filter", "switch");

    let before = gateway.query_epoch("switch").await.expect("epoch");
    let mut create = OperationBatch::new();
    create.push(Operation::CreateLink {
        hook: "out1".into(),
        peer_hook: "link1".into(),
    });
    let outcome = runner.run_batch(create).await.expect("create");
    assert!(outcome.peer_structural);
    let after = gateway.query_epoch("switch").await.expect("epoch");
    assert!(judge(true, before, after).is_ok());

    // A classifier reset leaves the fan-out node's epoch alone.
    let before = after;
    let mut reset = OperationBatch::new();
    reset.push(Operation::Reset);
    let outcome = runner.run_batch(reset).await.expect("reset");
    assert!(outcome.structural);
    assert!(!outcome.peer_structural);
    let after = gateway.query_epoch("switch").await.expect("epoch");
    assert!(judge(false, before, after).is_ok());
}

/// Transport that answers every request with undecodable text.
struct GarbageTransport;

#[async_trait]
impl ControlTransport for GarbageTransport {
    async fn roundtrip(&self, _request: &str) -> GatewayResult<String> {
        Ok("!!garbage!!".to_string())
    }
}

#[tokio::test]
async fn malformed_response_aborts_the_batch() {
    let gateway = Arc::new(TextGateway::new(GarbageTransport));
    let mut runner = ConcurrentOperationRunner::new(gateway, "filter", "switch");

    let mut batch = OperationBatch::new();
    batch.push(Operation::Reset);
    let err = runner.run_batch(batch).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Gateway(GatewayError::ParseFailure(_))
    ));
}

/// Transport that never answers, for exercising the per-task timeout.
struct StalledTransport;

#[async_trait]
impl ControlTransport for StalledTransport {
    async fn roundtrip(&self, _request: &str) -> GatewayResult<String> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn per_task_timeout_yields_a_distinguished_error() {
    let gateway = Arc::new(TextGateway::new(StalledTransport));
    let mut runner = ConcurrentOperationRunner::new(gateway, "filter", "switch")
        .with_op_timeout(Some(Duration::from_millis(20)));

    let mut batch = OperationBatch::new();
    batch.push(Operation::Reset);
    let outcome = runner.run_batch(batch).await.expect("batch joins");
    assert!(matches!(
        outcome.outcomes[0].result,
        Err(GatewayError::Timeout(_))
    ));
    assert!(!outcome.all_satisfied());
}
