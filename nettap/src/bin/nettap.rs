//! Binary target for the harness.
//!
//! Runs every scenario group against the in-process simulated subsystem,
//! writing the TAP stream to stdout. Exit code is 0 on normal completion
//! regardless of recorded failures, non-zero on environment failure or a
//! tripped gate.

use std::process;
use std::sync::Arc;

use nettap::{Harness, HarnessConfig, HarnessError, SimSubsystem, TextGateway};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = HarnessConfig::from_env();
    tracing::debug!(?config, "starting harness");

    let gateway = Arc::new(TextGateway::new(Arc::new(SimSubsystem::new(
        "filter", "switch",
    ))));
    let mut harness = Harness::new(gateway, "filter", "switch", config, std::io::stdout());

    match harness.run_all().await {
        Ok(()) => {
            tracing::info!(
                assertions = harness.assertions(),
                failures = harness.failures(),
                "run complete"
            );
        }
        Err(HarnessError::GateTripped { gate, failures }) => {
            tracing::error!(gate = %gate, failures, "run aborted at gate");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    }
}
