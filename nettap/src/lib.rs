//! # nettap
//!
//! Concurrent, model-based test oracle for a dynamically reconfigurable
//! packet-classification and fan-out subsystem: one classifier node routing
//! traffic by hardware address into named hooks, one fan-out node
//! replicating traffic across output hooks.
//!
//! The subsystem offers no transactional batching and no per-key
//! provenance, only aggregate counts and unordered set queries. The harness
//! therefore:
//!
//! 1. mutates topology and address table through concurrently dispatched
//!    operation batches ([`runner`]),
//! 2. predicts the resulting state in its own shadow model ([`model`],
//!    [`ledger`]),
//! 3. verifies prediction against observation after a full join barrier,
//!    with order-independent comparisons ([`oracle`]) and generation-counter
//!    monotonicity checks ([`epoch`]),
//!
//! reporting every assertion on a TAP stream with fail-fast gates
//! ([`report`]).
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use nettap::{Harness, HarnessConfig, SimSubsystem, TextGateway};
//!
//! let gateway = Arc::new(TextGateway::new(Arc::new(SimSubsystem::new(
//!     "filter", "switch",
//! ))));
//! let mut harness = Harness::new(
//!     gateway,
//!     "filter",
//!     "switch",
//!     HarnessConfig::from_env(),
//!     std::io::stdout(),
//! );
//! harness.run_all().await?;
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod epoch;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod model;
pub mod oracle;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod types;

pub use config::HarnessConfig;
pub use error::{GatewayError, GatewayResult, HarnessError, HarnessResult};
pub use gateway::{CommandGateway, ControlTransport, SimSubsystem, TextGateway};
pub use ledger::Ledger;
pub use model::TopologyModel;
pub use report::TapReporter;
pub use runner::{ConcurrentOperationRunner, Expectation, Operation, OperationBatch};
pub use scenarios::Harness;
pub use types::{HookInfo, LinkMask, MacAddr, NodeKind, DEFAULT_HOOK};
