//! Typed wrapper over the subsystem's one command interface.
//!
//! [`CommandGateway`] is the seam every other component depends on: one
//! method per external primitive, typed payloads in and out, no retries, no
//! cached state. Underneath, [`TextGateway`] speaks the line-oriented
//! control format through a [`ControlTransport`], keeping all text
//! encoding/decoding inside this module.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::types::{HookInfo, LinkMask, MacAddr};

pub mod sim;
pub mod wire;

pub use sim::SimSubsystem;

/// Typed access to the subsystem's command surface.
///
/// Each call is synchronous from the caller's perspective and performs
/// exactly one external operation. Mutating operations are not idempotent
/// under retry; callers must treat any retry as a new, independently
/// reasoned-about operation.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Create a hook on `node` linked to a freshly created `peer_hook` on
    /// `peer`.
    async fn create_link(
        &self,
        node: &str,
        hook: &str,
        peer: &str,
        peer_hook: &str,
    ) -> GatewayResult<()>;

    /// Remove `hook` from `node`, tearing down its link.
    async fn remove_link(&self, node: &str, hook: &str) -> GatewayResult<()>;

    /// Route `key` to `hook`, overwriting any prior rule for `key`. Routing
    /// to the sentinel hook clears the rule.
    async fn set_rule(&self, node: &str, key: MacAddr, hook: &str) -> GatewayResult<()>;

    /// Clear the entire rule table of `node`.
    async fn reset(&self, node: &str) -> GatewayResult<()>;

    /// List the hooks of `node` with their rule counts. The order carries
    /// no meaning.
    async fn query_hooks(&self, node: &str) -> GatewayResult<Vec<HookInfo>>;

    /// Per-hook rule counts of `node`.
    async fn query_counts(&self, node: &str) -> GatewayResult<BTreeMap<String, u64>>;

    /// Read the generation counter of `node`. `None` means the subsystem
    /// reported no epoch; the monitor treats that as a failure, not a skip.
    async fn query_epoch(&self, node: &str) -> GatewayResult<Option<u64>>;

    /// Set fan-out algorithm, failure algorithm, and link-enabled mask on
    /// `node`.
    async fn configure(
        &self,
        node: &str,
        fanout_alg: u32,
        failure_alg: u32,
        links: LinkMask,
    ) -> GatewayResult<()>;
}

/// Raw request/response seam under the gateway.
///
/// A transport carries one line of request text to the subsystem and
/// returns its one-line answer. The in-process [`SimSubsystem`] implements
/// this directly; a production transport would write to a control socket.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Send one request line, await its response line.
    async fn roundtrip(&self, request: &str) -> GatewayResult<String>;
}

#[async_trait]
impl<T: ControlTransport + ?Sized> ControlTransport for std::sync::Arc<T> {
    async fn roundtrip(&self, request: &str) -> GatewayResult<String> {
        (**self).roundtrip(request).await
    }
}

/// [`CommandGateway`] implementation over a line-oriented transport.
#[derive(Debug)]
pub struct TextGateway<T> {
    transport: T,
}

impl<T: ControlTransport> TextGateway<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn roundtrip(&self, request: wire::Request) -> GatewayResult<String> {
        let line = request.render();
        tracing::trace!(request = %line, "gateway roundtrip");
        self.transport.roundtrip(&line).await
    }
}

#[async_trait]
impl<T: ControlTransport> CommandGateway for TextGateway<T> {
    async fn create_link(
        &self,
        node: &str,
        hook: &str,
        peer: &str,
        peer_hook: &str,
    ) -> GatewayResult<()> {
        let reply = self
            .roundtrip(wire::Request::CreateLink {
                node: node.to_string(),
                hook: hook.to_string(),
                peer: peer.to_string(),
                peer_hook: peer_hook.to_string(),
            })
            .await?;
        wire::parse_status(&reply)
    }

    async fn remove_link(&self, node: &str, hook: &str) -> GatewayResult<()> {
        let reply = self
            .roundtrip(wire::Request::RemoveLink {
                node: node.to_string(),
                hook: hook.to_string(),
            })
            .await?;
        wire::parse_status(&reply)
    }

    async fn set_rule(&self, node: &str, key: MacAddr, hook: &str) -> GatewayResult<()> {
        let reply = self
            .roundtrip(wire::Request::SetRule {
                node: node.to_string(),
                key,
                hook: hook.to_string(),
            })
            .await?;
        wire::parse_status(&reply)
    }

    async fn reset(&self, node: &str) -> GatewayResult<()> {
        let reply = self
            .roundtrip(wire::Request::Reset {
                node: node.to_string(),
            })
            .await?;
        wire::parse_status(&reply)
    }

    async fn query_hooks(&self, node: &str) -> GatewayResult<Vec<HookInfo>> {
        let reply = self
            .roundtrip(wire::Request::QueryHooks {
                node: node.to_string(),
            })
            .await?;
        wire::parse_hooks(&reply)
    }

    async fn query_counts(&self, node: &str) -> GatewayResult<BTreeMap<String, u64>> {
        let reply = self
            .roundtrip(wire::Request::QueryCounts {
                node: node.to_string(),
            })
            .await?;
        wire::parse_counts(&reply)
    }

    async fn query_epoch(&self, node: &str) -> GatewayResult<Option<u64>> {
        let reply = self
            .roundtrip(wire::Request::QueryEpoch {
                node: node.to_string(),
            })
            .await?;
        wire::parse_epoch(&reply)
    }

    async fn configure(
        &self,
        node: &str,
        fanout_alg: u32,
        failure_alg: u32,
        links: LinkMask,
    ) -> GatewayResult<()> {
        let reply = self
            .roundtrip(wire::Request::Configure {
                node: node.to_string(),
                fanout_alg,
                failure_alg,
                links,
            })
            .await?;
        wire::parse_status(&reply)
    }
}
