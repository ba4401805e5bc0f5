//! In-process simulated classifier/fan-out subsystem.
//!
//! The real subsystem is an external collaborator; this simulation stands
//! behind the same [`ControlTransport`] seam and speaks the same wire
//! format, so the whole harness runs and is tested without it. The
//! simulation enforces the contract the oracle relies on: reserved hook
//! names are rejected, structural mutations bump the node epoch, rule
//! assignment is exclusive per key, and routing to the sentinel clears the
//! rule.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{GatewayError, GatewayResult};
use crate::types::{LinkMask, MacAddr, NodeKind, DEFAULT_HOOK};

use super::{wire, ControlTransport};

/// One simulated node.
#[derive(Debug)]
struct SimNode {
    kind: NodeKind,
    epoch: u64,
    hooks: BTreeSet<String>,
    rules: HashMap<MacAddr, String>,
    config: Option<(u32, u32, LinkMask)>,
}

impl SimNode {
    fn new(kind: NodeKind) -> Self {
        let mut hooks = BTreeSet::new();
        if kind == NodeKind::Classifier {
            hooks.insert(DEFAULT_HOOK.to_string());
        }
        Self {
            kind,
            epoch: 1,
            hooks,
            rules: HashMap::new(),
            config: None,
        }
    }

    fn counts(&self) -> BTreeMap<String, u64> {
        let mut counts: BTreeMap<String, u64> = self.hooks.iter().map(|h| (h.clone(), 0)).collect();
        for hook in self.rules.values() {
            *counts.entry(hook.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Default)]
struct SimState {
    nodes: HashMap<String, SimNode>,
    /// Link pairing so removing one side tears down the other.
    links: HashMap<(String, String), (String, String)>,
}

/// Simulated subsystem holding a classifier node and a fan-out node.
#[derive(Debug)]
pub struct SimSubsystem {
    state: Mutex<SimState>,
    unreachable: AtomicBool,
    epoch_hidden: AtomicBool,
}

impl SimSubsystem {
    /// Create a subsystem with one classifier and one fan-out node.
    ///
    /// The classifier starts with only the sentinel hook; the fan-out node
    /// starts bare. Both epochs start at 1.
    pub fn new(classifier: &str, fanout: &str) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(classifier.to_string(), SimNode::new(NodeKind::Classifier));
        nodes.insert(fanout.to_string(), SimNode::new(NodeKind::FanOut));
        Self {
            state: Mutex::new(SimState {
                nodes,
                links: HashMap::new(),
            }),
            unreachable: AtomicBool::new(false),
            epoch_hidden: AtomicBool::new(false),
        }
    }

    /// Make every subsequent roundtrip fail with `Unreachable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make epoch queries answer with the absent marker.
    pub fn hide_epoch(&self, hidden: bool) {
        self.epoch_hidden.store(hidden, Ordering::SeqCst);
    }

    async fn execute(&self, request: wire::Request) -> String {
        let mut state = self.state.lock().await;
        match request {
            wire::Request::CreateLink {
                node,
                hook,
                peer,
                peer_hook,
            } => state.create_link(&node, &hook, &peer, &peer_hook),
            wire::Request::RemoveLink { node, hook } => state.remove_link(&node, &hook),
            wire::Request::SetRule { node, key, hook } => state.set_rule(&node, key, &hook),
            wire::Request::Reset { node } => state.reset(&node),
            wire::Request::QueryHooks { node } => state.query_hooks(&node),
            wire::Request::QueryCounts { node } => state.query_counts(&node),
            wire::Request::QueryEpoch { node } => {
                state.query_epoch(&node, self.epoch_hidden.load(Ordering::SeqCst))
            }
            wire::Request::Configure {
                node,
                fanout_alg,
                failure_alg,
                links,
            } => state.configure(&node, fanout_alg, failure_alg, links),
        }
    }
}

impl SimState {
    fn create_link(&mut self, node: &str, hook: &str, peer: &str, peer_hook: &str) -> String {
        if !self.nodes.contains_key(node) || !self.nodes.contains_key(peer) {
            return wire::render_rejected("unknown node");
        }
        if hook == DEFAULT_HOOK || peer_hook == DEFAULT_HOOK {
            return wire::render_rejected("reserved hook name");
        }
        if self.nodes[node].hooks.contains(hook) {
            return wire::render_rejected("duplicate hook");
        }
        if self.nodes[peer].hooks.contains(peer_hook) {
            return wire::render_rejected("duplicate peer hook");
        }
        let n = self.nodes.get_mut(node).expect("checked above");
        n.hooks.insert(hook.to_string());
        n.epoch += 1;
        let p = self.nodes.get_mut(peer).expect("checked above");
        p.hooks.insert(peer_hook.to_string());
        p.epoch += 1;
        self.links.insert(
            (node.to_string(), hook.to_string()),
            (peer.to_string(), peer_hook.to_string()),
        );
        self.links.insert(
            (peer.to_string(), peer_hook.to_string()),
            (node.to_string(), hook.to_string()),
        );
        wire::render_ok()
    }

    fn remove_link(&mut self, node: &str, hook: &str) -> String {
        if hook == DEFAULT_HOOK {
            return wire::render_rejected("reserved hook name");
        }
        match self.nodes.get_mut(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) if !n.hooks.contains(hook) => wire::render_rejected("unknown hook"),
            Some(n) => {
                n.hooks.remove(hook);
                n.rules.retain(|_, owner| owner != hook);
                n.epoch += 1;
                // Tear down the far side of the link as well.
                if let Some((peer, peer_hook)) =
                    self.links.remove(&(node.to_string(), hook.to_string()))
                {
                    self.links.remove(&(peer.clone(), peer_hook.clone()));
                    if let Some(p) = self.nodes.get_mut(&peer) {
                        p.hooks.remove(&peer_hook);
                        p.rules.retain(|_, owner| *owner != peer_hook);
                        p.epoch += 1;
                    }
                }
                wire::render_ok()
            }
        }
    }

    fn set_rule(&mut self, node: &str, key: MacAddr, hook: &str) -> String {
        match self.nodes.get_mut(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) => {
                if hook == DEFAULT_HOOK {
                    n.rules.remove(&key);
                    return wire::render_ok();
                }
                if !n.hooks.contains(hook) {
                    return wire::render_rejected("unknown hook");
                }
                n.rules.insert(key, hook.to_string());
                wire::render_ok()
            }
        }
    }

    fn reset(&mut self, node: &str) -> String {
        match self.nodes.get_mut(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) => {
                n.rules.clear();
                n.epoch += 1;
                wire::render_ok()
            }
        }
    }

    fn query_hooks(&self, node: &str) -> String {
        match self.nodes.get(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) => {
                let counts = n.counts();
                let hooks: Vec<crate::types::HookInfo> = counts
                    .into_iter()
                    .map(|(name, rules)| crate::types::HookInfo { name, rules })
                    .collect();
                wire::render_hooks(&hooks)
            }
        }
    }

    fn query_counts(&self, node: &str) -> String {
        match self.nodes.get(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) => wire::render_counts(&n.counts()),
        }
    }

    fn query_epoch(&self, node: &str, hidden: bool) -> String {
        match self.nodes.get(node) {
            None => wire::render_rejected("unknown node"),
            Some(_) if hidden => wire::render_epoch(None),
            Some(n) => wire::render_epoch(Some(n.epoch)),
        }
    }

    fn configure(&mut self, node: &str, fanout_alg: u32, failure_alg: u32, links: LinkMask) -> String {
        match self.nodes.get_mut(node) {
            None => wire::render_rejected("unknown node"),
            Some(n) if n.kind != NodeKind::FanOut => {
                wire::render_rejected("node is not a fan-out")
            }
            Some(n) => {
                n.config = Some((fanout_alg, failure_alg, links));
                wire::render_ok()
            }
        }
    }
}

#[async_trait]
impl ControlTransport for SimSubsystem {
    async fn roundtrip(&self, request: &str) -> GatewayResult<String> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("simulated outage".to_string()));
        }
        let request = wire::Request::parse(request)?;
        Ok(self.execute(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CommandGateway, TextGateway};

    fn gateway() -> TextGateway<SimSubsystem> {
        TextGateway::new(SimSubsystem::new("filter", "switch"))
    }

    #[tokio::test]
    async fn reserved_hook_is_rejected() {
        let gw = gateway();
        let err = gw
            .create_link("filter", DEFAULT_HOOK, "switch", "link0")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn create_bumps_both_epochs_and_remove_tears_down_peer() {
        let gw = gateway();
        let before = gw.query_epoch("filter").await.unwrap().unwrap();
        gw.create_link("filter", "out1", "switch", "link1")
            .await
            .unwrap();
        assert_eq!(gw.query_epoch("filter").await.unwrap(), Some(before + 1));

        gw.remove_link("filter", "out1").await.unwrap();
        let hooks = gw.query_hooks("switch").await.unwrap();
        assert!(hooks.iter().all(|h| h.name != "link1"));

        // Recreating the same names must succeed after teardown.
        gw.create_link("filter", "out1", "switch", "link1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sentinel_clears_rule_and_reset_bumps_epoch() {
        let gw = gateway();
        gw.create_link("filter", "out1", "switch", "link1")
            .await
            .unwrap();
        let key: MacAddr = "02:00:00:00:00:01".parse().unwrap();
        gw.set_rule("filter", key, "out1").await.unwrap();
        assert_eq!(gw.query_counts("filter").await.unwrap()["out1"], 1);

        gw.set_rule("filter", key, DEFAULT_HOOK).await.unwrap();
        assert_eq!(gw.query_counts("filter").await.unwrap()["out1"], 0);

        let before = gw.query_epoch("filter").await.unwrap().unwrap();
        gw.reset("filter").await.unwrap();
        assert_eq!(gw.query_epoch("filter").await.unwrap(), Some(before + 1));
    }

    #[tokio::test]
    async fn unreachable_and_hidden_epoch_knobs() {
        let sub = std::sync::Arc::new(SimSubsystem::new("filter", "switch"));
        let gw = TextGateway::new(sub.clone());

        sub.hide_epoch(true);
        assert_eq!(gw.query_epoch("filter").await.unwrap(), None);
        sub.hide_epoch(false);

        sub.set_unreachable(true);
        assert!(matches!(
            gw.query_epoch("filter").await,
            Err(GatewayError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn configure_only_on_fanout() {
        let gw = gateway();
        gw.configure("switch", 1, 1, LinkMask::first(3))
            .await
            .unwrap();
        assert!(matches!(
            gw.configure("filter", 1, 1, LinkMask::first(3)).await,
            Err(GatewayError::Rejected(_))
        ));
    }
}
