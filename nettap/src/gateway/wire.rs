//! Control-message text format.
//!
//! Every request and response that crosses the control surface is a single
//! line of text. All encoding and decoding lives here so that no component
//! outside the gateway ever touches raw text; everything else consumes
//! typed results.
//!
//! Requests:
//!
//! ```text
//! mkpeer <node> <hook> <peer> <peerhook>
//! rmhook <node> <hook>
//! setrule <node> <mac> <hook>
//! reset <node>
//! gethooks <node>
//! getcounts <node>
//! getepoch <node>
//! setconfig <node> <fanout_alg> <failure_alg> <mask_hex>
//! ```
//!
//! Responses: `ok`, `rejected <reason>`, `hooks [name=count ...]`,
//! `counts [name=count ...]`, `epoch <n|->`.

use std::collections::BTreeMap;

use crate::error::{GatewayError, GatewayResult};
use crate::types::{HookInfo, LinkMask, MacAddr};

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Create a link: a new hook on `node` connected to `peer_hook` on
    /// `peer`.
    CreateLink {
        /// Node receiving the new hook.
        node: String,
        /// Hook name to create.
        hook: String,
        /// Peer node on the far side of the link.
        peer: String,
        /// Hook name created on the peer.
        peer_hook: String,
    },
    /// Remove the named hook from `node`, tearing down its link.
    RemoveLink {
        /// Node losing the hook.
        node: String,
        /// Hook name to remove.
        hook: String,
    },
    /// Route `key` to `hook`, overwriting any prior rule for `key`.
    SetRule {
        /// Classifier node holding the rule table.
        node: String,
        /// Address being classified.
        key: MacAddr,
        /// Target hook; the sentinel clears the rule instead.
        hook: String,
    },
    /// Clear the entire rule table of `node`.
    Reset {
        /// Classifier node to reset.
        node: String,
    },
    /// List hooks of `node` with their rule counts.
    QueryHooks {
        /// Node to inspect.
        node: String,
    },
    /// Per-hook rule counts of `node`.
    QueryCounts {
        /// Node to inspect.
        node: String,
    },
    /// Read the generation counter of `node`.
    QueryEpoch {
        /// Node to inspect.
        node: String,
    },
    /// Set fan-out behavior on `node`.
    Configure {
        /// Fan-out node to configure.
        node: String,
        /// Fan-out algorithm identifier.
        fanout_alg: u32,
        /// Failure algorithm identifier.
        failure_alg: u32,
        /// Link-enabled mask.
        links: LinkMask,
    },
}

impl Request {
    /// Render the request as its one-line wire form.
    pub fn render(&self) -> String {
        match self {
            Request::CreateLink {
                node,
                hook,
                peer,
                peer_hook,
            } => format!("mkpeer {node} {hook} {peer} {peer_hook}"),
            Request::RemoveLink { node, hook } => format!("rmhook {node} {hook}"),
            Request::SetRule { node, key, hook } => format!("setrule {node} {key} {hook}"),
            Request::Reset { node } => format!("reset {node}"),
            Request::QueryHooks { node } => format!("gethooks {node}"),
            Request::QueryCounts { node } => format!("getcounts {node}"),
            Request::QueryEpoch { node } => format!("getepoch {node}"),
            Request::Configure {
                node,
                fanout_alg,
                failure_alg,
                links,
            } => format!(
                "setconfig {node} {fanout_alg} {failure_alg} {:x}",
                links.bits()
            ),
        }
    }

    /// Decode a one-line wire request.
    pub fn parse(line: &str) -> GatewayResult<Self> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| GatewayError::ParseFailure("empty request".into()))?;
        let mut arg = |what: &str| {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| GatewayError::ParseFailure(format!("missing {what} in: {line}")))
        };
        let req = match verb {
            "mkpeer" => Request::CreateLink {
                node: arg("node")?,
                hook: arg("hook")?,
                peer: arg("peer")?,
                peer_hook: arg("peer hook")?,
            },
            "rmhook" => Request::RemoveLink {
                node: arg("node")?,
                hook: arg("hook")?,
            },
            "setrule" => Request::SetRule {
                node: arg("node")?,
                key: arg("key")?.parse()?,
                hook: arg("hook")?,
            },
            "reset" => Request::Reset { node: arg("node")? },
            "gethooks" => Request::QueryHooks { node: arg("node")? },
            "getcounts" => Request::QueryCounts { node: arg("node")? },
            "getepoch" => Request::QueryEpoch { node: arg("node")? },
            "setconfig" => Request::Configure {
                node: arg("node")?,
                fanout_alg: parse_int(&arg("fanout algorithm")?, line)?,
                failure_alg: parse_int(&arg("failure algorithm")?, line)?,
                links: LinkMask::from_bits_retain(
                    u32::from_str_radix(&arg("link mask")?, 16).map_err(|_| {
                        GatewayError::ParseFailure(format!("bad link mask in: {line}"))
                    })?,
                ),
            },
            other => {
                return Err(GatewayError::ParseFailure(format!(
                    "unknown verb '{other}'"
                )));
            }
        };
        if words.next().is_some() {
            return Err(GatewayError::ParseFailure(format!(
                "trailing arguments in: {line}"
            )));
        }
        Ok(req)
    }
}

fn parse_int(word: &str, line: &str) -> GatewayResult<u32> {
    word.parse()
        .map_err(|_| GatewayError::ParseFailure(format!("bad integer '{word}' in: {line}")))
}

/// Render an `ok` response.
pub fn render_ok() -> String {
    "ok".to_string()
}

/// Render a `rejected` response with a reason.
pub fn render_rejected(reason: &str) -> String {
    format!("rejected {reason}")
}

/// Render a hook listing response.
pub fn render_hooks(hooks: &[HookInfo]) -> String {
    render_pairs("hooks", hooks.iter().map(|h| (h.name.as_str(), h.rules)))
}

/// Render a per-hook count response.
pub fn render_counts(counts: &BTreeMap<String, u64>) -> String {
    render_pairs("counts", counts.iter().map(|(k, v)| (k.as_str(), *v)))
}

/// Render an epoch response; `None` renders the absent marker.
pub fn render_epoch(epoch: Option<u64>) -> String {
    match epoch {
        Some(e) => format!("epoch {e}"),
        None => "epoch -".to_string(),
    }
}

fn render_pairs<'a>(tag: &str, pairs: impl Iterator<Item = (&'a str, u64)>) -> String {
    let mut out = tag.to_string();
    for (name, count) in pairs {
        out.push(' ');
        out.push_str(name);
        out.push('=');
        out.push_str(&count.to_string());
    }
    out
}

/// Decode a status-only response (`ok` or `rejected <reason>`).
pub fn parse_status(line: &str) -> GatewayResult<()> {
    if line == "ok" {
        return Ok(());
    }
    match line.split_once(' ') {
        Some(("rejected", reason)) => Err(GatewayError::Rejected(reason.to_string())),
        _ if line == "rejected" => Err(GatewayError::Rejected(String::new())),
        _ => Err(GatewayError::ParseFailure(format!(
            "expected status, got: {line}"
        ))),
    }
}

/// Decode a hook listing response.
pub fn parse_hooks(line: &str) -> GatewayResult<Vec<HookInfo>> {
    Ok(parse_pairs("hooks", line)?
        .into_iter()
        .map(|(name, rules)| HookInfo { name, rules })
        .collect())
}

/// Decode a per-hook count response.
pub fn parse_counts(line: &str) -> GatewayResult<BTreeMap<String, u64>> {
    Ok(parse_pairs("counts", line)?.into_iter().collect())
}

/// Decode an epoch response. The absent marker decodes to `None`.
pub fn parse_epoch(line: &str) -> GatewayResult<Option<u64>> {
    match line.split_once(' ') {
        Some(("epoch", "-")) => Ok(None),
        Some(("epoch", value)) => value
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::ParseFailure(format!("bad epoch value: {line}"))),
        _ => match parse_status(line) {
            // A rejection is a legal answer to any query.
            Err(e @ GatewayError::Rejected(_)) => Err(e),
            _ => Err(GatewayError::ParseFailure(format!(
                "expected epoch, got: {line}"
            ))),
        },
    }
}

fn parse_pairs(tag: &str, line: &str) -> GatewayResult<Vec<(String, u64)>> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some(t) if t == tag => {}
        Some("rejected") => {
            return Err(GatewayError::Rejected(
                line.trim_start_matches("rejected").trim().to_string(),
            ));
        }
        _ => {
            return Err(GatewayError::ParseFailure(format!(
                "expected {tag}, got: {line}"
            )));
        }
    }
    let mut pairs = Vec::new();
    for word in words {
        let (name, count) = word.split_once('=').ok_or_else(|| {
            GatewayError::ParseFailure(format!("bad {tag} entry '{word}' in: {line}"))
        })?;
        let count = count.parse().map_err(|_| {
            GatewayError::ParseFailure(format!("bad {tag} count '{word}' in: {line}"))
        })?;
        pairs.push((name.to_string(), count));
    }
    Ok(pairs)
}
