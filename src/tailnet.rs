//! Peer extraction from overlay-network status JSON.
//!
//! The agent's JSON shape drifts across versions (field casing, map vs
//! array, which address list is populated), so everything here probes a
//! fixed candidate list of keys instead of deserializing into a struct.
//! Only IPv4 addresses are harvested; IPv6 peers are out of scope for the
//! shadow backend set.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde_json::Value;

const PEERS_KEYS: &[&str] = &["Peer", "Peers", "peers"];
const SELF_KEYS: &[&str] = &["Self", "self"];
const ONLINE_KEYS: &[&str] = &["Online", "online", "Active", "active"];
const CUR_ADDR_KEYS: &[&str] = &[
    "CurAddr",
    "curAddr",
    "cur_addr",
    "CurrentAddress",
    "current_address",
];
const ADDR_LIST_KEYS: &[&str] = &[
    "TailscaleIPs",
    "tailscale_ips",
    "Addresses",
    "addresses",
    "Addrs",
    "addrs",
    "IPs",
    "ips",
];

/// Active peer IPv4 addresses from a status document, excluding the local
/// node's own addresses. Sorted numerically by virtue of the set type.
pub fn active_peer_ipv4s(status: &Value) -> BTreeSet<Ipv4Addr> {
    let mut own = BTreeSet::new();
    if let Some(self_node) = first_present(status, SELF_KEYS) {
        collect_node_ipv4s(self_node, &mut own);
    }

    let mut active = BTreeSet::new();
    if let Some(peers) = first_present(status, PEERS_KEYS) {
        for peer in iter_nodes(peers) {
            if node_is_active(peer) {
                collect_node_ipv4s(peer, &mut active);
            }
        }
    }

    active.difference(&own).copied().collect()
}

fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(key))
}

/// Peers come as a map keyed by node key or as a plain array.
fn iter_nodes(peers: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match peers {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(list) => Box::new(list.iter()),
        _ => Box::new(std::iter::empty()),
    }
}

/// An explicit online/active boolean wins; without one, a non-empty current
/// address counts as alive.
fn node_is_active(node: &Value) -> bool {
    let mut saw_bool = false;
    for key in ONLINE_KEYS {
        if let Some(flag) = node.get(key).and_then(Value::as_bool) {
            saw_bool = true;
            if flag {
                return true;
            }
        }
    }
    if saw_bool {
        return false;
    }
    CUR_ADDR_KEYS.iter().any(|key| {
        node.get(key)
            .and_then(Value::as_str)
            .is_some_and(|addr| !addr.trim().is_empty())
    })
}

fn collect_node_ipv4s(node: &Value, out: &mut BTreeSet<Ipv4Addr>) {
    for key in ADDR_LIST_KEYS {
        let Some(list) = node.get(key).and_then(Value::as_array) else {
            continue;
        };
        for entry in list {
            if let Some(ip) = entry.as_str().and_then(parse_ipv4) {
                out.insert(ip);
            }
        }
    }
}

/// Accepts a bare address or a `/`-suffixed CIDR form.
fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let raw = raw.trim();
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => raw.split_once('/').and_then(|(ip, _)| ip.parse().ok()),
    }
}
