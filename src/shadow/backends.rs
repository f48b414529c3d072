//! On-disk shadow backend set: one `{ip}.conf` file per upstream peer.
//!
//! Reads tolerate unrelated files in the directory (anything whose stem is
//! not an IPv4 address is ignored). Writes go through a temp file plus
//! rename so a crashed cycle can never leave a half-written stanza behind.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Upstream stanza for one peer. Trailing newline included so files diff
/// cleanly with standard tools.
pub fn backend_stanza(ip: Ipv4Addr, port: u16) -> String {
    format!("server {ip}:{port} max_fails=2 fail_timeout=10s;\n")
}

/// Desired set for the given peers.
pub fn desired_set(peers: &BTreeSet<Ipv4Addr>, port: u16) -> BTreeMap<Ipv4Addr, String> {
    peers
        .iter()
        .map(|&ip| (ip, backend_stanza(ip, port)))
        .collect()
}

pub fn backend_path(dir: &Path, ip: Ipv4Addr) -> PathBuf {
    dir.join(format!("{ip}.conf"))
}

/// Scan the shadow directory into an IP → file-content map. A missing
/// directory reads as an empty set; membership requires a `.conf` extension
/// and an IPv4 stem.
pub async fn read_current(dir: &Path) -> Result<BTreeMap<Ipv4Addr, String>> {
    let mut current = BTreeMap::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(current),
        Err(err) => {
            return Err(err).with_context(|| format!("reading shadow dir {}", dir.display()))
        }
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("reading shadow dir {}", dir.display()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("conf") {
            continue;
        }
        let Some(ip) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<Ipv4Addr>().ok())
        else {
            continue;
        };
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        current.insert(ip, content);
    }
    Ok(current)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDiff {
    pub added: BTreeSet<Ipv4Addr>,
    pub removed: BTreeSet<Ipv4Addr>,
}

impl BackendDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Membership diff by IP. Content drift on an unchanged membership does not
/// count as a change; files are only rewritten on membership transitions.
pub fn diff(
    desired: &BTreeMap<Ipv4Addr, String>,
    current: &BTreeMap<Ipv4Addr, String>,
) -> BackendDiff {
    BackendDiff {
        added: desired
            .keys()
            .filter(|ip| !current.contains_key(ip))
            .copied()
            .collect(),
        removed: current
            .keys()
            .filter(|ip| !desired.contains_key(ip))
            .copied()
            .collect(),
    }
}

/// Write one backend file atomically.
pub async fn write_backend(dir: &Path, ip: Ipv4Addr, content: &str) -> Result<()> {
    let target = backend_path(dir, ip);
    let tmp = dir.join(format!("{ip}.conf.tmp"));
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &target)
        .await
        .with_context(|| format!("renaming {} into place", target.display()))?;
    Ok(())
}

pub async fn remove_backend(dir: &Path, ip: Ipv4Addr) -> Result<()> {
    let path = backend_path(dir, ip);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
    }
}

/// Make the directory contain exactly the desired set: write every desired
/// file, then delete the removed ones.
pub async fn apply_set(
    dir: &Path,
    desired: &BTreeMap<Ipv4Addr, String>,
    removed: &BTreeSet<Ipv4Addr>,
) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating shadow dir {}", dir.display()))?;
    for (&ip, content) in desired {
        write_backend(dir, ip, content).await?;
    }
    for &ip in removed {
        remove_backend(dir, ip).await?;
    }
    Ok(())
}

/// Rewrite the directory to a previous complete snapshot: every backend file
/// not in the snapshot is deleted, every snapshot file is rewritten verbatim.
pub async fn restore_snapshot(dir: &Path, snapshot: &BTreeMap<Ipv4Addr, String>) -> Result<()> {
    let present = read_current(dir).await?;
    for &ip in present.keys() {
        if !snapshot.contains_key(&ip) {
            remove_backend(dir, ip).await?;
        }
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating shadow dir {}", dir.display()))?;
    for (&ip, content) in snapshot {
        write_backend(dir, ip, content).await?;
    }
    Ok(())
}
