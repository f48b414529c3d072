//! Operation catalog and allow/deny policy.
//!
//! Every command the sidecar can execute is declared here, once, with a risk
//! category and the HTTP method it must be requested with. The catalog is
//! immutable after startup; policy resolution is an O(1) lookup.

use std::collections::{HashMap, HashSet};

use axum::http::Method;
use serde::Serialize;

/// Coarse risk classification gating whole classes of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Safe,
    Dangerous,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Safe => "safe",
            Category::Dangerous => "dangerous",
        }
    }
}

/// Required HTTP method for an operation. Reads are GET, mutations are POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Get,
    Post,
}

impl MethodKind {
    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodKind::Get => method == Method::GET,
            MethodKind::Post => method == Method::POST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Get => "GET",
            MethodKind::Post => "POST",
        }
    }
}

#[derive(Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub category: Category,
    pub method: MethodKind,
    pub summary: &'static str,
}

macro_rules! op {
    ($name:literal, $cat:ident, $method:ident, $summary:literal) => {
        OperationSpec {
            name: $name,
            category: Category::$cat,
            method: MethodKind::$method,
            summary: $summary,
        }
    };
}

/// The full, fixed operation catalog. Order is the display order of `/api/help`.
pub const CATALOG: &[OperationSpec] = &[
    // Unit-scoped container operations.
    op!("container.status", Safe, Get, "one-line state of a container"),
    op!("container.logs", Safe, Get, "tail container logs"),
    op!("container.inspect", Safe, Get, "full container inspect JSON"),
    op!("container.stats", Safe, Get, "one-shot resource usage snapshot"),
    op!("container.top", Safe, Get, "processes running in a container"),
    op!("container.start", Dangerous, Post, "start a container"),
    op!("container.stop", Dangerous, Post, "stop a container"),
    op!("container.restart", Dangerous, Post, "restart a container"),
    op!("container.pause", Dangerous, Post, "pause a container"),
    op!("container.unpause", Dangerous, Post, "unpause a container"),
    op!("container.kill", Dangerous, Post, "force-kill a container"),
    op!("container.rm", Dangerous, Post, "force-remove a container"),
    op!("container.rename", Dangerous, Post, "rename a container"),
    op!("container.update", Dangerous, Post, "update container resources"),
    op!("container.raw", Dangerous, Post, "docker <args..> <container>"),
    op!("container.exec", Dangerous, Post, "run a shell command in a container"),
    // Runtime-scoped operations.
    op!("system.ps", Safe, Get, "list containers"),
    op!("system.images", Safe, Get, "list images"),
    op!("system.networks", Safe, Get, "list networks"),
    op!("system.volumes", Safe, Get, "list volumes"),
    op!("system.info", Safe, Get, "runtime info"),
    op!("system.version", Safe, Get, "runtime version"),
    op!("system.prune", Dangerous, Post, "prune by scope (container/image/...)"),
    op!("system.raw", Dangerous, Post, "docker <args..>"),
    // Overlay network (mesh agent unit).
    op!("network.status", Safe, Get, "tailnet peer status"),
    op!("network.ping", Safe, Post, "ping a tailnet peer"),
    op!("network.address", Safe, Get, "this node's tailnet addresses"),
    // Reverse proxy (proxy unit).
    op!("proxy.test", Safe, Post, "validate proxy configuration"),
    op!("proxy.reload", Dangerous, Post, "validate then reload the proxy"),
    op!("proxy.version", Safe, Get, "proxy version"),
    op!("proxy.logs", Safe, Get, "tail proxy access/error log"),
];

/// Name-indexed view over [`CATALOG`].
#[derive(Debug)]
pub struct Catalog {
    by_name: HashMap<&'static str, &'static OperationSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        let by_name = CATALOG.iter().map(|op| (op.name, op)).collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&'static OperationSpec> {
        self.by_name.get(name).copied()
    }

    /// All operations in declaration order.
    pub fn operations(&self) -> impl Iterator<Item = &'static OperationSpec> {
        CATALOG.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-category allow-set: everything, or an explicit set of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    All,
    Names(HashSet<String>),
}

impl AllowList {
    /// Parse `*` (allow all) or a CSV of operation names.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            return AllowList::All;
        }
        AllowList::Names(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn permits(&self, name: &str) -> bool {
        match self {
            AllowList::All => true,
            AllowList::Names(names) => names.contains(name),
        }
    }
}

/// Policy knobs as loaded from configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub safe_enabled: bool,
    pub dangerous_enabled: bool,
    pub safe_allow: AllowList,
    pub dangerous_allow: AllowList,
    pub deny: HashSet<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            safe_enabled: true,
            dangerous_enabled: false,
            safe_allow: AllowList::All,
            dangerous_allow: AllowList::All,
            deny: HashSet::new(),
        }
    }
}

/// Immutable permission oracle: catalog + configured toggles.
#[derive(Debug)]
pub struct Policy {
    catalog: Catalog,
    config: PolicyConfig,
}

impl Policy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            catalog: Catalog::new(),
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Permitted iff the category is enabled, the category allow-set permits
    /// the name, and the name is not globally denied. Unknown names are
    /// always denied.
    pub fn is_allowed(&self, name: &str) -> bool {
        let Some(op) = self.catalog.get(name) else {
            return false;
        };
        let (enabled, allow) = match op.category {
            Category::Safe => (self.config.safe_enabled, &self.config.safe_allow),
            Category::Dangerous => (
                self.config.dangerous_enabled,
                &self.config.dangerous_allow,
            ),
        };
        if !enabled {
            return false;
        }
        if !allow.permits(name) {
            return false;
        }
        !self.config.deny.contains(name)
    }

    /// One line per operation: method, name, category, effective decision,
    /// summary.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for op in self.catalog.operations() {
            let decision = if self.is_allowed(op.name) {
                "allow"
            } else {
                "deny"
            };
            out.push_str(&format!(
                "{:<5} {:<18} {:<10} {:<6} {}\n",
                op.method.as_str(),
                op.name,
                op.category.as_str(),
                decision,
                op.summary
            ));
        }
        out
    }
}
