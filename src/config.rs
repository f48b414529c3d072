//! Runtime configuration, loaded once at startup from `DOCKGATE_*`
//! environment variables.
//!
//! Malformed values never abort startup: each falls back to its default and
//! the caller logs the collected warnings once the subscriber is up.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::policy::{AllowList, PolicyConfig};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;
pub const DEFAULT_LOG_FILE: &str = "/var/log/dockgate/dockgate.jsonl";
pub const DEFAULT_SHADOW_DIR: &str = "/etc/nginx/shadow-backends";

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen: SocketAddr,
    /// Container runtime binary (docker-compatible CLI).
    pub docker_bin: String,
    /// Request body cap in bytes.
    pub body_limit: usize,
    /// Timeout applied to every external command.
    pub command_timeout: Duration,
    /// Shorter timeout for the name-resolution existence probe.
    pub resolve_timeout: Duration,
    pub log_tail_default: u32,
    pub log_tail_max: u32,
    pub sync_enabled: bool,
    pub sync_interval: Duration,
    pub sync_startup_delay: Duration,
    /// Logical unit name of the reverse-proxy container.
    pub proxy_unit: String,
    /// Logical unit name of the overlay-network agent container.
    pub mesh_unit: String,
    /// Directory of per-peer `{ip}.conf` shadow backend files.
    pub shadow_dir: PathBuf,
    /// Upstream port rendered into each shadow backend stanza.
    pub shadow_port: u16,
    /// Interpreter used by container.exec when none (or a disallowed one) is
    /// requested.
    pub default_shell: String,
    /// JSON-lines log file; `None` disables file logging.
    pub log_file: Option<PathBuf>,
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            docker_bin: "docker".into(),
            body_limit: DEFAULT_BODY_LIMIT,
            command_timeout: Duration::from_secs(60),
            resolve_timeout: Duration::from_secs(5),
            log_tail_default: 100,
            log_tail_max: 5000,
            sync_enabled: true,
            sync_interval: Duration::from_secs(30),
            sync_startup_delay: Duration::from_secs(5),
            proxy_unit: "nginx".into(),
            mesh_unit: "tailscale".into(),
            shadow_dir: PathBuf::from(DEFAULT_SHADOW_DIR),
            shadow_port: 443,
            default_shell: "sh".into(),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            policy: PolicyConfig::default(),
        }
    }
}

impl Config {
    /// Load from the process environment. Returns the config plus any
    /// warnings about values that were malformed and replaced by defaults.
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but with an injectable variable source,
    /// so tests never touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<String>) {
        let mut cfg = Config::default();
        let mut warnings = Vec::new();

        if let Some(raw) = lookup("DOCKGATE_LISTEN") {
            match raw.parse::<SocketAddr>() {
                Ok(addr) => cfg.listen = addr,
                Err(_) => warnings.push(format!(
                    "DOCKGATE_LISTEN={raw:?} is not a socket address, using {DEFAULT_LISTEN}"
                )),
            }
        }
        if let Some(raw) = lookup("DOCKGATE_DOCKER_BIN") {
            if !raw.trim().is_empty() {
                cfg.docker_bin = raw.trim().to_string();
            }
        }
        parse_into(
            &mut cfg.body_limit,
            lookup("DOCKGATE_BODY_LIMIT"),
            "DOCKGATE_BODY_LIMIT",
            &mut warnings,
        );
        secs_into(
            &mut cfg.command_timeout,
            lookup("DOCKGATE_COMMAND_TIMEOUT_SECS"),
            "DOCKGATE_COMMAND_TIMEOUT_SECS",
            &mut warnings,
        );
        secs_into(
            &mut cfg.resolve_timeout,
            lookup("DOCKGATE_RESOLVE_TIMEOUT_SECS"),
            "DOCKGATE_RESOLVE_TIMEOUT_SECS",
            &mut warnings,
        );
        parse_into(
            &mut cfg.log_tail_default,
            lookup("DOCKGATE_LOG_TAIL_DEFAULT"),
            "DOCKGATE_LOG_TAIL_DEFAULT",
            &mut warnings,
        );
        parse_into(
            &mut cfg.log_tail_max,
            lookup("DOCKGATE_LOG_TAIL_MAX"),
            "DOCKGATE_LOG_TAIL_MAX",
            &mut warnings,
        );
        bool_into(
            &mut cfg.sync_enabled,
            lookup("DOCKGATE_SYNC_ENABLED"),
            "DOCKGATE_SYNC_ENABLED",
            &mut warnings,
        );
        secs_into(
            &mut cfg.sync_interval,
            lookup("DOCKGATE_SYNC_INTERVAL_SECS"),
            "DOCKGATE_SYNC_INTERVAL_SECS",
            &mut warnings,
        );
        secs_into(
            &mut cfg.sync_startup_delay,
            lookup("DOCKGATE_SYNC_STARTUP_DELAY_SECS"),
            "DOCKGATE_SYNC_STARTUP_DELAY_SECS",
            &mut warnings,
        );
        if let Some(raw) = lookup("DOCKGATE_PROXY_UNIT") {
            if !raw.trim().is_empty() {
                cfg.proxy_unit = raw.trim().to_string();
            }
        }
        if let Some(raw) = lookup("DOCKGATE_MESH_UNIT") {
            if !raw.trim().is_empty() {
                cfg.mesh_unit = raw.trim().to_string();
            }
        }
        if let Some(raw) = lookup("DOCKGATE_SHADOW_DIR") {
            if !raw.trim().is_empty() {
                cfg.shadow_dir = PathBuf::from(raw.trim());
            }
        }
        parse_into(
            &mut cfg.shadow_port,
            lookup("DOCKGATE_SHADOW_PORT"),
            "DOCKGATE_SHADOW_PORT",
            &mut warnings,
        );
        if let Some(raw) = lookup("DOCKGATE_SHELL") {
            if !raw.trim().is_empty() {
                cfg.default_shell = raw.trim().to_string();
            }
        }
        if let Some(raw) = lookup("DOCKGATE_LOG_FILE") {
            // Explicit empty value disables the file sink.
            let trimmed = raw.trim();
            cfg.log_file = if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            };
        }

        bool_into(
            &mut cfg.policy.safe_enabled,
            lookup("DOCKGATE_SAFE_ENABLED"),
            "DOCKGATE_SAFE_ENABLED",
            &mut warnings,
        );
        bool_into(
            &mut cfg.policy.dangerous_enabled,
            lookup("DOCKGATE_DANGEROUS_ENABLED"),
            "DOCKGATE_DANGEROUS_ENABLED",
            &mut warnings,
        );
        if let Some(raw) = lookup("DOCKGATE_SAFE_ALLOW") {
            cfg.policy.safe_allow = AllowList::parse(&raw);
        }
        if let Some(raw) = lookup("DOCKGATE_DANGEROUS_ALLOW") {
            cfg.policy.dangerous_allow = AllowList::parse(&raw);
        }
        if let Some(raw) = lookup("DOCKGATE_DENY") {
            cfg.policy.deny = csv_set(&raw);
        }

        (cfg, warnings)
    }

    /// Clamp a requested log tail into `[1, log_tail_max]`, applying the
    /// default when absent or unparseable.
    pub fn clamp_tail(&self, requested: Option<&str>) -> u32 {
        let value = requested
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(self.log_tail_default));
        value.clamp(1, i64::from(self.log_tail_max.max(1))) as u32
    }
}

fn csv_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_into<T: FromStr + Copy + std::fmt::Display>(
    slot: &mut T,
    raw: Option<String>,
    name: &str,
    warnings: &mut Vec<String>,
) {
    let Some(raw) = raw else { return };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => warnings.push(format!("{name}={raw:?} is not a number, using {slot}")),
    }
}

fn secs_into(slot: &mut Duration, raw: Option<String>, name: &str, warnings: &mut Vec<String>) {
    let Some(raw) = raw else { return };
    match raw.trim().parse::<u64>() {
        Ok(v) => *slot = Duration::from_secs(v),
        Err(_) => warnings.push(format!(
            "{name}={raw:?} is not a number of seconds, using {}s",
            slot.as_secs()
        )),
    }
}

fn bool_into(slot: &mut bool, raw: Option<String>, name: &str, warnings: &mut Vec<String>) {
    let Some(raw) = raw else { return };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => *slot = true,
        "0" | "false" | "no" | "off" => *slot = false,
        _ => warnings.push(format!("{name}={raw:?} is not a boolean, using {slot}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let (cfg, warnings) = Config::from_lookup(|_| None);
        assert!(warnings.is_empty());
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(cfg.docker_bin, "docker");
        assert_eq!(cfg.body_limit, DEFAULT_BODY_LIMIT);
        assert_eq!(cfg.sync_interval, Duration::from_secs(30));
        assert!(cfg.policy.safe_enabled);
        assert!(!cfg.policy.dangerous_enabled);
        assert_eq!(cfg.log_file.as_deref(), Some(std::path::Path::new(DEFAULT_LOG_FILE)));
    }

    #[test]
    fn parses_overrides() {
        let map = HashMap::from([
            ("DOCKGATE_LISTEN", "127.0.0.1:9000"),
            ("DOCKGATE_DOCKER_BIN", "podman"),
            ("DOCKGATE_SYNC_ENABLED", "off"),
            ("DOCKGATE_SYNC_INTERVAL_SECS", "10"),
            ("DOCKGATE_DANGEROUS_ENABLED", "true"),
            ("DOCKGATE_DANGEROUS_ALLOW", "container.start,container.stop"),
            ("DOCKGATE_DENY", "system.prune"),
            ("DOCKGATE_SHADOW_PORT", "8443"),
        ]);
        let (cfg, warnings) = Config::from_lookup(lookup_from(&map));
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(cfg.listen.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.docker_bin, "podman");
        assert!(!cfg.sync_enabled);
        assert_eq!(cfg.sync_interval, Duration::from_secs(10));
        assert!(cfg.policy.dangerous_enabled);
        assert!(cfg.policy.deny.contains("system.prune"));
        assert_eq!(cfg.shadow_port, 8443);
    }

    #[test]
    fn malformed_values_warn_and_keep_defaults() {
        let map = HashMap::from([
            ("DOCKGATE_LISTEN", "not-an-addr"),
            ("DOCKGATE_BODY_LIMIT", "lots"),
            ("DOCKGATE_SYNC_ENABLED", "maybe"),
        ]);
        let (cfg, warnings) = Config::from_lookup(lookup_from(&map));
        assert_eq!(warnings.len(), 3);
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(cfg.body_limit, DEFAULT_BODY_LIMIT);
        assert!(cfg.sync_enabled);
    }

    #[test]
    fn empty_log_file_disables_file_sink() {
        let map = HashMap::from([("DOCKGATE_LOG_FILE", "")]);
        let (cfg, _) = Config::from_lookup(lookup_from(&map));
        assert_eq!(cfg.log_file, None);
    }

    #[test]
    fn clamp_tail_applies_default_and_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.clamp_tail(None), 100);
        assert_eq!(cfg.clamp_tail(Some("abc")), 100);
        assert_eq!(cfg.clamp_tail(Some("0")), 1);
        assert_eq!(cfg.clamp_tail(Some("-5")), 1);
        assert_eq!(cfg.clamp_tail(Some("250")), 250);
        assert_eq!(cfg.clamp_tail(Some("999999")), 5000);
    }
}
