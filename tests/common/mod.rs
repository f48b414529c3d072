// Common test utilities for dockgate integration tests
#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dockgate::config::Config;
use dockgate::runner::{display_command, CommandResult, CommandRunner, RunOptions, RunnerError};
use dockgate::server::{self, AppState};

/// Scripted [`CommandRunner`]: the first rule whose needle is a substring of
/// the rendered command line supplies the canned result. Commands matching no
/// rule succeed with a short stdout, which keeps name resolution probes
/// passing unless a test scripts otherwise.
///
/// Every command line is recorded so tests can assert exactly what would
/// have been executed.
pub struct ScriptedRunner {
    rules: Vec<(String, CommandResult)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a rule matching any command line containing `needle`. The canned
    /// result's `command` field is replaced with the actual line.
    pub fn respond(mut self, needle: &str, result: CommandResult) -> Self {
        self.rules.push((needle.to_string(), result));
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// How many recorded command lines contain `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _opts: RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        let display = display_command(program, args);
        self.calls.lock().unwrap().push(display.clone());
        for (needle, canned) in &self.rules {
            if display.contains(needle.as_str()) {
                let mut result = canned.clone();
                result.command = display;
                return Ok(result);
            }
        }
        Ok(ok_result(&display, "ok\n"))
    }
}

/// Successful result with the given stdout.
pub fn ok_result(command: &str, stdout: &str) -> CommandResult {
    CommandResult {
        command: command.into(),
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: 0,
        signal: None,
        ok: true,
    }
}

/// Failed result with the given exit code and stderr.
pub fn fail_result(command: &str, exit_code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        command: command.into(),
        stdout: String::new(),
        stderr: stderr.into(),
        exit_code,
        signal: None,
        ok: false,
    }
}

/// Config tuned for tests: background sync off (cycles are driven
/// explicitly), no log file, and the shadow directory pointed at a temp dir.
pub fn test_config(shadow_dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.sync_enabled = false;
    cfg.sync_startup_delay = Duration::ZERO;
    cfg.shadow_dir = shadow_dir.to_path_buf();
    cfg.log_file = None;
    cfg
}

/// Start an in-process server on an ephemeral port and return its base URL.
/// The listener is bound before this returns, so requests never race startup.
pub async fn spawn_server(config: Config, runner: Arc<ScriptedRunner>) -> String {
    let state = AppState::new(config, runner);
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("build HTTP client")
}

pub fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("ipv4 literal")
}

/// A `tailscale status --json`-shaped document: a `Self` node plus one peer
/// per `(address, online)` entry, keyed the way the real CLI keys them.
/// Peer addresses carry a CIDR suffix and a spurious IPv6 entry to match
/// real output.
pub fn mesh_status_json(self_ip: &str, peers: &[(&str, bool)]) -> String {
    let peer_map: serde_json::Map<String, serde_json::Value> = peers
        .iter()
        .enumerate()
        .map(|(i, (ip, online))| {
            (
                format!("nodekey:{i:032x}"),
                serde_json::json!({
                    "HostName": format!("peer-{i}"),
                    "Online": online,
                    "TailscaleIPs": [format!("{ip}/32"), format!("fd7a:115c:a1e0::{i}")],
                }),
            )
        })
        .collect();
    serde_json::json!({
        "Version": "1.62.0",
        "Self": {
            "HostName": "gateway",
            "Online": true,
            "TailscaleIPs": [self_ip],
        },
        "Peer": peer_map,
    })
    .to_string()
}
