//! Shadow backend reconciler.
//!
//! Periodically derives the desired set of proxy upstream files from overlay
//! network peer state, applies the difference to the shadow directory, and
//! asks the proxy to validate and reload. A failed apply restores the
//! previous on-disk snapshot wholesale before re-surfacing the error.

pub mod backends;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::docker::DockerClient;
use crate::error::ApiError;
use crate::runner::CommandResult;
use crate::tailnet;

pub use backends::BackendDiff;

/// Run state, mutated only by the reconciler and read by `/api/healthz`.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub enabled: bool,
    pub in_progress: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_result: Option<String>,
    pub runs: u64,
    pub failures: u64,
}

impl SyncStatus {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            in_progress: false,
            last_run: None,
            last_success: None,
            last_error: None,
            last_result: None,
            runs: 0,
            failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied { added: usize, removed: usize },
    Unchanged { backends: usize },
    Failed(String),
    /// A trigger arrived while a cycle was already running; nothing happened.
    Skipped,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Applied { added, removed } => {
                write!(f, "applied +{added} -{removed}")
            }
            SyncOutcome::Unchanged { backends } => write!(f, "unchanged ({backends} backends)"),
            SyncOutcome::Failed(msg) => write!(f, "failed: {msg}"),
            SyncOutcome::Skipped => write!(f, "skipped (cycle already running)"),
        }
    }
}

/// What a cycle would do, without doing it.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub desired: BTreeMap<Ipv4Addr, String>,
    pub current: usize,
    pub diff: BackendDiff,
}

pub struct Reconciler {
    client: Arc<DockerClient>,
    dir: PathBuf,
    port: u16,
    enabled: bool,
    interval: Duration,
    startup_delay: Duration,
    running: AtomicBool,
    status: Mutex<SyncStatus>,
}

impl Reconciler {
    pub fn new(client: Arc<DockerClient>, config: &Config) -> Self {
        Self {
            client,
            dir: config.shadow_dir.clone(),
            port: config.shadow_port,
            enabled: config.sync_enabled,
            interval: config.sync_interval,
            startup_delay: config.sync_startup_delay,
            running: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::new(config.sync_enabled)),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let mut snapshot = self.status.lock().await.clone();
        snapshot.in_progress = self.running.load(Ordering::Acquire);
        snapshot
    }

    /// One reconciliation cycle, guarded against re-entry. A trigger landing
    /// while a cycle runs is dropped, never queued.
    pub async fn run_once(&self) -> SyncOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(target: "sync", "cycle already in progress, skipping trigger");
            return SyncOutcome::Skipped;
        }

        let started = Utc::now();
        let cycle_result = self.cycle().await;

        let mut status = self.status.lock().await;
        status.runs += 1;
        status.last_run = Some(started);
        let outcome = match cycle_result {
            Ok(outcome) => {
                status.last_success = Some(Utc::now());
                status.last_error = None;
                status.last_result = Some(outcome.to_string());
                outcome
            }
            Err(err) => {
                let msg = format!("{err:#}");
                error!(target: "sync", error = %msg, "cycle failed");
                status.failures += 1;
                status.last_error = Some(msg.clone());
                status.last_result = Some("failed".into());
                SyncOutcome::Failed(msg)
            }
        };
        drop(status);

        self.running.store(false, Ordering::Release);
        outcome
    }

    /// Compute desired/current/diff without touching the directory or the
    /// proxy.
    pub async fn plan(&self) -> Result<SyncPlan> {
        let desired = self.desired().await?;
        let current = backends::read_current(&self.dir).await?;
        let diff = backends::diff(&desired, &current);
        Ok(SyncPlan {
            desired,
            current: current.len(),
            diff,
        })
    }

    /// Timer-driven loop: one delayed startup run, then a fixed interval.
    /// Triggers that elapse while a cycle is still running are dropped,
    /// never queued.
    pub async fn run_loop(self: Arc<Self>) {
        if !self.enabled {
            info!(target: "sync", "shadow backend sync disabled");
            return;
        }
        tokio::time::sleep(self.startup_delay).await;
        self.run_once().await;
        let mut cycle_end = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate tick, spent by the startup run
        loop {
            let scheduled = ticker.tick().await;
            // Skip behavior coalesces all but one overdue tick; a trigger
            // whose deadline fell inside the previous cycle must not run
            // late either.
            if scheduled < cycle_end {
                warn!(
                    target: "sync",
                    "timer trigger elapsed during the previous cycle, dropping it"
                );
                continue;
            }
            self.run_once().await;
            cycle_end = tokio::time::Instant::now();
        }
    }

    async fn desired(&self) -> Result<BTreeMap<Ipv4Addr, String>> {
        let result = self
            .client
            .mesh_status(true)
            .await
            .context("querying overlay network status")?;
        if !result.ok {
            bail!("overlay status command failed: {}", summarize(&result));
        }
        let doc: serde_json::Value =
            serde_json::from_str(&result.stdout).context("parsing overlay network status JSON")?;
        let peers = tailnet::active_peer_ipv4s(&doc);
        Ok(backends::desired_set(&peers, self.port))
    }

    async fn cycle(&self) -> Result<SyncOutcome> {
        let desired = self.desired().await?;
        let current = backends::read_current(&self.dir).await?;
        let diff = backends::diff(&desired, &current);

        if diff.is_empty() {
            info!(target: "sync", backends = current.len(), "backend set unchanged");
            return Ok(SyncOutcome::Unchanged {
                backends: current.len(),
            });
        }

        info!(
            target: "sync",
            added = diff.added.len(),
            removed = diff.removed.len(),
            "applying backend set change"
        );
        backends::apply_set(&self.dir, &desired, &diff.removed).await?;

        if let Err(original) = self.validate_and_reload().await {
            warn!(
                target: "sync",
                error = %format!("{original:#}"),
                "apply failed, restoring previous backend set"
            );
            match backends::restore_snapshot(&self.dir, &current).await {
                Err(rollback_err) => {
                    error!(
                        target: "sync",
                        error = %format!("{rollback_err:#}"),
                        "rollback write failed"
                    );
                }
                Ok(()) => {
                    if let Err(reload_err) = self.validate_and_reload().await {
                        // Logged only; the original failure is the one that
                        // matters to the caller.
                        error!(
                            target: "sync",
                            error = %format!("{reload_err:#}"),
                            "reload after rollback failed"
                        );
                    }
                }
            }
            return Err(original);
        }

        Ok(SyncOutcome::Applied {
            added: diff.added.len(),
            removed: diff.removed.len(),
        })
    }

    async fn validate_and_reload(&self) -> Result<()> {
        match self.client.proxy_reload().await {
            Ok(result) if result.ok => Ok(()),
            Ok(result) => bail!("proxy reload failed: {}", summarize(&result)),
            Err(ApiError::CommandFailed { reason, result }) => {
                bail!("{reason}: {}", summarize(&result))
            }
            Err(err) => Err(err).context("reloading proxy"),
        }
    }
}

fn summarize(result: &CommandResult) -> String {
    match result.stderr.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => format!(
            "`{}` exited {}: {}",
            result.command,
            result.exit_code,
            line.trim()
        ),
        None => format!("`{}` exited {}", result.command, result.exit_code),
    }
}
