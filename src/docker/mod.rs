//! Container-runtime client.
//!
//! Every operation is exactly one subprocess invocation through the shared
//! [`CommandRunner`]; unit-scoped operations resolve the logical name first
//! (see [`resolve`]). Non-zero exits come back as normal results; the HTTP
//! layer decides how to report them.

pub mod resolve;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::runner::{CommandResult, CommandRunner, RunOptions, RunnerError};

/// Interpreters an exec request may name; anything else silently falls back
/// to the configured default shell.
const EXEC_SHELLS: &[&str] = &["sh", "bash", "zsh", "ash"];

/// Scopes accepted by `system.prune`, each mapping onto `docker <scope> prune`.
pub const PRUNE_SCOPES: &[&str] = &[
    "container", "image", "network", "volume", "builder", "system",
];

pub struct DockerClient {
    runner: Arc<dyn CommandRunner>,
    docker_bin: String,
    command_timeout: Duration,
    resolve_timeout: Duration,
    default_shell: String,
    proxy_unit: String,
    mesh_unit: String,
    cache: Mutex<resolve::ResolutionCache>,
}

impl DockerClient {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            docker_bin: config.docker_bin.clone(),
            command_timeout: config.command_timeout,
            resolve_timeout: config.resolve_timeout,
            default_shell: config.default_shell.clone(),
            proxy_unit: config.proxy_unit.clone(),
            mesh_unit: config.mesh_unit.clone(),
            cache: Mutex::new(resolve::ResolutionCache::default()),
        }
    }

    pub fn proxy_unit(&self) -> &str {
        &self.proxy_unit
    }

    pub fn mesh_unit(&self) -> &str {
        &self.mesh_unit
    }

    /// Run `docker <args>` with the standard per-command timeout.
    async fn docker(&self, args: Vec<String>) -> Result<CommandResult, RunnerError> {
        self.runner
            .run(
                &self.docker_bin,
                &args,
                RunOptions::with_timeout(self.command_timeout),
            )
            .await
    }

    /// Same, but with the short resolution timeout. Existence probes must not
    /// hold a request hostage for the full command timeout.
    async fn docker_quick(&self, args: Vec<String>) -> Result<CommandResult, RunnerError> {
        self.runner
            .run(
                &self.docker_bin,
                &args,
                RunOptions::with_timeout(self.resolve_timeout),
            )
            .await
    }

    // ========================================================================
    // unit-scoped operations
    // ========================================================================

    pub async fn unit_status(&self, name: &str) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self
            .docker(vec![
                "inspect".into(),
                "--format".into(),
                "{{.State.Status}}".into(),
                id,
            ])
            .await?)
    }

    pub async fn unit_logs(&self, name: &str, tail: u32) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self
            .docker(vec!["logs".into(), "--tail".into(), tail.to_string(), id])
            .await?)
    }

    pub async fn unit_inspect(&self, name: &str) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self.docker(vec!["inspect".into(), id]).await?)
    }

    pub async fn unit_stats(&self, name: &str, json: bool) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        let mut args = vec!["stats".into(), "--no-stream".into()];
        if json {
            args.extend(["--format".into(), "json".into()]);
        }
        args.push(id);
        Ok(self.docker(args).await?)
    }

    pub async fn unit_top(&self, name: &str) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self.docker(vec!["top".into(), id]).await?)
    }

    async fn unit_verb(&self, verb: &str, name: &str) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self.docker(vec![verb.into(), id]).await?)
    }

    pub async fn unit_start(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("start", name).await
    }

    pub async fn unit_stop(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("stop", name).await
    }

    pub async fn unit_restart(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("restart", name).await
    }

    pub async fn unit_pause(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("pause", name).await
    }

    pub async fn unit_unpause(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("unpause", name).await
    }

    pub async fn unit_kill(&self, name: &str) -> ApiResult<CommandResult> {
        self.unit_verb("kill", name).await
    }

    pub async fn unit_remove(&self, name: &str) -> ApiResult<CommandResult> {
        let id = self.resolve(name).await?;
        Ok(self.docker(vec!["rm".into(), "-f".into(), id]).await?)
    }

    pub async fn unit_rename(&self, name: &str, new_name: &str) -> ApiResult<CommandResult> {
        if !resolve::valid_unit_name(new_name) {
            return Err(ApiError::InvalidInput(format!(
                "invalid new unit name `{new_name}`"
            )));
        }
        let id = self.resolve(name).await?;
        Ok(self
            .docker(vec!["rename".into(), id, new_name.into()])
            .await?)
    }

    /// `docker update <args..> <id>`. The caller must supply at least one
    /// argument.
    pub async fn unit_update(&self, name: &str, args: Vec<String>) -> ApiResult<CommandResult> {
        if args.is_empty() {
            return Err(ApiError::InvalidInput(
                "update requires at least one argument".into(),
            ));
        }
        let id = self.resolve(name).await?;
        let mut full = vec!["update".into()];
        full.extend(args);
        full.push(id);
        Ok(self.docker(full).await?)
    }

    /// `docker <args..> <id>`, an arbitrary subcommand with the unit appended.
    pub async fn unit_raw(&self, name: &str, args: Vec<String>) -> ApiResult<CommandResult> {
        if args.is_empty() {
            return Err(ApiError::InvalidInput(
                "raw requires at least one argument".into(),
            ));
        }
        let id = self.resolve(name).await?;
        let mut full = args;
        full.push(id);
        Ok(self.docker(full).await?)
    }

    /// Run command text under an interpreter inside the unit. The requested
    /// interpreter must be in the allow-set or the default shell is used.
    pub async fn unit_exec(
        &self,
        name: &str,
        cmd: &str,
        shell: Option<&str>,
    ) -> ApiResult<CommandResult> {
        if cmd.trim().is_empty() {
            return Err(ApiError::InvalidInput("exec requires command text".into()));
        }
        let interpreter = match shell {
            Some(s) if EXEC_SHELLS.contains(&s) => s,
            _ => self.default_shell.as_str(),
        };
        let id = self.resolve(name).await?;
        Ok(self
            .docker(vec![
                "exec".into(),
                id,
                interpreter.into(),
                "-c".into(),
                cmd.into(),
            ])
            .await?)
    }

    // ========================================================================
    // runtime-scoped operations
    // ========================================================================

    async fn listing(&self, base: Vec<String>, json: bool) -> ApiResult<CommandResult> {
        let mut args = base;
        if json {
            args.extend(["--format".into(), "json".into()]);
        }
        Ok(self.docker(args).await?)
    }

    pub async fn system_ps(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["ps".into(), "-a".into()], json).await
    }

    pub async fn system_images(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["images".into()], json).await
    }

    pub async fn system_networks(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["network".into(), "ls".into()], json).await
    }

    pub async fn system_volumes(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["volume".into(), "ls".into()], json).await
    }

    pub async fn system_info(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["info".into()], json).await
    }

    pub async fn system_version(&self, json: bool) -> ApiResult<CommandResult> {
        self.listing(vec!["version".into()], json).await
    }

    pub async fn system_prune(&self, scope: &str) -> ApiResult<CommandResult> {
        if !PRUNE_SCOPES.contains(&scope) {
            return Err(ApiError::InvalidInput(format!(
                "unknown prune scope `{scope}`, expected one of {}",
                PRUNE_SCOPES.join("/")
            )));
        }
        Ok(self
            .docker(vec![scope.into(), "prune".into(), "-f".into()])
            .await?)
    }

    pub async fn system_raw(&self, args: Vec<String>) -> ApiResult<CommandResult> {
        if args.is_empty() {
            return Err(ApiError::InvalidInput(
                "raw requires at least one argument".into(),
            ));
        }
        Ok(self.docker(args).await?)
    }

    // ========================================================================
    // proxy operations (exec into the proxy unit)
    // ========================================================================

    async fn exec_in(&self, unit: &str, cmd: Vec<String>) -> ApiResult<CommandResult> {
        let id = self.resolve(unit).await?;
        let mut args = vec!["exec".into(), id];
        args.extend(cmd);
        Ok(self.docker(args).await?)
    }

    pub async fn proxy_test(&self) -> ApiResult<CommandResult> {
        self.exec_in(&self.proxy_unit, vec!["nginx".into(), "-t".into()])
            .await
    }

    /// Validate, then reload. A failed validation aborts the reload and
    /// carries the validation output back to the caller.
    pub async fn proxy_reload(&self) -> ApiResult<CommandResult> {
        let test = self.proxy_test().await?;
        if !test.ok {
            return Err(ApiError::CommandFailed {
                reason: "proxy config validation failed, reload aborted".into(),
                result: test,
            });
        }
        self.exec_in(
            &self.proxy_unit,
            vec!["nginx".into(), "-s".into(), "reload".into()],
        )
        .await
    }

    pub async fn proxy_version(&self) -> ApiResult<CommandResult> {
        self.exec_in(&self.proxy_unit, vec!["nginx".into(), "-v".into()])
            .await
    }

    pub async fn proxy_logs(&self, kind: &str, tail: u32) -> ApiResult<CommandResult> {
        // An unsupported kind is a missing route, not malformed input.
        if kind != "access" && kind != "error" {
            return Err(ApiError::NotFound(format!(
                "unknown proxy log `{kind}`, expected access or error"
            )));
        }
        self.exec_in(
            &self.proxy_unit,
            vec![
                "tail".into(),
                "-n".into(),
                tail.to_string(),
                format!("/var/log/nginx/{kind}.log"),
            ],
        )
        .await
    }

    // ========================================================================
    // mesh operations (exec into the mesh unit)
    // ========================================================================

    pub async fn mesh_status(&self, json: bool) -> ApiResult<CommandResult> {
        let mut cmd = vec!["tailscale".into(), "status".into()];
        if json {
            cmd.push("--json".into());
        }
        self.exec_in(&self.mesh_unit, cmd).await
    }

    pub async fn mesh_ping(&self, target: &str, count: i64) -> ApiResult<CommandResult> {
        if target.trim().is_empty() {
            return Err(ApiError::InvalidInput("ping requires a target".into()));
        }
        let count = count.clamp(1, 10);
        self.exec_in(
            &self.mesh_unit,
            vec![
                "tailscale".into(),
                "ping".into(),
                "-c".into(),
                count.to_string(),
                target.into(),
            ],
        )
        .await
    }

    pub async fn mesh_address(&self) -> ApiResult<CommandResult> {
        self.exec_in(&self.mesh_unit, vec!["tailscale".into(), "ip".into()])
            .await
    }
}
