//! Route handlers. Every operation route follows the same shape: catalog
//! lookup, method check, policy check, execute, render.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use chrono::SecondsFormat;

use super::params::Params;
use super::render::respond;
use super::SharedState;
use crate::error::{plain, ApiError, ApiResult};
use crate::policy::OperationSpec;

/// Default ping probe count when the caller does not send one.
const DEFAULT_PING_COUNT: i64 = 2;

fn gate<'a>(
    state: &'a SharedState,
    op_name: &str,
    method: &Method,
) -> Result<&'a OperationSpec, ApiError> {
    let Some(spec) = state.policy.catalog().get(op_name) else {
        return Err(ApiError::NotFound(format!("unknown operation `{op_name}`")));
    };
    if !spec.method.allows(method) {
        return Err(ApiError::MethodNotAllowed {
            allowed: spec.method.as_str(),
        });
    }
    if !state.policy.is_allowed(op_name) {
        return Err(ApiError::PermissionDenied(op_name.to_string()));
    }
    Ok(spec)
}

// ============================================================================
// introspection
// ============================================================================

pub async fn help(State(state): State<SharedState>) -> Response {
    let mut out = String::from("dockgate operations\n\n");
    out.push_str(&state.policy.describe());
    out.push_str(
        "\nroutes: /api/{unit}/{action}  /api/system/{command}  /api/network/*  /api/proxy/*\n",
    );
    plain(StatusCode::OK, out)
}

pub async fn healthz(State(state): State<SharedState>) -> Response {
    let sync = state.reconciler.status().await;
    let mut out = String::from("status=ok\n");
    out.push_str(&format!("sync_enabled={}\n", sync.enabled));
    out.push_str(&format!("sync_in_progress={}\n", sync.in_progress));
    out.push_str(&format!("sync_runs={}\n", sync.runs));
    out.push_str(&format!("sync_failures={}\n", sync.failures));
    out.push_str(&format!("sync_last_run={}\n", stamp(&sync.last_run)));
    out.push_str(&format!("sync_last_success={}\n", stamp(&sync.last_success)));
    if let Some(result) = &sync.last_result {
        out.push_str(&format!("sync_last_result={result}\n"));
    }
    if let Some(error) = &sync.last_error {
        out.push_str(&format!("sync_last_error={}\n", error.replace('\n', " ")));
    }
    plain(StatusCode::OK, out)
}

fn stamp(ts: &Option<chrono::DateTime<chrono::Utc>>) -> String {
    match ts {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "never".into(),
    }
}

// ============================================================================
// runtime-scoped operations
// ============================================================================

pub async fn system_op(
    State(state): State<SharedState>,
    Path(command): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    let op_name = format!("system.{command}");
    gate(&state, &op_name, &method)?;
    let params = Params::new(query.as_deref(), &body);
    let json = params.json_flag();

    let client = &state.client;
    let result = match command.as_str() {
        "ps" => client.system_ps(json).await?,
        "images" => client.system_images(json).await?,
        "networks" => client.system_networks(json).await?,
        "volumes" => client.system_volumes(json).await?,
        "info" => client.system_info(json).await?,
        "version" => client.system_version(json).await?,
        "prune" => {
            let scope = params
                .text("scope")
                .or_else(|| params.args().ok()?.into_iter().next())
                .ok_or_else(|| {
                    ApiError::InvalidInput("prune requires a `scope` parameter".into())
                })?;
            client.system_prune(&scope).await?
        }
        "raw" => client.system_raw(params.args()?).await?,
        other => return Err(ApiError::NotFound(format!("unknown command `{other}`"))),
    };
    Ok(respond(result, json))
}

// ============================================================================
// unit-scoped operations
// ============================================================================

pub async fn unit_op(
    State(state): State<SharedState>,
    Path((unit, action)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    let op_name = format!("container.{action}");
    gate(&state, &op_name, &method)?;
    let params = Params::new(query.as_deref(), &body);
    let json = params.json_flag();

    let client = &state.client;
    let result = match action.as_str() {
        "status" => client.unit_status(&unit).await?,
        "logs" => {
            let tail = state.config.clamp_tail(params.first("tail"));
            client.unit_logs(&unit, tail).await?
        }
        "inspect" => client.unit_inspect(&unit).await?,
        "stats" => client.unit_stats(&unit, json).await?,
        "top" => client.unit_top(&unit).await?,
        "start" => client.unit_start(&unit).await?,
        "stop" => client.unit_stop(&unit).await?,
        "restart" => client.unit_restart(&unit).await?,
        "pause" => client.unit_pause(&unit).await?,
        "unpause" => client.unit_unpause(&unit).await?,
        "kill" => client.unit_kill(&unit).await?,
        "rm" => client.unit_remove(&unit).await?,
        "rename" => {
            let to = params
                .text("to")
                .or_else(|| params.args().ok()?.into_iter().next())
                .ok_or_else(|| {
                    ApiError::InvalidInput("rename requires a new name (`to`)".into())
                })?;
            client.unit_rename(&unit, &to).await?
        }
        "update" => client.unit_update(&unit, params.args()?).await?,
        "raw" => client.unit_raw(&unit, params.args()?).await?,
        "exec" => {
            let cmd = params.text("cmd").ok_or_else(|| {
                ApiError::InvalidInput("exec requires command text (`cmd` or body)".into())
            })?;
            client.unit_exec(&unit, &cmd, params.first("shell")).await?
        }
        other => return Err(ApiError::NotFound(format!("unknown action `{other}`"))),
    };
    Ok(respond(result, json))
}

// ============================================================================
// overlay network
// ============================================================================

pub async fn network_status(
    State(state): State<SharedState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    gate(&state, "network.status", &method)?;
    let params = Params::new(query.as_deref(), &body);
    let json = params.json_flag();
    let result = state.client.mesh_status(json).await?;
    Ok(respond(result, json))
}

pub async fn network_ping(
    State(state): State<SharedState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    gate(&state, "network.ping", &method)?;
    let params = Params::new(query.as_deref(), &body);
    let target = params
        .text("target")
        .ok_or_else(|| ApiError::InvalidInput("ping requires a `target`".into()))?;
    let count = params
        .first("count")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_PING_COUNT);
    let result = state.client.mesh_ping(&target, count).await?;
    Ok(respond(result, false))
}

pub async fn network_address(
    State(state): State<SharedState>,
    method: Method,
) -> ApiResult<Response> {
    gate(&state, "network.address", &method)?;
    let result = state.client.mesh_address().await?;
    Ok(respond(result, false))
}

// ============================================================================
// proxy control
// ============================================================================

pub async fn proxy_test(State(state): State<SharedState>, method: Method) -> ApiResult<Response> {
    gate(&state, "proxy.test", &method)?;
    let result = state.client.proxy_test().await?;
    Ok(respond(result, false))
}

pub async fn proxy_reload(State(state): State<SharedState>, method: Method) -> ApiResult<Response> {
    gate(&state, "proxy.reload", &method)?;
    let result = state.client.proxy_reload().await?;
    Ok(respond(result, false))
}

pub async fn proxy_version(
    State(state): State<SharedState>,
    method: Method,
) -> ApiResult<Response> {
    gate(&state, "proxy.version", &method)?;
    let result = state.client.proxy_version().await?;
    Ok(respond(result, false))
}

pub async fn proxy_logs(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    gate(&state, "proxy.logs", &method)?;
    let params = Params::new(query.as_deref(), &[]);
    let tail = state.config.clamp_tail(params.first("tail"));
    let result = state.client.proxy_logs(&kind, tail).await?;
    Ok(respond(result, false))
}

// ============================================================================
// fallback
// ============================================================================

pub async fn fallback(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
