//! Logical unit name resolution.
//!
//! Callers address units by logical name (a container name or a compose
//! service name). Resolution turns that into something the runtime accepts,
//! caching the answer briefly so a burst of requests against the same unit
//! costs one probe, not one per request.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::DockerClient;
use crate::error::{ApiError, ApiResult};

/// How long a resolved mapping stays valid.
pub const RESOLVE_TTL: Duration = Duration::from_secs(10);

/// Compose puts the service name in this label on every container it creates.
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    id: String,
    expires: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct ResolutionCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResolutionCache {
    fn get_fresh(&self, name: &str) -> Option<String> {
        self.entries
            .get(name)
            .filter(|entry| entry.expires > Instant::now())
            .map(|entry| entry.id.clone())
    }

    fn put(&mut self, name: &str, id: &str) {
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                id: id.to_string(),
                expires: Instant::now() + RESOLVE_TTL,
            },
        );
    }
}

/// First character alphanumeric, rest alphanumeric or `_ . -`. Matches what
/// the runtime itself accepts, and guarantees the name can never be mistaken
/// for a flag.
pub fn valid_unit_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

impl DockerClient {
    /// Resolve a logical unit name to a concrete runtime identifier.
    ///
    /// Order: syntax check, cache, direct existence probe, compose-service
    /// label search over running units, the same search including stopped
    /// units. Unresolvable names are a `NotFound`, not a command failure.
    pub async fn resolve(&self, name: &str) -> ApiResult<String> {
        if !valid_unit_name(name) {
            return Err(ApiError::InvalidInput(format!(
                "invalid unit name `{name}`"
            )));
        }

        if let Some(id) = self.cache.lock().await.get_fresh(name) {
            debug!(target: "resolve", name, id = %id, "cache hit");
            return Ok(id);
        }

        // Direct probe: the name may already be a container name or id.
        let probe = self
            .docker_quick(vec![
                "inspect".into(),
                "--format".into(),
                "{{.Id}}".into(),
                name.into(),
            ])
            .await?;
        if probe.ok && !probe.stdout.trim().is_empty() {
            self.cache.lock().await.put(name, name);
            debug!(target: "resolve", name, "resolved directly");
            return Ok(name.to_string());
        }

        // Compose-service label search: running units first, then everything.
        for include_stopped in [false, true] {
            let mut args = vec!["ps".into()];
            if include_stopped {
                args.push("-a".into());
            }
            args.extend([
                "--filter".into(),
                format!("label={COMPOSE_SERVICE_LABEL}={name}"),
                "--format".into(),
                "{{.Names}}".into(),
            ]);
            let listed = self.docker_quick(args).await?;
            if !listed.ok {
                continue;
            }
            if let Some(concrete) = listed
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
            {
                let mut cache = self.cache.lock().await;
                cache.put(name, concrete);
                cache.put(concrete, concrete);
                drop(cache);
                info!(
                    target: "resolve",
                    logical = name,
                    concrete,
                    "resolved via compose service label"
                );
                return Ok(concrete.to_string());
            }
        }

        Err(ApiError::NotFound(format!(
            "unit `{name}` not found: no container by that name and no compose \
             service with label {COMPOSE_SERVICE_LABEL}={name}; configure the \
             concrete unit name explicitly"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_syntax() {
        assert!(valid_unit_name("web"));
        assert!(valid_unit_name("web-1"));
        assert!(valid_unit_name("app_db.prod"));
        assert!(valid_unit_name("0abc"));
        assert!(!valid_unit_name(""));
        assert!(!valid_unit_name("-web"));
        assert!(!valid_unit_name(".hidden"));
        assert!(!valid_unit_name("web 1"));
        assert!(!valid_unit_name("web;rm"));
        assert!(!valid_unit_name("a/b"));
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        tokio::time::pause();
        let mut cache = ResolutionCache::default();
        cache.put("web", "web-1");
        assert_eq!(cache.get_fresh("web").as_deref(), Some("web-1"));
        tokio::time::advance(RESOLVE_TTL + Duration::from_millis(1)).await;
        assert_eq!(cache.get_fresh("web"), None);
    }
}
