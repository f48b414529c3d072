//! Unit name resolution: probe caching, TTL expiry and the compose-service
//! fallback, exercised directly against [`DockerClient`] so the clock can be
//! paused.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fail_result, ok_result, test_config, ScriptedRunner};
use dockgate::docker::resolve::RESOLVE_TTL;
use dockgate::docker::DockerClient;
use dockgate::ApiError;

#[tokio::test]
async fn repeat_resolution_within_ttl_probes_once() {
    tokio::time::pause();
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(ScriptedRunner::new());
    let client = DockerClient::new(runner.clone(), &test_config(dir.path()));

    for _ in 0..5 {
        let id = client.resolve("web").await.expect("resolve");
        assert_eq!(id, "web");
    }
    assert_eq!(runner.calls_containing("{{.Id}}"), 1, "{:?}", runner.calls());

    // Past the TTL the next resolution probes again.
    tokio::time::advance(RESOLVE_TTL + Duration::from_millis(1)).await;
    client.resolve("web").await.expect("resolve after expiry");
    assert_eq!(runner.calls_containing("{{.Id}}"), 2, "{:?}", runner.calls());
}

#[tokio::test]
async fn compose_service_resolves_to_concrete_unit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond("{{.Id}}", fail_result("", 1, "Error: No such object: app\n"))
            .respond("service=app", ok_result("", "app-1\napp-2\n")),
    );
    let client = DockerClient::new(runner.clone(), &test_config(dir.path()));

    let id = client.resolve("app").await.expect("resolve");
    assert_eq!(id, "app-1");

    // The concrete name was cached alongside the logical one, so neither
    // resolution costs another command.
    client.resolve("app").await.expect("logical again");
    client.resolve("app-1").await.expect("concrete");
    assert_eq!(runner.calls().len(), 2, "{:?}", runner.calls());
}

#[tokio::test]
async fn stopped_compose_service_found_on_second_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond("{{.Id}}", fail_result("", 1, "Error: No such object: db\n"))
            .respond("ps --filter", ok_result("", ""))
            .respond("ps -a --filter", ok_result("", "db-1\n")),
    );
    let client = DockerClient::new(runner.clone(), &test_config(dir.path()));

    let id = client.resolve("db").await.expect("resolve");
    assert_eq!(id, "db-1");
    assert_eq!(runner.calls().len(), 3, "{:?}", runner.calls());
}

#[tokio::test]
async fn invalid_names_are_rejected_without_probing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(ScriptedRunner::new());
    let client = DockerClient::new(runner.clone(), &test_config(dir.path()));

    for name in ["", "-web", "web;rm -rf /", "a b", "../etc"] {
        let err = client.resolve(name).await.expect_err(name);
        assert!(matches!(err, ApiError::InvalidInput(_)), "{name}: {err}");
    }
    assert!(runner.calls().is_empty(), "{:?}", runner.calls());
}

#[tokio::test]
async fn unknown_name_is_not_found_with_remediation_hint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond("{{.Id}}", fail_result("", 1, "Error: No such object: ghost\n"))
            .respond("--filter", ok_result("", "")),
    );
    let client = DockerClient::new(runner.clone(), &test_config(dir.path()));

    let err = client.resolve("ghost").await.expect_err("must not resolve");
    let ApiError::NotFound(msg) = err else {
        panic!("expected NotFound, got {err}");
    };
    assert!(msg.contains("ghost"), "{msg}");
    assert!(msg.contains("com.docker.compose.service"), "{msg}");
}
