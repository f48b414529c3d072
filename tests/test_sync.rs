//! Shadow backend reconciliation end to end: overlay status JSON in, backend
//! files and proxy reload commands out, including rollback on a failed
//! reload.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{
    fail_result, ip, mesh_status_json, ok_result, test_config, ScriptedRunner,
};
use dockgate::docker::DockerClient;
use dockgate::shadow::{Reconciler, SyncOutcome};

fn reconciler(dir: &Path, runner: Arc<ScriptedRunner>) -> Reconciler {
    let config = test_config(dir);
    let client = Arc::new(DockerClient::new(runner, &config));
    Reconciler::new(client, &config)
}

fn seed(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("seed backend file");
}

fn read_dir_sorted(dir: &Path) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = std::fs::read_dir(dir)
        .expect("read shadow dir")
        .map(|e| {
            let e = e.expect("dir entry");
            let name = e.file_name().to_string_lossy().into_owned();
            let content = std::fs::read_to_string(e.path()).expect("read backend");
            (name, content)
        })
        .collect();
    entries.sort();
    entries
}

#[tokio::test]
async fn first_cycle_writes_online_peers_and_reloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let status = mesh_status_json(
        "100.64.0.1",
        &[
            ("100.64.0.2", true),
            ("100.64.0.5", true),
            ("100.64.0.9", false),
        ],
    );
    let runner = Arc::new(
        ScriptedRunner::new().respond("tailscale status --json", ok_result("", &status)),
    );
    let rec = reconciler(dir.path(), runner.clone());

    let outcome = rec.run_once().await;
    assert_eq!(
        outcome,
        SyncOutcome::Applied {
            added: 2,
            removed: 0
        }
    );

    // Online peers only; the self node and the offline peer are absent.
    let entries = read_dir_sorted(dir.path());
    assert_eq!(
        entries,
        vec![
            (
                "100.64.0.2.conf".to_string(),
                "server 100.64.0.2:443 max_fails=2 fail_timeout=10s;\n".to_string()
            ),
            (
                "100.64.0.5.conf".to_string(),
                "server 100.64.0.5:443 max_fails=2 fail_timeout=10s;\n".to_string()
            ),
        ]
    );
    assert_eq!(runner.calls_containing("nginx -t"), 1);
    assert_eq!(runner.calls_containing("nginx -s reload"), 1);

    let status = rec.status().await;
    assert_eq!(status.runs, 1);
    assert_eq!(status.failures, 0);
    assert_eq!(status.last_result.as_deref(), Some("applied +2 -0"));
    assert!(status.last_success.is_some());
}

#[tokio::test]
async fn membership_change_adds_and_removes_exactly_the_difference() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(
        dir.path(),
        "10.0.0.2.conf",
        "server 10.0.0.2:443 max_fails=2 fail_timeout=10s;\n",
    );
    seed(
        dir.path(),
        "10.0.0.5.conf",
        "server 10.0.0.5:443 max_fails=2 fail_timeout=10s;\n",
    );

    let status = mesh_status_json("100.64.0.1", &[("10.0.0.5", true), ("10.0.0.10", true)]);
    let runner = Arc::new(
        ScriptedRunner::new().respond("tailscale status --json", ok_result("", &status)),
    );
    let rec = reconciler(dir.path(), runner.clone());

    let outcome = rec.run_once().await;
    assert_eq!(
        outcome,
        SyncOutcome::Applied {
            added: 1,
            removed: 1
        }
    );
    let names: Vec<String> = read_dir_sorted(dir.path())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["10.0.0.10.conf", "10.0.0.5.conf"]);
}

#[tokio::test]
async fn failed_reload_restores_previous_files_byte_for_byte() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Hand-edited content must survive the rollback verbatim, tuning and all.
    let original = "server 10.1.0.2:443 max_fails=7 fail_timeout=90s; # tuned\n";
    seed(dir.path(), "10.1.0.2.conf", original);

    let status = mesh_status_json("100.64.0.1", &[("10.1.0.2", true), ("10.1.0.3", true)]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .respond("tailscale status --json", ok_result("", &status))
            .respond(
                "nginx -s reload",
                fail_result("", 1, "nginx: [error] invalid PID number\n"),
            ),
    );
    let rec = reconciler(dir.path(), runner.clone());

    let outcome = rec.run_once().await;
    let SyncOutcome::Failed(msg) = outcome else {
        panic!("expected failure, got {outcome}");
    };
    assert!(msg.contains("proxy reload failed"), "{msg}");

    let entries = read_dir_sorted(dir.path());
    assert_eq!(
        entries,
        vec![("10.1.0.2.conf".to_string(), original.to_string())]
    );

    let status = rec.status().await;
    assert_eq!(status.failures, 1);
    assert_eq!(status.last_result.as_deref(), Some("failed"));
    assert!(
        status.last_error.as_deref().unwrap_or("").contains("reload"),
        "{:?}",
        status.last_error
    );
}

#[tokio::test]
async fn unreadable_status_fails_without_touching_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(
        dir.path(),
        "10.2.0.2.conf",
        "server 10.2.0.2:443 max_fails=2 fail_timeout=10s;\n",
    );
    let runner = Arc::new(
        ScriptedRunner::new().respond("tailscale status --json", ok_result("", "no json here")),
    );
    let rec = reconciler(dir.path(), runner.clone());

    let outcome = rec.run_once().await;
    let SyncOutcome::Failed(msg) = outcome else {
        panic!("expected failure, got {outcome}");
    };
    assert!(msg.contains("parsing overlay network status"), "{msg}");

    let names: Vec<String> = read_dir_sorted(dir.path())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["10.2.0.2.conf"]);
    assert_eq!(runner.calls_containing("nginx"), 0, "{:?}", runner.calls());
}

#[tokio::test]
async fn plan_reports_the_diff_without_applying_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed(
        dir.path(),
        "10.3.0.2.conf",
        "server 10.3.0.2:443 max_fails=2 fail_timeout=10s;\n",
    );
    let status = mesh_status_json("100.64.0.1", &[("10.3.0.3", true)]);
    let runner = Arc::new(
        ScriptedRunner::new().respond("tailscale status --json", ok_result("", &status)),
    );
    let rec = reconciler(dir.path(), runner.clone());

    let plan = rec.plan().await.expect("plan");
    assert_eq!(plan.current, 1);
    assert!(plan.desired.contains_key(&ip("10.3.0.3")));
    assert_eq!(plan.diff.added, [ip("10.3.0.3")].into_iter().collect());
    assert_eq!(plan.diff.removed, [ip("10.3.0.2")].into_iter().collect());

    // Nothing was written, removed, or reloaded.
    let names: Vec<String> = read_dir_sorted(dir.path())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["10.3.0.2.conf"]);
    assert_eq!(runner.calls_containing("nginx"), 0);
}
