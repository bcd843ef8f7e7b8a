//! Tests for convergent-resources: resource kinds driven through a Module

use convergent_core::{CascadeMode, EngineOptions, Error, Graph, Module, Resource};
use convergent_resources::*;
use std::sync::Arc;
use std::time::Duration;

fn fast() -> WaitPolicy {
    WaitPolicy {
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(1),
    }
}

fn stack(dir: &std::path::Path, mgr: &Arc<MemoryServiceManager>, version: &str) -> Graph {
    let conf = dir.join("app/app.conf");
    Graph::new()
        .with(
            "app-conf",
            File::new(&conf)
                .content(format!("version={version}\n"))
                .refreshing("app"),
        )
        .unwrap()
        .with(
            "app",
            Service::new("app", mgr.clone())
                .path("/usr/bin/app")
                .args(["--config", &conf.display().to_string()])
                .wait(fast())
                .requiring("app-conf"),
        )
        .unwrap()
}

// ===========================================================================
// File + Service
// ===========================================================================

#[test]
fn first_run_creates_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = Arc::new(MemoryServiceManager::new());

    let report = Module::new(stack(tmp.path(), &mgr, "1")).run().unwrap();

    assert_eq!(report.converged(), vec!["app-conf", "app"]);
    assert!(report.was_changed("app-conf"));
    assert!(report.was_changed("app"));
    assert_eq!(mgr.status_of("app"), Some(ServiceStatus::Running));
}

#[test]
fn second_run_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = Arc::new(MemoryServiceManager::new());
    Module::new(stack(tmp.path(), &mgr, "1")).run().unwrap();
    let ops_before = mgr.ops().len();

    let report = Module::new(stack(tmp.path(), &mgr, "1")).run().unwrap();

    assert!(report.is_unchanged());
    assert_eq!(mgr.ops().len(), ops_before);
}

#[test]
fn config_change_restarts_service_in_refresh_mode() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = Arc::new(MemoryServiceManager::new());
    Module::new(stack(tmp.path(), &mgr, "1")).run().unwrap();

    let options = EngineOptions::default().cascade(CascadeMode::Refresh);
    let report = Module::with_options(stack(tmp.path(), &mgr, "2"), options)
        .run()
        .unwrap();

    assert_eq!(report.changed(), vec!["app-conf"]);
    assert_eq!(report.refreshed(), vec!["app"]);
    assert_eq!(mgr.ops().last().map(String::as_str), Some("restart app"));
}

#[test]
fn config_change_reconverges_without_restart_in_converge_mode() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = Arc::new(MemoryServiceManager::new());
    Module::new(stack(tmp.path(), &mgr, "1")).run().unwrap();

    let report = Module::new(stack(tmp.path(), &mgr, "2")).run().unwrap();

    assert_eq!(report.changed(), vec!["app-conf"]);
    assert!(report.refreshed().is_empty());
    assert!(!mgr.ops().iter().any(|op| op.starts_with("restart")));
}

// ===========================================================================
// Exec
// ===========================================================================

#[cfg(unix)]
#[test]
fn exec_runs_after_its_requirement() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("in.txt");
    let output = tmp.path().join("out.txt");

    let graph = Graph::new()
        .with(
            "copy",
            Exec::new("cp")
                .args([input.display().to_string(), output.display().to_string()])
                .requiring("input"),
        )
        .unwrap()
        .with("input", File::new(&input).content("payload"))
        .unwrap();

    let report = Module::new(graph).run().unwrap();
    assert_eq!(report.converged(), vec!["input", "copy"]);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "payload");
}

#[cfg(unix)]
#[test]
fn failing_exec_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let later = tmp.path().join("later");

    let graph = Graph::new()
        .with("a-fail", Exec::shell("exit 7"))
        .unwrap()
        .with("b-file", File::new(&later))
        .unwrap();

    let err = Module::new(graph).run().unwrap_err();
    match err.root() {
        Error::CommandFailed { code, .. } => assert_eq!(*code, Some(7)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("a-fail"));
    assert!(!later.exists());
}

// ===========================================================================
// Backends
// ===========================================================================

#[test]
fn unsupported_backend_fails_with_unsupported() {
    let svc = Service::new("x", Arc::new(UnsupportedManager));
    assert!(matches!(svc.converge().unwrap_err(), Error::Unsupported(_)));
}

#[test]
fn seeded_memory_service_is_adopted() {
    let mgr = Arc::new(MemoryServiceManager::new());
    mgr.insert(
        ServiceDefinition {
            name: "db".into(),
            path: "/usr/bin/db".into(),
            args: vec![],
            description: "database".into(),
        },
        ServiceStatus::Running,
    );
    let svc = Service::new("db", mgr.clone())
        .path("/usr/bin/db")
        .description("database");
    assert!(!svc.converge().unwrap());
    assert!(mgr.ops().is_empty());
}
