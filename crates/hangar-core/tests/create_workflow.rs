//! End-to-end create workflow tests against scripted tools.

use std::sync::Arc;
use std::time::Duration;

use hangar_core::testing::{errors, ScriptedConfigTool, ScriptedInfraTool, TempWorkspace};
use hangar_core::{ClusterRegistry, Orchestrator, OrchestratorError, RetryPolicy};
use hangar_proto::{ClusterDefinition, ClusterStatus, ToolError, ToolResult, WorkspaceManager};

fn orchestrator(
    limit: usize,
    infra: ScriptedInfraTool,
    provisioner: ScriptedConfigTool,
) -> (Arc<Orchestrator>, Arc<ScriptedInfraTool>, Arc<ScriptedConfigTool>, Arc<TempWorkspace>) {
    let infra = Arc::new(infra);
    let provisioner = Arc::new(provisioner);
    let workspace = Arc::new(TempWorkspace::new().unwrap());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ClusterRegistry::new(limit)),
        Arc::clone(&workspace) as _,
        Arc::clone(&infra) as _,
        Arc::clone(&provisioner) as _,
        RetryPolicy::new(3, Duration::ZERO),
        RetryPolicy::new(3, Duration::ZERO),
    ));
    (orchestrator, infra, provisioner, workspace)
}

fn definition() -> ClusterDefinition {
    ClusterDefinition::from_yaml("spec:\n  template: demo\n").unwrap()
}

fn descriptions(cluster: &hangar_proto::Cluster) -> Vec<String> {
    cluster
        .events()
        .into_iter()
        .map(|event| event.description)
        .collect()
}

#[tokio::test]
async fn happy_path_reaches_running_with_ordered_events() {
    let (orchestrator, infra, provisioner, _workspace) =
        orchestrator(10, ScriptedInfraTool::new(), ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    // The synchronous part stops at the working directory.
    assert_eq!(cluster.status(), ClusterStatus::WorkingDirCreated);

    orchestrator.wait_for(cluster.id()).await;
    assert_eq!(cluster.status(), ClusterStatus::Running);
    assert_eq!(infra.calls(), vec!["init", "plan", "apply"]);
    assert_eq!(provisioner.calls(), vec!["provision"]);

    let events = descriptions(&cluster);
    let expected_order = [
        "Cluster creation started.",
        "Cluster definition accepted.",
        "Infrastructure init started.",
        "Infrastructure init successful.",
        "Infrastructure plan started.",
        "Infrastructure plan successful.",
        "Infrastructure apply started.",
        "Infrastructure apply successful.",
        "Provisioning started.",
        "Provisioning successful.",
        "Cluster up and running.",
    ];
    let mut cursor = 0;
    for needle in expected_order {
        let position = events[cursor..]
            .iter()
            .position(|event| event == needle)
            .unwrap_or_else(|| panic!("missing event '{needle}' after index {cursor}"));
        cursor += position + 1;
    }
    // Elapsed seconds never decrease across the log.
    let elapsed: Vec<i64> = cluster.events().iter().map(|e| e.elapsed_seconds).collect();
    assert!(elapsed.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn plan_changes_present_is_advisory() {
    let infra = ScriptedInfraTool::new().script_plan(vec![Ok(ToolResult::ChangesPresent)]);
    let (orchestrator, infra, _provisioner, _workspace) =
        orchestrator(10, infra, ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::Running);
    assert_eq!(infra.call_count("plan"), 1);
    assert!(descriptions(&cluster)
        .iter()
        .any(|event| event == "Infrastructure plan reports pending changes."));
}

#[tokio::test]
async fn transient_failures_are_retried_with_try_events() {
    let infra = ScriptedInfraTool::new().script_init(errors(2));
    let (orchestrator, infra, _provisioner, _workspace) =
        orchestrator(10, infra, ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::Running);
    assert_eq!(infra.call_count("init"), 3);
    let events = descriptions(&cluster);
    assert!(events.iter().any(|e| e == "Infrastructure init started (try #2)."));
    assert!(events.iter().any(|e| e == "Infrastructure init started (try #3)."));
}

#[tokio::test]
async fn init_failure_cleans_workdir_without_destroy() {
    let infra = ScriptedInfraTool::new().script_init(errors(3));
    let (orchestrator, infra, provisioner, workspace) =
        orchestrator(10, infra, ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::InfraInitFailed);
    // No resources existed yet, so no compensating teardown.
    assert_eq!(infra.call_count("destroy"), 0);
    assert_eq!(provisioner.call_count("deprovision"), 0);
    assert_eq!(workspace.cleaned(), vec![workspace.directory(cluster.id())]);

    let events = descriptions(&cluster);
    assert!(events
        .iter()
        .any(|e| e == "Infrastructure init failed with result ERROR after 3 tries."));
    assert!(events.iter().any(|e| e == "Working directory cleaned up."));
}

#[tokio::test]
async fn apply_failure_triggers_compensating_teardown() {
    let infra = ScriptedInfraTool::new().script_apply(errors(3));
    let (orchestrator, infra, provisioner, workspace) =
        orchestrator(10, infra, ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    // Status was set before cleanup and stays put.
    assert_eq!(cluster.status(), ClusterStatus::InfraApplyFailed);
    assert_eq!(infra.call_count("apply"), 3);
    // Single-attempt, best-effort teardown.
    assert_eq!(infra.call_count("destroy"), 1);
    assert_eq!(provisioner.call_count("deprovision"), 1);
    assert_eq!(provisioner.call_count("provision"), 0);
    assert_eq!(workspace.cleaned().len(), 1);
}

#[tokio::test]
async fn failed_teardown_does_not_change_status() {
    let infra = ScriptedInfraTool::new()
        .script_apply(errors(3))
        .script_destroy(errors(1));
    let provisioner = ScriptedConfigTool::new().script_deprovision(errors(1));
    let (orchestrator, _infra, _provisioner, _workspace) = orchestrator(10, infra, provisioner);

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::InfraApplyFailed);
    let events = descriptions(&cluster);
    assert!(events
        .iter()
        .any(|e| e == "Infrastructure destroy failed with result ERROR."));
}

#[tokio::test]
async fn provisioning_failure_also_tears_down() {
    let provisioner = ScriptedConfigTool::new().script_provision(errors(3));
    let (orchestrator, infra, _provisioner, _workspace) =
        orchestrator(10, ScriptedInfraTool::new(), provisioner);

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::ConfigProvisioningFailed);
    assert_eq!(infra.call_count("destroy"), 1);
}

#[tokio::test]
async fn spawn_fault_is_fatal_and_not_retried() {
    let infra = ScriptedInfraTool::new().script_init(vec![Err(ToolError::Spawn {
        program: "terraform".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
    })]);
    let (orchestrator, infra, _provisioner, _workspace) =
        orchestrator(10, infra, ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::InfraInitFailed);
    assert_eq!(infra.call_count("init"), 1);
    assert!(descriptions(&cluster)
        .iter()
        .any(|e| e.starts_with("Infrastructure init aborted:")));
}

#[tokio::test]
async fn malformed_definition_has_no_side_effects() {
    let (orchestrator, infra, _provisioner, workspace) =
        orchestrator(10, ScriptedInfraTool::new(), ScriptedConfigTool::new());

    let unknown_template = ClusterDefinition::from_yaml("spec:\n  template: missing\n").unwrap();
    let err = orchestrator.create(&unknown_template).unwrap_err();
    assert!(matches!(err, OrchestratorError::Workspace(_)));
    assert!(orchestrator.list(None).is_empty());
    assert!(infra.calls().is_empty());
    assert!(!workspace.directory(hangar_proto::ClusterId::random()).exists());
}

#[tokio::test]
async fn limit_reached_rejects_without_side_effects() {
    let (orchestrator, _infra, _provisioner, _workspace) =
        orchestrator(1, ScriptedInfraTool::new(), ScriptedConfigTool::new());

    let first = orchestrator.create(&definition()).unwrap();

    let err = orchestrator.create(&definition()).unwrap_err();
    assert!(matches!(err, OrchestratorError::LimitReached { limit: 1 }));
    assert_eq!(orchestrator.list(None).len(), 1);

    orchestrator.wait_for(first.id()).await;
    assert_eq!(first.status(), ClusterStatus::Running);
    // A running cluster still counts against the limit.
    assert!(orchestrator.create(&definition()).is_err());
}

#[tokio::test]
async fn settle_delay_is_recorded_between_apply_and_provisioning() {
    let (orchestrator, _infra, _provisioner, _workspace) =
        orchestrator(10, ScriptedInfraTool::new(), ScriptedConfigTool::new());

    // Zero minutes parses but must not produce a wait event.
    let definition =
        ClusterDefinition::from_yaml("spec:\n  template: demo\n  wait_after_apply: 0\n").unwrap();
    let cluster = orchestrator.create(&definition).unwrap();
    orchestrator.wait_for(cluster.id()).await;

    assert_eq!(cluster.status(), ClusterStatus::Running);
    assert!(!descriptions(&cluster)
        .iter()
        .any(|e| e.starts_with("Waiting")));
}

#[tokio::test]
async fn get_and_list_reflect_committed_state_only() {
    let (orchestrator, _infra, _provisioner, _workspace) =
        orchestrator(10, ScriptedInfraTool::new(), ScriptedConfigTool::new());

    let cluster = orchestrator.create(&definition()).unwrap();
    let id = cluster.id();
    // Repeated reads never mutate anything.
    for _ in 0..5 {
        let fetched = orchestrator.get(id).unwrap();
        let snapshot = fetched.snapshot();
        assert_eq!(snapshot.events.len(), fetched.events().len());
    }
    orchestrator.wait_for(id).await;

    assert_eq!(
        orchestrator
            .list(Some(&[ClusterStatus::Running]))
            .first()
            .map(|c| c.id()),
        Some(id)
    );
    assert!(orchestrator.get(hangar_proto::ClusterId::random()).is_none());
}
