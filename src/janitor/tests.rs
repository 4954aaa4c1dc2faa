//! Unit tests for the janitor module.

use super::*;
use crate::test_support::{ScriptedRunner, json_servers};
use rstest::rstest;

fn config(fleet: Option<&str>) -> JanitorConfig {
    JanitorConfig::new("project", fleet.map(str::to_owned), DEFAULT_SCW_BIN).expect("config")
}

#[rstest]
#[case("project_id", " ", None, DEFAULT_SCW_BIN)]
#[case("fleet_name", "proj", Some(" "), DEFAULT_SCW_BIN)]
#[case("scw_bin", "proj", None, "  ")]
fn janitor_config_rejects_blank_fields(
    #[case] expected_field: &str,
    #[case] project_id: &str,
    #[case] fleet_name: Option<&str>,
    #[case] scw_bin: &str,
) {
    let err = JanitorConfig::new(project_id, fleet_name.map(str::to_owned), scw_bin)
        .expect_err("expected invalid config");
    assert_eq!(
        err,
        JanitorError::InvalidConfig {
            field: expected_field.to_owned()
        }
    );
}

#[rstest]
#[case(Some("bench"), &["employ", "employ-fleet-bench"], true)]
#[case(Some("bench"), &["employ", "employ-fleet-other"], false)]
#[case(None, &["employ", "employ-fleet-other"], true)]
#[case(None, &["employ"], false)]
#[case(None, &[], false)]
fn config_matches_fleet_tags(
    #[case] fleet: Option<&str>,
    #[case] tags: &[&str],
    #[case] expected: bool,
) {
    let owned = tags.iter().map(|tag| (*tag).to_owned()).collect::<Vec<_>>();
    assert_eq!(config(fleet).matches(&owned), expected);
}

#[rstest]
fn sweep_deletes_only_tagged_servers() {
    let runner = ScriptedRunner::new();
    runner.push_output(
        Some(0),
        json_servers(&[
            ("srv-a", "fr-par-1", &["employ", "employ-fleet-bench"]),
            ("srv-b", "fr-par-2", &["employ", "employ-fleet-bench"]),
            ("srv-c", "fr-par-1", &["unrelated"]),
        ]),
        "",
    );
    runner.push_success();
    runner.push_success();
    runner.push_output(
        Some(0),
        json_servers(&[("srv-c", "fr-par-1", &["unrelated"])]),
        "",
    );

    let janitor = Janitor::new(config(Some("bench")), runner.clone());
    let summary = janitor.sweep().expect("sweep should succeed");
    assert_eq!(summary.deleted_servers, vec!["srv-a", "srv-b"]);

    let commands = runner
        .invocations()
        .iter()
        .map(crate::test_support::CommandInvocation::command_string)
        .collect::<Vec<_>>();
    assert_eq!(
        commands,
        vec![
            "scw instance server list project-id=project zone=all -o json",
            "scw instance server delete srv-a zone=fr-par-1 with-ip=true with-volumes=all force-shutdown=true --wait",
            "scw instance server delete srv-b zone=fr-par-2 with-ip=true with-volumes=all force-shutdown=true --wait",
            "scw instance server list project-id=project zone=all -o json",
        ]
    );
}

#[rstest]
fn sweep_errors_when_tagged_servers_remain() {
    let runner = ScriptedRunner::new();
    let stuck = json_servers(&[("srv-a", "fr-par-1", &["employ-fleet-bench"])]);
    runner.push_output(Some(0), stuck.clone(), "");
    runner.push_success();
    runner.push_output(Some(0), stuck, "");

    let janitor = Janitor::new(config(None), runner);
    let err = janitor.sweep().expect_err("sweep should fail");
    assert_eq!(
        err,
        JanitorError::NotClean {
            remaining: String::from("srv-a")
        }
    );
}

#[rstest]
fn sweep_surfaces_scw_failures() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(1), "", "permission denied\n");

    let janitor = Janitor::new(config(None), runner);
    let err = janitor.sweep().expect_err("sweep should fail");
    assert_eq!(
        err,
        JanitorError::CommandFailure {
            program: String::from("scw"),
            status: Some(1),
            status_text: String::from("1"),
            stderr: String::from("permission denied"),
        }
    );
}

#[rstest]
fn sweep_rejects_unparseable_output() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "not json", "");

    let janitor = Janitor::new(config(None), runner);
    let err = janitor.sweep().expect_err("sweep should fail");
    assert!(matches!(err, JanitorError::Parse { .. }));
}

#[rstest]
fn sweep_with_nothing_tagged_deletes_nothing() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "[]", "");
    runner.push_output(Some(0), "[]", "");

    let janitor = Janitor::new(config(None), runner.clone());
    let summary = janitor.sweep().expect("sweep should succeed");
    assert!(summary.deleted_servers.is_empty());
    assert_eq!(runner.invocations().len(), 2);
}
