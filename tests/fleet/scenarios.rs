//! BDD scenarios for fleet runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{FleetContext, fleet_context};

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Collect one outcome per node"
)]
fn scenario_collect_outcomes(fleet_context: FleetContext) {
    let _ = fleet_context;
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Tear down every node when one never becomes reachable"
)]
fn scenario_unreachable_node(fleet_context: FleetContext) {
    let _ = fleet_context;
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Skip aggregation when a node fails"
)]
fn scenario_failing_node(fleet_context: FleetContext) {
    let _ = fleet_context;
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Reject a short batch without opening sessions"
)]
fn scenario_short_batch(fleet_context: FleetContext) {
    let _ = fleet_context;
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Run the setup script before the command"
)]
fn scenario_setup_script(fleet_context: FleetContext) {
    let _ = fleet_context;
}
