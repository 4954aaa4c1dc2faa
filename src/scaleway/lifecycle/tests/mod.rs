//! Unit tests for Scaleway lifecycle helpers.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rstest::{fixture, rstest};
use scaleway_rs::{ScalewayApi, ScalewayImage};

use super::InstanceSnapshot;
use crate::ScalewayConfig;
use crate::backend::{Backend, FleetRequest, NodeState};
use crate::scaleway::types::{Action, InstanceId, InstanceState, Zone};
use crate::scaleway::{ScalewayBackend, ScalewayBackendError};

fn snapshot(
    id: impl Into<InstanceId>,
    state: impl Into<InstanceState>,
    allowed: impl IntoIterator<Item = impl Into<Action>>,
    public_ip: Option<&str>,
) -> InstanceSnapshot {
    InstanceSnapshot {
        id: id.into(),
        state: state.into(),
        allowed_actions: allowed.into_iter().map(Into::into).collect(),
        public_ip: public_ip.map(str::to_owned),
    }
}

#[derive(Copy, Clone)]
struct ImageSpec {
    id: &'static str,
    arch: &'static str,
    state: &'static str,
    creation_date: &'static str,
}

impl ImageSpec {
    const fn available(id: &'static str, creation_date: &'static str) -> Self {
        Self {
            id,
            arch: "x86_64",
            state: "available",
            creation_date,
        }
    }
}

fn image(spec: ImageSpec) -> ScalewayImage {
    ScalewayImage {
        id: spec.id.to_owned(),
        name: String::new(),
        arch: spec.arch.to_owned(),
        creation_date: spec.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: spec.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

#[fixture]
fn request() -> FleetRequest {
    FleetRequest::builder()
        .image_label("Ubuntu 24.04 Noble Numbat")
        .architecture("x86_64")
        .count(2)
        .instance_type("DEV1-S")
        .zone("fr-par-1")
        .project_id("proj")
        .name("bench")
        .build()
        .expect("valid request")
}

#[fixture]
fn backend() -> ScalewayBackend {
    ScalewayBackend {
        api: ScalewayApi::new("dummy"),
        config: ScalewayConfig {
            access_key: None,
            secret_key: String::from("dummy"),
            default_organization_id: None,
            default_project_id: String::from("proj"),
            default_zone: String::from("fr-par-1"),
            default_instance_type: String::from("DEV1-S"),
            default_image: String::from("Ubuntu 24.04 Noble Numbat"),
            default_architecture: String::from("x86_64"),
        },
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(5),
    }
}

#[rstest]
#[case("running", Some("51.15.0.7"), NodeState::Running, true)]
#[case("running", None, NodeState::Running, false)]
#[case("starting", Some("51.15.0.7"), NodeState::Pending, false)]
#[case("stopped", Some("not-an-ip"), NodeState::Pending, false)]
fn snapshot_maps_to_node(
    #[case] state: &str,
    #[case] ip: Option<&str>,
    #[case] expected_state: NodeState,
    #[case] ready: bool,
) {
    let node = snapshot("srv-1", state, Vec::<Action>::new(), ip).to_node("fr-par-1");
    assert_eq!(node.id, "srv-1");
    assert_eq!(node.zone, "fr-par-1");
    assert_eq!(node.state, expected_state);
    assert_eq!(node.is_ready(), ready);
}

#[test]
fn snapshot_parses_public_address() {
    let node = snapshot("srv-1", "running", Vec::<Action>::new(), Some("51.15.0.7"))
        .to_node("fr-par-1");
    assert_eq!(node.address, Some(IpAddr::V4(Ipv4Addr::new(51, 15, 0, 7))));
}

#[rstest]
fn create_payload_names_and_tags_server(request: FleetRequest) {
    let payload = ScalewayBackend::create_payload(&request, "img-1", 2);
    let json = serde_json::to_value(&payload).expect("serialise payload");
    assert_eq!(json["name"], "bench-2");
    assert_eq!(json["commercial_type"], "DEV1-S");
    assert_eq!(json["image"], "img-1");
    assert_eq!(json["project"], "proj");
    assert_eq!(json["tags"], serde_json::json!(["employ"]));
    assert!(json.get("security_group").is_none());
    assert!(json.get("organization").is_none());
}

#[rstest]
fn create_payload_carries_security_group(mut request: FleetRequest) {
    request.security_group = Some(String::from("sg-1"));
    let payload = ScalewayBackend::create_payload(&request, "img-1", 1);
    let json = serde_json::to_value(&payload).expect("serialise payload");
    assert_eq!(json["security_group"], "sg-1");
}

#[test]
fn tag_payload_adds_fleet_tag() {
    let payload = ScalewayBackend::tag_payload("bench", 3);
    assert_eq!(payload.name, "bench-3");
    assert_eq!(payload.tags, vec!["employ", "employ-fleet-bench"]);
}

#[rstest]
#[tokio::test]
async fn power_on_if_needed_returns_ok_for_running(backend: ScalewayBackend) {
    let snap = snapshot("id", "running", [Action::from("poweron")], Some("1.1.1.1"));
    let result = backend
        .power_on_if_needed(&Zone::from("fr-par-1"), &snap)
        .await;
    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn power_on_if_needed_errors_when_not_allowed(backend: ScalewayBackend) {
    let snap = snapshot("id", "stopped", Vec::<Action>::new(), None);
    let result = backend
        .power_on_if_needed(&Zone::from("fr-par-1"), &snap)
        .await;
    assert!(matches!(
        result,
        Err(ScalewayBackendError::PowerOnNotAllowed { ref instance_id, ref state })
            if instance_id == "id" && state == "stopped"
    ));
}

#[rstest]
#[tokio::test]
async fn create_batch_rejects_unknown_zone(backend: ScalewayBackend, mut request: FleetRequest) {
    request.zone = String::from("mars-1");
    let err = backend
        .create_batch(&request)
        .await
        .expect_err("unknown zone should fail");
    assert!(matches!(err, ScalewayBackendError::Validation(ref msg) if msg.contains("mars-1")));
}

#[rstest]
#[tokio::test]
async fn create_batch_rejects_zero_count(backend: ScalewayBackend, mut request: FleetRequest) {
    request.count = 0;
    let err = backend
        .create_batch(&request)
        .await
        .expect_err("empty batch should fail");
    assert_eq!(err, ScalewayBackendError::Validation(String::from("count")));
}

#[rstest]
#[tokio::test]
async fn empty_fleet_needs_no_api_calls(backend: ScalewayBackend) {
    assert_eq!(backend.refresh(&[]).await, Ok(Vec::new()));
    assert_eq!(backend.destroy(&[]).await, Ok(()));
}
