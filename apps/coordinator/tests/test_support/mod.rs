//! Shared setup for coordinator tests: configs pointing at a mock Spine or
//! the sandbox.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use eps_coordinator::{Config, Coordinator};
use wiremock::MockServer;

pub const PARENT_PRESCRIPTION: &str = "PORX_IN020101SM31";
pub const CANCEL_REQUEST: &str = "PORX_IN030101SM32";
pub const NOMINATED_RELEASE_REQUEST: &str = "PORX_IN060102SM30";
/// Routed, but not something the sandbox simulates.
pub const UNSIMULATED: &str = "QURX_IN000005UK99";

pub const PAYLOAD: &str = r#"<PORX_IN020101SM31 xmlns="urn:hl7-org:v3"><id root="ABC"/></PORX_IN020101SM31>"#;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture should exist")
}

pub fn config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.spine.base_url = base_url.to_string();
    config.spine.from_party_key = "T141D-822234".to_string();
    config.spine.from_asid = "200000001285".to_string();
    config.spine.cpa_id_map = format!(
        r#"[["{PARENT_PRESCRIPTION}","S20000A000086"],["{CANCEL_REQUEST}","S20001A000100"],["{NOMINATED_RELEASE_REQUEST}","S20001A000182"],["{UNSIMULATED}","S20001A000999"],["PORX_IN100101SM31","S20001A000182"]]"#
    );
    config.spine.timeout_secs = 5;
    config.polling.interval_ms = 5;
    config.polling.max_attempts = 3;
    config.polling.deadline_secs = 5;
    config
}

pub fn live_coordinator(server: &MockServer) -> Coordinator {
    Coordinator::from_config(&config(&server.uri())).expect("valid config")
}

pub fn sandbox_coordinator() -> Coordinator {
    let mut config = config("https://spine.example.nhs.uk/");
    config.spine.sandbox = true;
    Coordinator::from_config(&config).expect("valid config")
}
