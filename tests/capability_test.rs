mod common;

use common::{EM_TOPIC, MemoryBus, TOPIC, charger_config, charger_config_with_em};
use elektra::charger::ChargerHandle;
use elektra::{Capability, ElektraError};

fn features_topic() -> String {
    format!("{}/info/features", TOPIC)
}

#[tokio::test]
async fn full_feature_set_attaches_all_capabilities() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(
        &features_topic(),
        r#"["evse","meter","meter_all_values","nfc"]"#,
    );
    bus.retain(
        &format!("{}/energy_manager/state", EM_TOPIC),
        r#"{"external_control":0}"#,
    );

    let handle = ChargerHandle::attach(bus.clone(), &charger_config_with_em())
        .await
        .unwrap();

    assert!(handle.has(Capability::Meter));
    assert!(handle.has(Capability::MeterEnergy));
    assert!(handle.has(Capability::PhaseCurrents));
    assert!(handle.has(Capability::PhaseVoltages));
    assert!(handle.has(Capability::Identify));
    assert!(handle.has(Capability::PhaseSwitch));
}

#[tokio::test]
async fn capabilities_follow_the_advertised_feature_list() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), r#"["evse","meter"]"#);

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert!(handle.has(Capability::Meter));
    assert!(handle.has(Capability::MeterEnergy));
    assert!(!handle.has(Capability::PhaseCurrents));
    assert!(!handle.has(Capability::PhaseVoltages));
    assert!(!handle.has(Capability::Identify));
    assert!(!handle.has(Capability::PhaseSwitch));
}

#[tokio::test]
async fn discovery_failure_degrades_to_base_contract() {
    let bus = MemoryBus::new();
    bus.alive();
    // info/features never published: the probe times out, attach succeeds

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert_eq!(handle.capabilities(), elektra::CapabilitySet::new());

    // The base contract still works; the probe consumed a full window,
    // so refresh the keepalive first
    bus.alive();
    bus.retain(
        &format!("{}/evse/external_current", TOPIC),
        r#"{"current":6000}"#,
    );
    assert!(handle.enabled().await.unwrap());
}

#[tokio::test]
async fn malformed_feature_list_degrades_to_base_contract() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), r#"{"not":"a list"}"#);

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert_eq!(handle.capabilities(), elektra::CapabilitySet::new());
}

#[tokio::test]
async fn phase_switch_not_attached_under_active_control() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), "[]");
    bus.retain(
        &format!("{}/energy_manager/state", EM_TOPIC),
        r#"{"external_control":1}"#,
    );

    let handle = ChargerHandle::attach(bus.clone(), &charger_config_with_em())
        .await
        .unwrap();

    assert!(!handle.has(Capability::PhaseSwitch));
}

#[tokio::test]
async fn phase_switch_omitted_when_state_read_fails() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), "[]");
    // Energy manager configured but silent: conservatively not exposed

    let handle = ChargerHandle::attach(bus.clone(), &charger_config_with_em())
        .await
        .unwrap();

    assert!(!handle.has(Capability::PhaseSwitch));
}

#[tokio::test]
async fn phase_switch_requires_configured_energy_manager() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), r#"["meter","meter_all_values","nfc"]"#);

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert!(!handle.has(Capability::PhaseSwitch));
}

#[tokio::test]
async fn gated_operations_fail_without_their_capability() {
    let bus = MemoryBus::new();
    bus.alive();
    // Retained device state exists, but no features were advertised;
    // gating must reject before any bus read
    bus.retain(
        &format!("{}/meter/values", TOPIC),
        r#"{"power":1000.0,"energy_abs":10.0}"#,
    );
    bus.retain(&format!("{}/meter/all_values", TOPIC), "[1,2,3,4,5,6]");

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert!(matches!(
        handle.current_power().await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
    assert!(matches!(
        handle.total_energy().await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
    assert!(matches!(
        handle.currents().await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
    assert!(matches!(
        handle.voltages().await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
    assert!(matches!(
        handle.identify().await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
    assert!(matches!(
        handle.set_phases(3).await.unwrap_err(),
        ElektraError::Unsupported { .. }
    ));
}

#[tokio::test]
async fn attached_operations_reach_the_device() {
    let bus = MemoryBus::new();
    bus.alive();
    bus.retain(&features_topic(), r#"["meter","meter_all_values","nfc"]"#);
    bus.retain(
        &format!("{}/meter/values", TOPIC),
        r#"{"power":11040.0,"energy_abs":250.75}"#,
    );
    bus.retain(
        &format!("{}/meter/all_values", TOPIC),
        "[231.0,230.0,229.0,16.0,16.0,16.0]",
    );
    bus.retain(
        &format!("{}/charge_tracker/current_charge", TOPIC),
        r#"{"authorization_info":{"tag_id":"aa:bb"}}"#,
    );

    let handle = ChargerHandle::attach(bus.clone(), &charger_config())
        .await
        .unwrap();

    assert!((handle.current_power().await.unwrap() - 11040.0).abs() < f64::EPSILON);
    assert!((handle.total_energy().await.unwrap() - 250.75).abs() < f64::EPSILON);
    assert_eq!(handle.voltages().await.unwrap(), [231.0, 230.0, 229.0]);
    assert_eq!(handle.identify().await.unwrap(), "aa:bb");
}
