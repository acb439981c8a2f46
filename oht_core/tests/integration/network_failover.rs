//! Ethernet degrades, WiFi takes over, Ethernet recovers and is restored
//! (§8 scenario 4). Driven straight through `LinkManager` via
//! `record_network_health` rather than the tick-period round robin, the
//! same way the unit scenario in `network/link.rs` exercises it, so the
//! test isn't at the mercy of which interface `poll_one_interface`'s
//! round robin happens to land on this tick.

use oht_common::consts::DEFAULT_HEALTH_CHECK_INTERVAL_MS;
use oht_common::network::{InterfaceKind, InterfacePriority};
use oht_common::state::SystemEvent;
use oht_core::config::{CoreConfig, NetworkInterfaceConfig};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, shared_script, SlaveScript};

fn config_with_both_interfaces() -> CoreConfig {
    let mut config = oht_core_test_config();
    config.network.interfaces = vec![
        network_interface_config("eth0", InterfaceKind::Ethernet, InterfacePriority::Primary),
        network_interface_config("wlan0", InterfaceKind::WiFi, InterfacePriority::Secondary),
    ];
    config
}

fn network_interface_config(id: &str, kind: InterfaceKind, priority: InterfacePriority) -> NetworkInterfaceConfig {
    NetworkInterfaceConfig { id: id.to_string(), kind, priority, enabled: true }
}

fn oht_core_test_config() -> CoreConfig {
    let toml_str = r#"
[shared]
service_name = "oht_core_test"

[bus]
max_retries = 0
"#;
    toml::from_str(toml_str).unwrap()
}

#[test]
fn ethernet_failure_fails_over_to_wifi_and_restores_on_recovery() {
    let script = shared_script(SlaveScript::default());
    let mut orch = build_orchestrator(config_with_both_interfaces(), script);

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });

    orch.record_network_health("eth0", 95, 0);
    orch.record_network_health("wlan0", 90, 0);
    assert_eq!(orch.snapshot().active_interface.as_deref(), Some("eth0"));

    // Ethernet carrier loss: sustained low health trips the failover.
    let mut now = 0u64;
    for _ in 0..4 {
        now += DEFAULT_HEALTH_CHECK_INTERVAL_MS * 1_000;
        orch.record_network_health("eth0", 10, now);
        orch.record_network_health("wlan0", 90, now);
    }
    assert_eq!(orch.snapshot().active_interface.as_deref(), Some("wlan0"));

    // Ethernet recovers and sustains long enough to be restored.
    for _ in 0..4 {
        now += DEFAULT_HEALTH_CHECK_INTERVAL_MS * 1_000;
        orch.record_network_health("eth0", 95, now);
    }
    assert_eq!(orch.snapshot().active_interface.as_deref(), Some("eth0"));
}
