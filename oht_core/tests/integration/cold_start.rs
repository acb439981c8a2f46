//! Cold start to idle: a power module answers identification on the bus
//! and the orchestrator walks Boot -> Init -> Idle with no faults raised.

use oht_common::consts::ADDRESS_POWER;
use oht_common::registry::SlaveStatus;
use oht_common::state::{FaultKind, SystemEvent, SystemState};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, fast_retry_config, healthy_battery_block, shared_script, tick_until, SlaveScript};

#[test]
fn cold_start_reaches_idle_with_the_power_module_online() {
    let script = shared_script(SlaveScript { power_battery: Some(healthy_battery_block()), ..Default::default() });
    let mut orch = build_orchestrator(fast_retry_config(), script);

    assert_eq!(orch.state(), SystemState::Boot);

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Init);

    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Idle);

    let power_online = tick_until(&mut orch, 2, |o| {
        o.snapshot().slaves.iter().any(|s| s.address == ADDRESS_POWER && s.status == SlaveStatus::Online)
    });
    assert!(power_online, "power module never registered online within the test deadline");

    let snapshot = orch.snapshot();
    assert_eq!(snapshot.state, SystemState::Idle);
    assert_eq!(snapshot.fault, FaultKind::None);
    assert_eq!(snapshot.slaves.len(), 1, "only the responding power module should be registered");
}
