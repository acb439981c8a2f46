//! A wired-but-unresponsive motor module: repeated bus timeouts must
//! escalate into a communication fault and a registry transition to
//! `Offline`, the way §4.4's staleness sweep is meant to catch a slave
//! that stops answering instead of leaving it Online forever.

use oht_common::consts::ADDRESS_MOTOR;
use oht_common::registry::SlaveStatus;
use oht_common::state::{FaultKind, SystemEvent, SystemState};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, fast_retry_config, motor_status, motor_status_block, shared_script, tick_until, SlaveScript};

#[test]
fn unresponsive_motor_escalates_to_offline_and_a_communication_fault() {
    let script = shared_script(SlaveScript {
        motor_status: Some(motor_status_block(motor_status::ENABLED, 0, 0, 0)),
        ..Default::default()
    });
    let mut orch = build_orchestrator(fast_retry_config(), script.clone());

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Idle);

    let registered = tick_until(&mut orch, 2, |o| {
        o.snapshot().slaves.iter().any(|s| s.address == ADDRESS_MOTOR && s.status == SlaveStatus::Online)
    });
    assert!(registered, "motor never registered online before going silent");

    // The slave stops answering.
    script.lock().unwrap().motor_unresponsive = true;

    // Jump simulated time far past the offline threshold (configured to
    // 50ms) without relying on real wall-clock sleeps, and keep ticking so
    // the round-robin re-polls the now-silent motor and the staleness
    // sweep gets a chance to run.
    let went_offline = tick_until(&mut orch, 1_000_000, |o| {
        o.snapshot().slaves.iter().any(|s| s.address == ADDRESS_MOTOR && s.status == SlaveStatus::Offline)
    });
    assert!(went_offline, "motor never transitioned to Offline after the offline threshold elapsed");

    // The `FaultDetected` event raised by the staleness sweep is queued
    // for the *next* tick (§4.9 step 2/3 runs before step 4); drain it.
    orch.tick(TickInputs { now_us: 2_000_000, estop_ch1: true, estop_ch2: true });

    let snapshot = orch.snapshot();
    assert_eq!(snapshot.fault, FaultKind::Communication);
    assert_eq!(snapshot.state, SystemState::Fault);
}
