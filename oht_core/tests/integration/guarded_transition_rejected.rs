//! A `MoveCmd` submitted while the move guard fails must be rejected: the
//! state machine stays in `Idle` and no move command ever reaches the
//! bus. `move_ready` is `safety_ok ∧ location_ok ∧ target_valid`; both
//! `safety_ok` (E-Stop held) and `location_ok`
//! (`CoreOrchestrator::set_location_ok`) are drivable from outside the
//! orchestrator, so this file covers the literal spec.md §8 scenario 5
//! (`location_ok == false`) as well as the E-Stop variant.

use oht_common::state::{SystemEvent, SystemState};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, fast_retry_config, motor_status, motor_status_block, shared_script, SlaveScript};

#[test]
fn move_cmd_is_rejected_while_location_is_not_ok() {
    let script = shared_script(SlaveScript {
        motor_status: Some(motor_status_block(motor_status::ENABLED, 0, 0, 0)),
        ..Default::default()
    });
    let mut orch = build_orchestrator(fast_retry_config(), script);

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Idle);

    orch.set_location_ok(false);
    orch.push_event(SystemEvent::MoveCmd { target_position: 500 });
    orch.tick(TickInputs { now_us: 2, estop_ch1: true, estop_ch2: true });

    assert_eq!(orch.state(), SystemState::Idle, "MoveCmd must be rejected while location_ok is false");
}

#[test]
fn move_cmd_is_rejected_while_the_safety_guard_is_down() {
    let script = shared_script(SlaveScript {
        motor_status: Some(motor_status_block(motor_status::ENABLED, 0, 0, 0)),
        ..Default::default()
    });
    let mut orch = build_orchestrator(fast_retry_config(), script);

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Idle);

    // Hold the E-Stop open, then submit a move command.
    orch.tick(TickInputs { now_us: 2, estop_ch1: false, estop_ch2: false });
    assert_eq!(orch.state(), SystemState::EStop, "opening both channels should itself force EStop");

    // Recreate the guard-down-but-not-yet-EStop instant isn't reachable
    // through the public channel inputs (the safety monitor and the move
    // guard both key off `safety_ok`), so assert the FSM's own EStop/Fault
    // transition — entered via exactly the same `safety_ok == false`
    // condition `move_ready` checks — already refuses motion: a `MoveCmd`
    // submitted on top of it is simply not a valid transition from
    // `EStop` and must be rejected rather than silently re-armed.
    orch.push_event(SystemEvent::MoveCmd { target_position: 500 });
    orch.tick(TickInputs { now_us: 3, estop_ch1: false, estop_ch2: false });
    assert_eq!(orch.state(), SystemState::EStop, "MoveCmd must never pull the FSM out of EStop");
}
