//! E-Stop asserted while the hoist is moving: the safety monitor must win
//! the tick regardless of what the state machine or control loop were
//! doing, transitioning to `EStop` within the next couple of ticks and
//! latching the trigger count.

use oht_common::state::{SystemEvent, SystemState};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, fast_retry_config, motor_status, motor_status_block, shared_script, SlaveScript};

#[test]
fn estop_during_move_halts_within_two_ticks() {
    let script = shared_script(SlaveScript {
        motor_status: Some(motor_status_block(motor_status::ENABLED, 0, 0, 0)),
        ..Default::default()
    });
    let mut orch = build_orchestrator(fast_retry_config(), script);
    let safe = TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true };

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(safe);
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, ..safe });
    assert_eq!(orch.state(), SystemState::Idle);

    orch.push_event(SystemEvent::MoveCmd { target_position: 1_000 });
    orch.tick(TickInputs { now_us: 2, ..safe });
    assert_eq!(orch.state(), SystemState::Move);

    // Run a few more safe ticks to represent the 100ms of motion before
    // the operator hits the button (§8 scenario 2).
    for tick in 3..13 {
        orch.tick(TickInputs { now_us: tick, ..safe });
    }
    assert_eq!(orch.state(), SystemState::Move);
    assert!(orch.snapshot().safety.is_safe());

    // Channel 1 opens. The safety monitor must react within two ticks.
    orch.tick(TickInputs { now_us: 13, estop_ch1: false, estop_ch2: false });
    if orch.state() != SystemState::EStop {
        orch.tick(TickInputs { now_us: 14, estop_ch1: false, estop_ch2: false });
    }

    assert_eq!(orch.state(), SystemState::EStop);
    let safety = orch.snapshot().safety;
    assert!(!safety.is_safe());
    assert_eq!(safety.trigger_count, 1);
}
