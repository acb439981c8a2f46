//! A latched channel-mismatch fault (§4.6 Open Question: fatal until
//! explicit clear) must hold `EStop` even once the two channels re-agree
//! on their own, and only release back to `Idle` once the operator calls
//! `clear_estop_fault` followed by an explicit `EStopReset` — never as a
//! side effect of the channels simply agreeing again.

use oht_common::safety::EstopState;
use oht_common::state::{FaultKind, SystemEvent, SystemState};
use oht_core::orchestrator::TickInputs;

use super::common::{build_orchestrator, fast_retry_config, shared_script, SlaveScript};

#[test]
fn channel_mismatch_fault_is_fatal_until_explicitly_cleared() {
    let script = shared_script(SlaveScript::default());
    let mut orch = build_orchestrator(fast_retry_config(), script);

    orch.push_event(SystemEvent::BootComplete);
    orch.tick(TickInputs { now_us: 0, estop_ch1: true, estop_ch2: true });
    orch.push_event(SystemEvent::InitComplete);
    orch.tick(TickInputs { now_us: 1, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::Idle);

    // Channel 1 trips while channel 2 stays closed, and the disagreement
    // outlasts the 50ms debounce window.
    orch.tick(TickInputs { now_us: 2, estop_ch1: true, estop_ch2: false });
    orch.tick(TickInputs { now_us: 60_000, estop_ch1: true, estop_ch2: false });

    assert_eq!(orch.state(), SystemState::EStop);
    assert_eq!(orch.snapshot().safety.estop_state, EstopState::Fault);

    // Channels re-agree, but the latch must not clear itself.
    orch.tick(TickInputs { now_us: 120_000, estop_ch1: true, estop_ch2: true });
    assert_eq!(orch.state(), SystemState::EStop);
    assert_eq!(orch.snapshot().safety.estop_state, EstopState::Fault);

    // The operator explicitly clears the hardware fault, then confirms
    // the E-Stop reset; only then does the FSM return to Idle.
    orch.clear_estop_fault(121_000).expect("channels agree, clear should succeed");
    assert_eq!(orch.snapshot().safety.estop_state, EstopState::Safe);

    orch.push_event(SystemEvent::EStopReset);
    orch.tick(TickInputs { now_us: 122_000, estop_ch1: true, estop_ch2: true });

    assert_eq!(orch.state(), SystemState::Idle);
    assert_eq!(orch.snapshot().fault, FaultKind::None);
}
