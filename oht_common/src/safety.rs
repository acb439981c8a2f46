//! Safety context shared between the safety monitor and its callers.
//!
//! The state machine itself lives in `oht_core::safety`; this module only
//! holds the data owned by it, so other crates can read a snapshot without
//! depending on the monitor's update logic.

use serde::{Deserialize, Serialize};

use crate::state::FaultKind;

/// Dual-channel E-Stop lifecycle state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EstopState {
    Safe = 0,
    Triggered = 1,
    Fault = 2,
    Resetting = 3,
}

impl EstopState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Safe),
            1 => Some(Self::Triggered),
            2 => Some(Self::Fault),
            3 => Some(Self::Resetting),
            _ => None,
        }
    }
}

impl Default for EstopState {
    fn default() -> Self {
        EstopState::Safe
    }
}

/// Finer-grained cause of an E-Stop fault, supplementing [`FaultKind::EStop`]
/// with the distinction the source firmware's `estop_fault_t` drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EstopFaultCause {
    None = 0,
    Channel1Open = 1,
    Channel2Open = 2,
    ChannelMismatch = 3,
    ResponseTimeout = 4,
    HardwareError = 5,
}

impl Default for EstopFaultCause {
    fn default() -> Self {
        EstopFaultCause::None
    }
}

/// The live safety state bundle, exclusively owned by the safety monitor.
#[derive(Debug, Clone, Default)]
pub struct SafetyContext {
    pub estop_ch1: bool,
    pub estop_ch2: bool,
    pub estop_state: EstopState,
    pub fault: FaultKind,
    pub fault_cause: EstopFaultCause,
    pub trigger_count: u32,
    pub fault_count: u32,
    pub last_trigger_us: u64,
    pub last_reset_us: u64,
    /// `now_us` of the first tick in which a channel mismatch was observed;
    /// `None` while channels agree. Used to debounce S2.
    pub mismatch_since_us: Option<u64>,
}

impl SafetyContext {
    pub fn is_safe(&self) -> bool {
        self.estop_state == EstopState::Safe && self.fault == FaultKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estop_state_round_trips() {
        for raw in 0u8..=3 {
            let state = EstopState::from_u8(raw).expect("valid discriminant");
            assert_eq!(state as u8, raw);
        }
        assert!(EstopState::from_u8(4).is_none());
    }

    #[test]
    fn default_context_is_safe() {
        let ctx = SafetyContext::default();
        assert!(ctx.is_safe());
    }

    #[test]
    fn triggered_context_is_not_safe() {
        let mut ctx = SafetyContext::default();
        ctx.estop_state = EstopState::Triggered;
        assert!(!ctx.is_safe());
    }
}
