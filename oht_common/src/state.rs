//! Top-level system state and event types shared between the state
//! machine and its callers.
//!
//! `SystemState` and `FaultKind` use `#[repr(u8)]` for compact storage and
//! a `from_u8` round-trip, matching the rest of the data model.
//! `SystemEvent` carries payloads on several variants and is therefore a
//! plain tagged enum rather than a `repr(u8)` one.

use serde::{Deserialize, Serialize};

/// Top-level lifecycle state of the master module. Exactly one is active
/// at a time; the current value lives in [`FsmContext::current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemState {
    Boot = 0,
    Init = 1,
    Idle = 2,
    Move = 3,
    Paused = 4,
    Dock = 5,
    Config = 6,
    Fault = 7,
    EStop = 8,
    Safe = 9,
    Shutdown = 10,
}

impl SystemState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Boot),
            1 => Some(Self::Init),
            2 => Some(Self::Idle),
            3 => Some(Self::Move),
            4 => Some(Self::Paused),
            5 => Some(Self::Dock),
            6 => Some(Self::Config),
            7 => Some(Self::Fault),
            8 => Some(Self::EStop),
            9 => Some(Self::Safe),
            10 => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Per-state timeout in milliseconds; `None` means no timeout applies.
    pub const fn default_timeout_ms(self) -> Option<u64> {
        match self {
            SystemState::Boot => Some(10_000),
            SystemState::Init => Some(5_000),
            SystemState::Move => Some(30_000),
            SystemState::Paused => Some(60_000),
            SystemState::Dock => Some(15_000),
            SystemState::Config => Some(10_000),
            _ => None,
        }
    }

    /// Whether this state is the terminal state; no further transitions fire.
    pub const fn is_terminal(self) -> bool {
        matches!(self, SystemState::Shutdown)
    }
}

impl Default for SystemState {
    fn default() -> Self {
        SystemState::Boot
    }
}

/// Fault taxonomy carried by `FaultDetected` events and `FsmContext::current_fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultKind {
    None = 0,
    EStop = 1,
    Communication = 2,
    Sensor = 3,
    Motor = 4,
    Power = 5,
    Software = 6,
    Hardware = 7,
}

impl FaultKind {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::EStop),
            2 => Some(Self::Communication),
            3 => Some(Self::Sensor),
            4 => Some(Self::Motor),
            5 => Some(Self::Power),
            6 => Some(Self::Software),
            7 => Some(Self::Hardware),
            _ => None,
        }
    }
}

impl Default for FaultKind {
    fn default() -> Self {
        FaultKind::None
    }
}

/// A typed configuration blob carried by `ConfigCmd`. Kept opaque to the
/// state machine; the orchestrator interprets it.
pub type ConfigBlob = heapless::Vec<u8, 256>;

/// Events the state machine reacts to. Several variants carry a payload
/// (fault kind, target position, configuration blob).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SystemEvent {
    BootComplete,
    InitComplete,
    MoveCmd { target_position: i32 },
    DockCmd,
    StopCmd,
    PauseCmd,
    ResumeCmd,
    ConfigCmd { blob: ConfigBlob },
    ConfigComplete,
    ConfigFailed,
    EStopTriggered,
    EStopReset,
    SafeReset,
    FaultDetected { kind: FaultKind },
    FaultCleared,
    Shutdown,
    Timeout,
    Error,
}

impl SystemEvent {
    /// Short, stable name for logging and duplicate-suppression keys.
    pub const fn name(&self) -> &'static str {
        match self {
            SystemEvent::BootComplete => "BootComplete",
            SystemEvent::InitComplete => "InitComplete",
            SystemEvent::MoveCmd { .. } => "MoveCmd",
            SystemEvent::DockCmd => "DockCmd",
            SystemEvent::StopCmd => "StopCmd",
            SystemEvent::PauseCmd => "PauseCmd",
            SystemEvent::ResumeCmd => "ResumeCmd",
            SystemEvent::ConfigCmd { .. } => "ConfigCmd",
            SystemEvent::ConfigComplete => "ConfigComplete",
            SystemEvent::ConfigFailed => "ConfigFailed",
            SystemEvent::EStopTriggered => "EStopTriggered",
            SystemEvent::EStopReset => "EStopReset",
            SystemEvent::SafeReset => "SafeReset",
            SystemEvent::FaultDetected { .. } => "FaultDetected",
            SystemEvent::FaultCleared => "FaultCleared",
            SystemEvent::Shutdown => "Shutdown",
            SystemEvent::Timeout => "Timeout",
            SystemEvent::Error => "Error",
        }
    }

    /// Safety events pre-empt everything else in the priority queue (§5).
    pub const fn is_safety_priority(&self) -> bool {
        matches!(self, SystemEvent::EStopTriggered | SystemEvent::Shutdown)
    }
}

/// Guard flags evaluated by the named predicates in the transition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardFlags {
    pub system_ready: bool,
    pub safety_ok: bool,
    pub comms_ok: bool,
    pub sensors_ok: bool,
    pub location_ok: bool,
    pub target_valid: bool,
}

/// Per-state cumulative occupancy time, in microseconds. Indexed by
/// [`SystemState`] discriminant.
pub type StateTimeTable = [u64; 11];

/// The live FSM state bundle, exclusively owned by the state machine.
#[derive(Debug, Clone)]
pub struct FsmContext {
    pub current: SystemState,
    pub previous: SystemState,
    pub last_event: Option<SystemEvent>,
    pub current_fault: FaultKind,
    pub entered_at_us: u64,
    pub transition_count: u32,
    pub rejected_events: u32,
    pub guards: GuardFlags,
    pub state_time_us: StateTimeTable,
}

impl FsmContext {
    pub fn new(now_us: u64) -> Self {
        Self {
            current: SystemState::Boot,
            previous: SystemState::Boot,
            last_event: None,
            current_fault: FaultKind::None,
            entered_at_us: now_us,
            transition_count: 0,
            rejected_events: 0,
            guards: GuardFlags::default(),
            state_time_us: [0; 11],
        }
    }

    /// Microseconds spent in the current state as of `now_us`.
    pub fn time_in_state_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.entered_at_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_state_round_trips() {
        for raw in 0u8..=10 {
            let state = SystemState::from_u8(raw).expect("valid discriminant");
            assert_eq!(state as u8, raw);
        }
        assert!(SystemState::from_u8(11).is_none());
    }

    #[test]
    fn fault_kind_round_trips() {
        for raw in 0u8..=7 {
            let kind = FaultKind::from_u8(raw).expect("valid discriminant");
            assert_eq!(kind as u8, raw);
        }
        assert!(FaultKind::from_u8(8).is_none());
    }

    #[test]
    fn only_shutdown_is_terminal() {
        assert!(SystemState::Shutdown.is_terminal());
        assert!(!SystemState::Idle.is_terminal());
    }

    #[test]
    fn timeout_table_matches_spec_defaults() {
        assert_eq!(SystemState::Boot.default_timeout_ms(), Some(10_000));
        assert_eq!(SystemState::Init.default_timeout_ms(), Some(5_000));
        assert_eq!(SystemState::Move.default_timeout_ms(), Some(30_000));
        assert_eq!(SystemState::Paused.default_timeout_ms(), Some(60_000));
        assert_eq!(SystemState::Dock.default_timeout_ms(), Some(15_000));
        assert_eq!(SystemState::Config.default_timeout_ms(), Some(10_000));
        assert_eq!(SystemState::Idle.default_timeout_ms(), None);
        assert_eq!(SystemState::Fault.default_timeout_ms(), None);
    }

    #[test]
    fn estop_and_shutdown_are_safety_priority() {
        assert!(SystemEvent::EStopTriggered.is_safety_priority());
        assert!(SystemEvent::Shutdown.is_safety_priority());
        assert!(!SystemEvent::MoveCmd { target_position: 10 }.is_safety_priority());
    }

    #[test]
    fn fsm_context_starts_in_boot() {
        let ctx = FsmContext::new(1_000);
        assert_eq!(ctx.current, SystemState::Boot);
        assert_eq!(ctx.previous, SystemState::Boot);
        assert_eq!(ctx.time_in_state_us(1_500), 500);
    }
}
