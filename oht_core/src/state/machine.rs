//! Table-driven system state machine (§4.7).
//!
//! The transition table is the single source of truth: each row names the
//! state it fires from (or `None` for "any non-terminal state"), the event
//! that triggers it, the destination state, a named guard predicate, and
//! the entry effects the orchestrator must carry out. `StateMachine` never
//! performs I/O; `handle_event` only ever mutates [`FsmContext`] and
//! reports what happened.

use oht_common::state::{FaultKind, FsmContext, SystemEvent, SystemState};

use super::guards::{always, move_ready, no_fault, safety_ok, safety_verified, system_ready};

/// A side effect the orchestrator must apply after a transition fires.
/// The state machine reports these instead of touching hardware itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEffect {
    /// Zero the control loop's command output immediately.
    ZeroControlOutput,
    /// Drop any cached target position / path.
    ResetPositionValidity,
    /// Engage the motor holding brake, if fitted.
    EngageHoldingBrake,
    /// Release the motor holding brake.
    ReleaseHoldingBrake,
}

/// Result of feeding one event into the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Accepted {
        from: SystemState,
        to: SystemState,
        effects: heapless::Vec<EntryEffect, 4>,
    },
    Rejected {
        reason: &'static str,
    },
}

type Guard = fn(&FsmContext) -> bool;

struct TransitionRow {
    /// `None` matches from any non-terminal state (cross-cutting events).
    from: Option<SystemState>,
    event: &'static str,
    to: SystemState,
    guard: Guard,
    effects: &'static [EntryEffect],
}

const NO_EFFECTS: &[EntryEffect] = &[];
const STOP_EFFECTS: &[EntryEffect] = &[EntryEffect::ZeroControlOutput, EntryEffect::EngageHoldingBrake];
const MOVE_EFFECTS: &[EntryEffect] = &[EntryEffect::ReleaseHoldingBrake];

static TRANSITIONS: &[TransitionRow] = &[
    TransitionRow { from: Some(SystemState::Boot), event: "BootComplete", to: SystemState::Init, guard: always, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Init), event: "InitComplete", to: SystemState::Idle, guard: always, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Idle), event: "MoveCmd", to: SystemState::Move, guard: move_ready, effects: MOVE_EFFECTS },
    TransitionRow { from: Some(SystemState::Idle), event: "DockCmd", to: SystemState::Dock, guard: safety_ok, effects: MOVE_EFFECTS },
    TransitionRow { from: Some(SystemState::Idle), event: "ConfigCmd", to: SystemState::Config, guard: safety_ok, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Config), event: "ConfigComplete", to: SystemState::Idle, guard: always, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Config), event: "ConfigFailed", to: SystemState::Idle, guard: always, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Move), event: "PauseCmd", to: SystemState::Paused, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Move), event: "StopCmd", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Move), event: "Timeout", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Paused), event: "ResumeCmd", to: SystemState::Move, guard: move_ready, effects: MOVE_EFFECTS },
    TransitionRow { from: Some(SystemState::Paused), event: "StopCmd", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Paused), event: "Timeout", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Dock), event: "StopCmd", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Dock), event: "Timeout", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::Config), event: "Timeout", to: SystemState::Idle, guard: always, effects: STOP_EFFECTS },
    // Cross-cutting: fire from any non-terminal state regardless of what it is.
    TransitionRow { from: None, event: "EStopTriggered", to: SystemState::EStop, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: None, event: "FaultDetected", to: SystemState::Fault, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: None, event: "Shutdown", to: SystemState::Shutdown, guard: always, effects: STOP_EFFECTS },
    TransitionRow { from: Some(SystemState::EStop), event: "EStopReset", to: SystemState::Idle, guard: no_fault, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::EStop), event: "SafeReset", to: SystemState::Safe, guard: safety_verified, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Fault), event: "FaultCleared", to: SystemState::Idle, guard: always, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Fault), event: "SafeReset", to: SystemState::Safe, guard: safety_verified, effects: NO_EFFECTS },
    TransitionRow { from: Some(SystemState::Safe), event: "SafeReset", to: SystemState::Idle, guard: system_ready, effects: NO_EFFECTS },
];

/// Checks the static table for ambiguous rows: two rows that could both
/// match the same explicit `(state, event)` pair. Cross-cutting (`from:
/// None`) rows are checked for unique event names among themselves, since
/// the table relies on at most one row firing per lookup.
fn validate_table(rows: &[TransitionRow]) -> bool {
    for (i, a) in rows.iter().enumerate() {
        for b in rows.iter().skip(i + 1) {
            if a.event != b.event {
                continue;
            }
            let overlap = match (a.from, b.from) {
                (Some(sa), Some(sb)) => sa == sb,
                _ => true,
            };
            if overlap {
                return false;
            }
        }
    }
    true
}

/// Human-readable rejection reason, used for logging and test assertions.
fn rejection_reason(state: SystemState, event_name: &'static str) -> &'static str {
    match (state, event_name) {
        (SystemState::Idle, "MoveCmd") => "move rejected: location/target/safety guard not satisfied",
        (SystemState::Idle, "DockCmd") | (SystemState::Idle, "ConfigCmd") => "rejected: safety guard not satisfied",
        (SystemState::Paused, "ResumeCmd") => "resume rejected: move guard not satisfied",
        (SystemState::EStop, "EStopReset") => "E-Stop reset rejected: fault still latched",
        (SystemState::EStop, "SafeReset") | (SystemState::Fault, "SafeReset") => {
            "safe-mode entry rejected: safety not fully verified"
        }
        (SystemState::Safe, "SafeReset") => "safe-mode exit rejected: system not ready",
        (SystemState::Shutdown, _) => "machine is shut down, no further events accepted",
        _ => "event not valid in current state",
    }
}

/// Owns the live [`FsmContext`] and applies the transition table to it.
pub struct StateMachine {
    ctx: FsmContext,
}

impl StateMachine {
    pub fn new(now_us: u64) -> Self {
        debug_assert!(validate_table(TRANSITIONS), "state machine transition table has ambiguous rows");
        Self { ctx: FsmContext::new(now_us) }
    }

    #[inline]
    pub const fn state(&self) -> SystemState {
        self.ctx.current
    }

    pub fn context(&self) -> &FsmContext {
        &self.ctx
    }

    /// Update the guard flags read by the table's predicates. The
    /// orchestrator recomputes these every tick from bus/safety state
    /// before feeding in any event.
    pub fn set_guards(&mut self, guards: oht_common::state::GuardFlags) {
        self.ctx.guards = guards;
    }

    pub fn allows_motion(&self) -> bool {
        matches!(self.ctx.current, SystemState::Move | SystemState::Dock)
    }

    pub fn is_faulted_or_stopped(&self) -> bool {
        matches!(self.ctx.current, SystemState::Fault | SystemState::EStop | SystemState::Safe)
    }

    /// §4.7 timeout check: if the current state has a configured timeout
    /// and occupancy exceeds it, synthesize and process a `Timeout` event.
    /// Called once per tick, ahead of the queued-event drain, so a stuck
    /// state never outlives its budget by more than one tick (P9).
    pub fn update(&mut self, now_us: u64) -> Option<TransitionOutcome> {
        let timeout_ms = self.ctx.current.default_timeout_ms()?;
        let elapsed_ms = self.ctx.time_in_state_us(now_us) / 1_000;
        if elapsed_ms < timeout_ms {
            return None;
        }
        Some(self.handle_event(SystemEvent::Timeout, now_us))
    }

    /// Feed one event into the machine at time `now_us` (monotonic
    /// microseconds, §4.1). Safety-priority events (E-Stop, Shutdown) are
    /// never filtered by state: the table's `from: None` rows always
    /// apply to them.
    pub fn handle_event(&mut self, event: SystemEvent, now_us: u64) -> TransitionOutcome {
        if self.ctx.current.is_terminal() {
            self.ctx.rejected_events += 1;
            return TransitionOutcome::Rejected { reason: rejection_reason(self.ctx.current, event.name()) };
        }

        if let SystemEvent::FaultDetected { kind } = &event {
            self.ctx.current_fault = *kind;
        }

        let name = event.name();
        let matched = TRANSITIONS.iter().find(|row| {
            row.event == name
                && (row.from.is_none() || row.from == Some(self.ctx.current))
                && (row.guard)(&self.ctx)
        });

        let Some(row) = matched else {
            self.ctx.rejected_events += 1;
            self.ctx.last_event = Some(event);
            return TransitionOutcome::Rejected { reason: rejection_reason(self.ctx.current, name) };
        };

        let from = self.ctx.current;
        let elapsed = self.ctx.time_in_state_us(now_us);
        self.ctx.state_time_us[from as usize] = self.ctx.state_time_us[from as usize].saturating_add(elapsed);

        if matches!(name, "FaultCleared" | "EStopReset" | "SafeReset") {
            self.ctx.current_fault = FaultKind::None;
        }

        self.ctx.previous = from;
        self.ctx.current = row.to;
        self.ctx.entered_at_us = now_us;
        self.ctx.transition_count += 1;
        self.ctx.last_event = Some(event);

        let mut effects = heapless::Vec::new();
        for effect in row.effects {
            let _ = effects.push(*effect);
        }

        TransitionOutcome::Accepted { from, to: row.to, effects }
    }
}
