//! C6 Safety Monitor (§4.6): dual-channel E-Stop FSM.
//!
//! Channels read `true` when the loop is closed (safe) and `false` when
//! open (triggered), matching the two-wire safety relay wiring the
//! channel-mismatch fault exists to catch. `ChannelMismatch` latches
//! `EstopState::Fault` fatal-until-clear (§9 Open Questions): once the
//! channels disagree for longer than the debounce window, only an
//! explicit [`EstopMonitor::clear_fault`] leaves `Fault`, never the
//! channels re-agreeing on their own.

use oht_common::consts::{DEFAULT_ESTOP_DEBOUNCE_MS, DEFAULT_ESTOP_RESPONSE_TIMEOUT_MS};
use oht_common::safety::{EstopFaultCause, EstopState, SafetyContext};
use oht_common::state::FaultKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EstopError {
    #[error("cannot clear fault: channels still disagree")]
    ChannelsStillMismatched,
    #[error("not in Fault state")]
    NotFaulted,
    #[error("reset rejected: not in Resetting state")]
    NotResetting,
    #[error("reset rejected: channels report triggered")]
    StillTriggered,
}

/// What happened as a result of a [`EstopMonitor::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstopOutcome {
    Safe,
    Triggered,
    /// Channels disagree but are still inside the debounce window.
    Debouncing,
    Faulted,
    /// Channels agree and are safe after a trigger; waiting for
    /// [`EstopMonitor::confirm_reset`].
    Resetting,
}

/// Owns [`SafetyContext`] and applies the dual-channel debounce, mismatch
/// latch, and reset sequencing around it.
pub struct EstopMonitor {
    ctx: SafetyContext,
    debounce_us: u64,
    response_budget_us: u64,
}

impl EstopMonitor {
    pub fn new() -> Self {
        Self {
            ctx: SafetyContext::default(),
            debounce_us: DEFAULT_ESTOP_DEBOUNCE_MS * 1_000,
            response_budget_us: DEFAULT_ESTOP_RESPONSE_TIMEOUT_MS * 1_000,
        }
    }

    pub fn context(&self) -> &SafetyContext {
        &self.ctx
    }

    /// Microseconds the response budget (S3) allows between a trigger and
    /// the orchestrator observing it.
    pub const fn response_budget_us(&self) -> u64 {
        self.response_budget_us
    }

    /// Feed the latest raw channel readings. `ch1`/`ch2` are `true` when
    /// each channel's loop is closed (not tripped).
    pub fn tick(&mut self, ch1: bool, ch2: bool, now_us: u64) -> EstopOutcome {
        self.ctx.estop_ch1 = ch1;
        self.ctx.estop_ch2 = ch2;

        if self.ctx.estop_state == EstopState::Fault {
            return EstopOutcome::Faulted;
        }

        if ch1 != ch2 {
            let since = *self.ctx.mismatch_since_us.get_or_insert(now_us);
            if now_us.saturating_sub(since) >= self.debounce_us {
                self.latch_fault(EstopFaultCause::ChannelMismatch, now_us);
                return EstopOutcome::Faulted;
            }
            return EstopOutcome::Debouncing;
        }
        self.ctx.mismatch_since_us = None;

        let triggered = !ch1;
        match (self.ctx.estop_state, triggered) {
            (EstopState::Safe, true) | (EstopState::Resetting, true) => {
                self.ctx.estop_state = EstopState::Triggered;
                self.ctx.fault = FaultKind::EStop;
                self.ctx.trigger_count += 1;
                self.ctx.last_trigger_us = now_us;
                EstopOutcome::Triggered
            }
            (EstopState::Triggered, true) => EstopOutcome::Triggered,
            (EstopState::Triggered, false) => {
                self.ctx.estop_state = EstopState::Resetting;
                EstopOutcome::Resetting
            }
            (EstopState::Resetting, false) => EstopOutcome::Resetting,
            (EstopState::Safe, false) => EstopOutcome::Safe,
            (EstopState::Fault, _) => unreachable!("handled above"),
        }
    }

    fn latch_fault(&mut self, cause: EstopFaultCause, now_us: u64) {
        self.ctx.estop_state = EstopState::Fault;
        self.ctx.fault = FaultKind::EStop;
        self.ctx.fault_cause = cause;
        self.ctx.fault_count += 1;
        self.ctx.last_trigger_us = now_us;
    }

    /// Complete the reset sequence: only valid from `Resetting` with both
    /// channels still reporting safe.
    pub fn confirm_reset(&mut self, now_us: u64) -> Result<(), EstopError> {
        if self.ctx.estop_state != EstopState::Resetting {
            return Err(EstopError::NotResetting);
        }
        if !self.ctx.estop_ch1 || !self.ctx.estop_ch2 {
            return Err(EstopError::StillTriggered);
        }
        self.ctx.estop_state = EstopState::Safe;
        self.ctx.fault = FaultKind::None;
        self.ctx.fault_cause = EstopFaultCause::None;
        self.ctx.last_reset_us = now_us;
        Ok(())
    }

    /// Explicitly clear a latched `ChannelMismatch`/hardware fault. Only
    /// valid once the channels agree again.
    pub fn clear_fault(&mut self, now_us: u64) -> Result<(), EstopError> {
        if self.ctx.estop_state != EstopState::Fault {
            return Err(EstopError::NotFaulted);
        }
        if self.ctx.estop_ch1 != self.ctx.estop_ch2 {
            return Err(EstopError::ChannelsStillMismatched);
        }
        self.ctx.estop_state = if self.ctx.estop_ch1 { EstopState::Safe } else { EstopState::Triggered };
        self.ctx.fault = if self.ctx.estop_state == EstopState::Triggered { FaultKind::EStop } else { FaultKind::None };
        self.ctx.fault_cause = EstopFaultCause::None;
        self.ctx.last_reset_us = now_us;
        self.ctx.mismatch_since_us = None;
        Ok(())
    }
}

impl Default for EstopMonitor {
    fn default() -> Self {
        Self::new()
    }
}
