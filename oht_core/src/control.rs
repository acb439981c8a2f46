//! C9 Control Loop (§4.9): a cascaded position -> velocity PID. The outer
//! position loop's output becomes the inner velocity loop's setpoint, and
//! the velocity loop's output is the torque/current command the
//! orchestrator hands to the motor driver.
//!
//! Anti-windup here is deliberately the simpler clamp-and-hold scheme
//! (`integral <- clamp(integral + error*dt, i_min, i_max)`) rather than the
//! back-calculation tracking term the cycle-level PID uses elsewhere in
//! this codebase — §9 Open Questions calls for matching the system's own
//! documented control law, not importing a fancier one.

use oht_common::motor::MotorLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("control loop is latched in Error state, call reset() before resuming")]
    Latched,
}

/// PID internal state. Reset whenever the loop's [`Mode`] changes so a
/// stale integral or derivative term from the previous mode never leaks
/// into the new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    integral: f64,
    prev_error: f64,
}

impl PidState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub i_min: f64,
    pub i_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self { kp: 0.0, ki: 0.0, kd: 0.0, i_min: -1.0, i_max: 1.0, out_min: -1.0, out_max: 1.0 }
    }
}

/// One clamp-anti-windup PID cycle: `output <- clamp(kp*e + ki*I + kd*de/dt, out_min, out_max)`.
pub fn pid_compute(state: &mut PidState, gains: &PidGains, error: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    state.integral = (state.integral + error * dt).clamp(gains.i_min, gains.i_max);
    let derivative = (error - state.prev_error) / dt;
    state.prev_error = error;
    let raw = gains.kp * error + gains.ki * state.integral + gains.kd * derivative;
    raw.clamp(gains.out_min, gains.out_max)
}

/// Control-loop operating mode (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Position,
    Velocity,
    Torque,
    Homing,
    Emergency,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Ok,
    Error,
}

const EMA_ALPHA: f64 = 0.1;

/// Exponential moving average (alpha=0.1) plus a running max of the
/// absolute tracking error, kept per loop (§4.9 statistics).
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorStats {
    ema: f64,
    max_abs: f64,
    samples: u64,
}

impl ErrorStats {
    pub fn record(&mut self, error: f64) {
        let abs = error.abs();
        self.ema = if self.samples == 0 { abs } else { EMA_ALPHA * abs + (1.0 - EMA_ALPHA) * self.ema };
        self.max_abs = self.max_abs.max(abs);
        self.samples += 1;
    }

    pub fn ema(&self) -> f64 {
        self.ema
    }

    pub fn max_abs(&self) -> f64 {
        self.max_abs
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Result of one [`ControlLoop::update`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    pub velocity_setpoint: f64,
    pub output: f64,
    pub state: ControlState,
}

const ERROR_OUTPUT: ControlOutput = ControlOutput { velocity_setpoint: 0.0, output: 0.0, state: ControlState::Error };

/// Cascaded position -> velocity PID (§4.9). Never touches the bus
/// directly — the orchestrator reads `output` from [`ControlOutput`] and
/// hands it to the motor driver's move frame.
pub struct ControlLoop {
    mode: Mode,
    position_gains: PidGains,
    velocity_gains: PidGains,
    position_state: PidState,
    velocity_state: PidState,
    limits: MotorLimits,
    position_stats: ErrorStats,
    velocity_stats: ErrorStats,
    latched: bool,
}

impl ControlLoop {
    pub fn new(position_gains: PidGains, velocity_gains: PidGains, limits: MotorLimits) -> Self {
        Self {
            mode: Mode::Idle,
            position_gains,
            velocity_gains,
            position_state: PidState::default(),
            velocity_state: PidState::default(),
            limits,
            position_stats: ErrorStats::default(),
            velocity_stats: ErrorStats::default(),
            latched: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn position_stats(&self) -> ErrorStats {
        self.position_stats
    }

    pub fn velocity_stats(&self) -> ErrorStats {
        self.velocity_stats
    }

    /// Switch operating mode, resetting both integrators (I-C1) whenever
    /// the mode actually changes. Does not clear a latched error — call
    /// [`ControlLoop::reset`] first.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            self.position_state.reset();
            self.velocity_state.reset();
        }
        self.mode = mode;
    }

    /// Cascaded update for one control-loop tick (§4.9).
    ///
    /// Returns `ControlState::Error` with a zero output if the loop is
    /// latched, or if `actual_position`/`actual_velocity` fall outside the
    /// configured limits — the caller must not write `output` to the bus
    /// when `state == ControlState::Error`.
    pub fn update(&mut self, target_position: i32, actual_position: i32, actual_velocity: i32, dt_s: f64) -> ControlOutput {
        if self.latched || self.mode == Mode::Emergency {
            self.latched = true;
            return ERROR_OUTPUT;
        }

        if actual_position < self.limits.position_limit_min
            || actual_position > self.limits.position_limit_max
            || actual_velocity.unsigned_abs() > self.limits.velocity_limit_max as u32
        {
            self.latched = true;
            return ERROR_OUTPUT;
        }

        if self.mode == Mode::Idle {
            return ControlOutput { velocity_setpoint: 0.0, output: 0.0, state: ControlState::Ok };
        }

        let position_error = (target_position - actual_position) as f64;
        self.position_stats.record(position_error);

        let velocity_setpoint = if self.mode == Mode::Homing {
            // Homing crawls toward the target at a fixed fraction of full
            // output (§4.9) rather than through the position loop's
            // proportional term, which would overshoot at low speed.
            position_error.signum() * self.velocity_gains.out_max * oht_common::consts::DEFAULT_HOMING_OUTPUT_FRACTION
        } else {
            pid_compute(&mut self.position_state, &self.position_gains, position_error, dt_s)
        };

        let velocity_error = velocity_setpoint - actual_velocity as f64;
        self.velocity_stats.record(velocity_error);
        let output = pid_compute(&mut self.velocity_state, &self.velocity_gains, velocity_error, dt_s);

        ControlOutput { velocity_setpoint, output, state: ControlState::Ok }
    }

    /// Checked update: fails fast with [`ControlError::Latched`] instead of
    /// silently handing back a zeroed [`ControlOutput`], for callers that
    /// want to treat "still latched" as distinct from "limit just tripped".
    pub fn checked_update(
        &mut self,
        target_position: i32,
        actual_position: i32,
        actual_velocity: i32,
        dt_s: f64,
    ) -> Result<ControlOutput, ControlError> {
        if self.latched {
            return Err(ControlError::Latched);
        }
        Ok(self.update(target_position, actual_position, actual_velocity, dt_s))
    }

    /// Synchronous emergency stop (§4.6/§4.9): forces `Mode::Emergency` and
    /// a zero output immediately, bypassing the cascaded computation.
    /// Only [`ControlLoop::reset`] followed by [`ControlLoop::set_mode`]
    /// clears the latch.
    pub fn emergency_stop(&mut self) -> ControlOutput {
        self.mode = Mode::Emergency;
        self.position_state.reset();
        self.velocity_state.reset();
        self.latched = true;
        ERROR_OUTPUT
    }

    /// Clear a latched error/emergency state. The caller must still call
    /// [`ControlLoop::set_mode`] to leave `Mode::Emergency`.
    pub fn reset(&mut self) {
        self.latched = false;
        self.position_state.reset();
        self.velocity_state.reset();
    }
}
