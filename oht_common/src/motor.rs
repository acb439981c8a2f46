//! Motor module data model (§3, §4.4).

use serde::{Deserialize, Serialize};

/// Per-driver lifecycle state (§4.4): `Disabled -> Enabled -> Moving ->
/// (Stopping|Fault|EStop) -> Stopped/Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotorDriverState {
    Disabled = 0,
    Enabled = 1,
    Moving = 2,
    Stopping = 3,
    Fault = 4,
    EStop = 5,
    Stopped = 6,
}

impl Default for MotorDriverState {
    fn default() -> Self {
        MotorDriverState::Disabled
    }
}

/// Fixed motion and kinematic limits for the motor driver's pre-checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorLimits {
    pub position_limit_min: i32,
    pub position_limit_max: i32,
    pub velocity_limit_max: i32,
    pub accel_limit_max: i32,
}

impl Default for MotorLimits {
    fn default() -> Self {
        Self {
            position_limit_min: 0,
            position_limit_max: 10_000,
            velocity_limit_max: 5_000,
            accel_limit_max: 2_000,
        }
    }
}

/// Live motor telemetry and commanded setpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotorData {
    pub position_target: i32,
    pub velocity_target: i32,
    pub accel_limit: i32,
    pub jerk_limit: i32,
    pub current_position: i32,
    pub current_velocity: i32,
    pub current_accel: i32,
    pub enabled: bool,
    pub fault: bool,
    pub target_reached: bool,
    pub motion_complete: bool,
    pub fault_code: u16,
}

impl MotorData {
    /// Human-readable description for a known fault code; unknown codes
    /// get a generic message so logging never panics on an unexpected value.
    pub fn fault_description(&self) -> &'static str {
        match self.fault_code {
            0x0000 => "no fault",
            0x0001 => "following error (lag)",
            0x0002 => "over-current",
            0x0004 => "over-temperature",
            0x0008 => "encoder fault",
            0x0010 => "limit switch violation",
            _ => "unknown motor fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_driver_state_is_disabled() {
        assert_eq!(MotorDriverState::default(), MotorDriverState::Disabled);
    }

    #[test]
    fn unknown_fault_code_has_generic_description() {
        let data = MotorData {
            fault_code: 0xBEEF,
            ..Default::default()
        };
        assert_eq!(data.fault_description(), "unknown motor fault");
    }

    #[test]
    fn known_fault_code_has_specific_description() {
        let data = MotorData {
            fault_code: 0x0002,
            ..Default::default()
        };
        assert_eq!(data.fault_description(), "over-current");
    }
}
