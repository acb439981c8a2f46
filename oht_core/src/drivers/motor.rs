//! Motor module driver (§4.5): encodes commands as Modbus register writes
//! and decodes polled status into [`MotorData`]. Pre-checks commands
//! against [`MotorLimits`] and the driver's own lifecycle state before
//! ever building a frame that would move the hoist — the bus transport
//! never sees an out-of-range or out-of-sequence command.

use oht_common::motor::{MotorData, MotorDriverState, MotorLimits};
use thiserror::Error;

use crate::bus::modbus::{self, Frame};

/// Register map for the motor module (§3).
pub mod registers {
    pub const CONTROL_WORD: u16 = 0x0000;
    pub const TARGET_POSITION_HI: u16 = 0x0001;
    pub const TARGET_VELOCITY: u16 = 0x0003;
    pub const STATUS_WORD: u16 = 0x0010;
    pub const ACTUAL_POSITION_HI: u16 = 0x0011;
    pub const ACTUAL_VELOCITY: u16 = 0x0013;
    pub const FAULT_CODE: u16 = 0x0015;
    pub const STATUS_BLOCK_LEN: u16 = 6;
}

mod control_word {
    pub const ENABLE: u16 = 0x0001;
    pub const MOVE: u16 = 0x0002;
    pub const STOP: u16 = 0x0004;
    pub const FAULT_RESET: u16 = 0x0008;
    pub const ESTOP: u16 = 0x0010;
}

mod status_word {
    pub const READY: u16 = 0x0001;
    pub const ENABLED: u16 = 0x0002;
    pub const MOVING: u16 = 0x0004;
    pub const FAULT: u16 = 0x0008;
    pub const ESTOP: u16 = 0x0010;
    pub const TARGET_REACHED: u16 = 0x0020;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MotorDriverError {
    #[error("target position {0} outside [{1}, {2}]")]
    PositionOutOfRange(i32, i32, i32),
    #[error("target velocity {0} exceeds limit {1}")]
    VelocityOutOfRange(i32, i32),
    #[error("driver not enabled, current state is {0:?}")]
    NotEnabled(MotorDriverState),
    #[error("driver is faulted, clear the fault before moving")]
    Faulted,
    #[error("movement denied, safety monitor is not in the Safe state")]
    SafetyViolation,
    #[error(transparent)]
    Codec(#[from] modbus::ModbusError),
}

/// Owns one motor module's commanded/observed state and builds the frames
/// that carry it over the bus.
pub struct MotorDriver {
    address: u8,
    limits: MotorLimits,
    state: MotorDriverState,
    data: MotorData,
}

impl MotorDriver {
    pub fn new(address: u8, limits: MotorLimits) -> Self {
        Self { address, limits, state: MotorDriverState::Disabled, data: MotorData::default() }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> MotorDriverState {
        self.state
    }

    pub fn data(&self) -> &MotorData {
        &self.data
    }

    /// Poll request frame: read the status block in one shot.
    pub fn build_poll_frame(&self) -> Result<Frame, MotorDriverError> {
        modbus::encode_read_registers(
            modbus::FunctionCode::ReadHoldingRegisters,
            self.address,
            registers::STATUS_WORD,
            registers::STATUS_BLOCK_LEN,
        )
        .map_err(MotorDriverError::from)
    }

    pub fn build_enable_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, control_word::ENABLE)
    }

    pub fn build_disable_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, 0)
    }

    pub fn build_fault_reset_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, control_word::FAULT_RESET)
    }

    /// Stop is always permitted regardless of current state — it never
    /// needs a pre-check.
    pub fn build_stop_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, control_word::STOP)
    }

    /// Immediate E-Stop: no deceleration, the driver cuts power. Also
    /// always permitted.
    pub fn build_estop_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, control_word::ESTOP)
    }

    /// Build a move command, pre-checked against the safety monitor,
    /// [`MotorLimits`], and the current driver state (§4.5 I-M1/I-M2). The
    /// safety check runs first: an unsafe reading fails the call with
    /// `SafetyViolation` before any other validation, and before any bus
    /// write is ever built.
    pub fn build_move_frame(&self, safety_ok: bool, target_position: i32, target_velocity: i32) -> Result<Frame, MotorDriverError> {
        if !safety_ok {
            return Err(MotorDriverError::SafetyViolation);
        }
        if self.state == MotorDriverState::Fault {
            return Err(MotorDriverError::Faulted);
        }
        if !matches!(self.state, MotorDriverState::Enabled | MotorDriverState::Stopped) {
            return Err(MotorDriverError::NotEnabled(self.state));
        }
        if target_position < self.limits.position_limit_min || target_position > self.limits.position_limit_max {
            return Err(MotorDriverError::PositionOutOfRange(
                target_position,
                self.limits.position_limit_min,
                self.limits.position_limit_max,
            ));
        }
        if target_velocity.unsigned_abs() > self.limits.velocity_limit_max as u32 {
            return Err(MotorDriverError::VelocityOutOfRange(target_velocity, self.limits.velocity_limit_max));
        }

        let pos = target_position as u32;
        let vel = target_velocity as u32;
        let values = [
            (pos >> 16) as u16,
            (pos & 0xFFFF) as u16,
            (vel >> 16) as u16,
            (vel & 0xFFFF) as u16,
        ];
        // Latching the move bit in the same frame as the target registers
        // would require a different function code; the orchestrator issues
        // the MOVE control word as a follow-up write via `build_move_latch_frame`.
        modbus::encode_write_multiple_registers(self.address, registers::TARGET_POSITION_HI, &values).map_err(MotorDriverError::from)
    }

    pub fn build_move_latch_frame(&self) -> Frame {
        modbus::encode_write_single_register(self.address, registers::CONTROL_WORD, control_word::ENABLE | control_word::MOVE)
    }

    /// Decode a polled status block (6 registers starting at
    /// [`registers::STATUS_WORD`]) and update `data`/`state` from it.
    pub fn apply_status(&mut self, block: &[u16]) {
        if block.len() < registers::STATUS_BLOCK_LEN as usize {
            return;
        }
        let status = block[0];
        let position = ((block[1] as u32) << 16 | block[2] as u32) as i32;
        let velocity = ((block[3] as u32) << 16 | block[4] as u32) as i32;
        let fault_code = block[5];

        self.data.current_position = position;
        self.data.current_velocity = velocity;
        self.data.fault_code = fault_code;
        self.data.enabled = status & status_word::ENABLED != 0;
        self.data.fault = status & status_word::FAULT != 0;
        self.data.target_reached = status & status_word::TARGET_REACHED != 0;
        self.data.motion_complete = self.data.target_reached && !self.data.fault;

        self.state = if status & status_word::FAULT != 0 {
            MotorDriverState::Fault
        } else if status & status_word::ESTOP != 0 {
            MotorDriverState::EStop
        } else if status & status_word::MOVING != 0 {
            MotorDriverState::Moving
        } else if status & status_word::ENABLED != 0 {
            if self.data.target_reached { MotorDriverState::Stopped } else { MotorDriverState::Enabled }
        } else {
            MotorDriverState::Disabled
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_block(status: u16, position: i32, velocity: i32, fault_code: u16) -> [u16; 6] {
        let pos = position as u32;
        let vel = velocity as u32;
        [status, (pos >> 16) as u16, (pos & 0xFFFF) as u16, (vel >> 16) as u16, (vel & 0xFFFF) as u16, fault_code]
    }

    #[test]
    fn new_driver_starts_disabled() {
        let d = MotorDriver::new(0x03, MotorLimits::default());
        assert_eq!(d.state(), MotorDriverState::Disabled);
    }

    #[test]
    fn move_rejected_while_disabled() {
        let d = MotorDriver::new(0x03, MotorLimits::default());
        let err = d.build_move_frame(true, 100, 100).unwrap_err();
        assert_eq!(err, MotorDriverError::NotEnabled(MotorDriverState::Disabled));
    }

    #[test]
    fn move_rejected_when_safety_monitor_is_not_safe() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::ENABLED, 0, 0, 0));
        assert_eq!(d.build_move_frame(false, 500, 200), Err(MotorDriverError::SafetyViolation));
    }

    #[test]
    fn move_rejected_outside_position_limits() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::ENABLED, 0, 0, 0));
        assert_eq!(d.state(), MotorDriverState::Enabled);
        let err = d.build_move_frame(true, 20_000, 100).unwrap_err();
        assert!(matches!(err, MotorDriverError::PositionOutOfRange(20_000, 0, 10_000)));
    }

    #[test]
    fn move_rejected_over_velocity_limit() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::ENABLED, 0, 0, 0));
        let err = d.build_move_frame(true, 100, 10_000).unwrap_err();
        assert!(matches!(err, MotorDriverError::VelocityOutOfRange(10_000, 5_000)));
    }

    #[test]
    fn move_accepted_when_enabled_and_within_limits() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::ENABLED, 0, 0, 0));
        let frame = d.build_move_frame(true, 500, 200).unwrap();
        assert_eq!(frame[0], 0x03);
        assert_eq!(frame[1], modbus::FunctionCode::WriteMultipleRegisters as u8);
    }

    #[test]
    fn move_rejected_while_faulted() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::FAULT, 0, 0, 0x0002));
        assert_eq!(d.state(), MotorDriverState::Fault);
        assert_eq!(d.build_move_frame(true, 100, 100), Err(MotorDriverError::Faulted));
    }

    #[test]
    fn apply_status_tracks_moving_and_target_reached() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&status_block(status_word::ENABLED | status_word::MOVING, 250, 100, 0));
        assert_eq!(d.state(), MotorDriverState::Moving);
        assert_eq!(d.data().current_position, 250);

        d.apply_status(&status_block(status_word::ENABLED | status_word::TARGET_REACHED, 500, 0, 0));
        assert_eq!(d.state(), MotorDriverState::Stopped);
        assert!(d.data().motion_complete);
    }

    #[test]
    fn apply_status_ignores_short_blocks() {
        let mut d = MotorDriver::new(0x03, MotorLimits::default());
        d.apply_status(&[1, 2, 3]);
        assert_eq!(d.state(), MotorDriverState::Disabled);
    }
}
