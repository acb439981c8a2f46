//! Power module driver (§4.5): decodes polled telemetry into [`PowerData`]
//! and builds relay-control frames for each output rail.

use oht_common::power::{check_alarms, PowerAlarmThresholds, PowerData, PowerFault, Rail};
use thiserror::Error;

use crate::bus::modbus::{self, Frame};

/// Register map for the power module (§3). Battery telemetry is 4
/// registers (scaled by 100), each rail is 3 (voltage/current, scaled by
/// 100, and a relay-state bit in the low bit of a status word).
pub mod registers {
    pub const BATTERY_BLOCK: u16 = 0x0000; // voltage, current, soc, temp
    pub const BATTERY_BLOCK_LEN: u16 = 4;
    pub const RAIL_12V_STATUS: u16 = 0x0010;
    pub const RAIL_5V_STATUS: u16 = 0x0013;
    pub const RAIL_3V3_STATUS: u16 = 0x0016;
    pub const DEVICE_INFO: u16 = 0x0020; // device_id, hw_version, fw_version
    pub const DEVICE_INFO_LEN: u16 = 3;
    pub const RELAY_COIL_12V: u16 = 0x0000;
    pub const RELAY_COIL_5V: u16 = 0x0001;
    pub const RELAY_COIL_3V3: u16 = 0x0002;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowerDriverError {
    #[error(transparent)]
    Codec(#[from] modbus::ModbusError),
}

fn rail_coil(rail: Rail) -> u16 {
    match rail {
        Rail::Rail12V => registers::RELAY_COIL_12V,
        Rail::Rail5V => registers::RELAY_COIL_5V,
        Rail::Rail3V3 => registers::RELAY_COIL_3V3,
    }
}

fn rail_status_register(rail: Rail) -> u16 {
    match rail {
        Rail::Rail12V => registers::RAIL_12V_STATUS,
        Rail::Rail5V => registers::RAIL_5V_STATUS,
        Rail::Rail3V3 => registers::RAIL_3V3_STATUS,
    }
}

/// Owns one power module's observed telemetry and the alarm thresholds
/// evaluated against it.
pub struct PowerDriver {
    address: u8,
    thresholds: PowerAlarmThresholds,
    data: PowerData,
}

impl PowerDriver {
    pub fn new(address: u8, thresholds: PowerAlarmThresholds) -> Self {
        Self { address, thresholds, data: PowerData::default() }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn data(&self) -> &PowerData {
        &self.data
    }

    pub fn build_battery_poll_frame(&self) -> Result<Frame, PowerDriverError> {
        modbus::encode_read_registers(
            modbus::FunctionCode::ReadHoldingRegisters,
            self.address,
            registers::BATTERY_BLOCK,
            registers::BATTERY_BLOCK_LEN,
        )
        .map_err(PowerDriverError::from)
    }

    pub fn build_rail_poll_frame(&self, rail: Rail) -> Result<Frame, PowerDriverError> {
        modbus::encode_read_registers(modbus::FunctionCode::ReadHoldingRegisters, self.address, rail_status_register(rail), 3)
            .map_err(PowerDriverError::from)
    }

    pub fn build_relay_frame(&self, rail: Rail, on: bool) -> Frame {
        modbus::encode_write_single_coil(self.address, rail_coil(rail), on)
    }

    /// Decode a battery telemetry block (voltage, current, soc, temp —
    /// each a signed value scaled by 100) and re-run the alarm checks.
    pub fn apply_battery_block(&mut self, block: &[u16]) -> bool {
        if block.len() < registers::BATTERY_BLOCK_LEN as usize {
            return self.data.fault.has_any();
        }
        self.data.battery_voltage = (block[0] as i16) as f64 / 100.0;
        self.data.battery_current = (block[1] as i16) as f64 / 100.0;
        self.data.battery_soc = (block[2] as i16) as f64 / 100.0;
        self.data.battery_temp = (block[3] as i16) as f64 / 100.0;
        check_alarms(&mut self.data, &self.thresholds)
    }

    /// Decode one rail's status block: voltage, current (both scaled by
    /// 100) and a relay-state word.
    pub fn apply_rail_block(&mut self, rail: Rail, block: &[u16]) {
        if block.len() < 3 {
            return;
        }
        let voltage = (block[0] as i16) as f64 / 100.0;
        let current = (block[1] as i16) as f64 / 100.0;
        let relay_on = block[2] != 0;
        let entry = self.data.rail_mut(rail);
        entry.voltage = voltage;
        entry.current = current;
        entry.power = voltage * current;
        entry.relay_on = relay_on;

        if !relay_on && rail == Rail::Rail12V {
            self.data.fault.set(PowerFault::RELAY_FAULT, voltage.abs() > 0.5);
        }
    }

    pub fn apply_device_info(&mut self, block: &[u16]) {
        if block.len() < registers::DEVICE_INFO_LEN as usize {
            return;
        }
        self.data.device_id = block[0];
        self.data.hardware_version = block[1];
        self.data.firmware_version = block[2];
    }
}
