//! Power module data model (§3, §4.4).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Power module fault bitmap (§4.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct PowerFault: u8 {
        const OVERVOLTAGE      = 0b0000_0001;
        const UNDERVOLTAGE     = 0b0000_0010;
        const OVERCURRENT      = 0b0000_0100;
        const OVER_TEMPERATURE = 0b0000_1000;
        const COMM_ERROR       = 0b0001_0000;
        const RELAY_FAULT      = 0b0010_0000;
    }
}

impl PowerFault {
    pub fn has_any(self) -> bool {
        !self.is_empty()
    }
}

/// Output rail identity for relay control and per-rail telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rail {
    Rail12V,
    Rail5V,
    Rail3V3,
}

/// Per-rail output telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RailData {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub relay_on: bool,
}

/// Live power module telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PowerData {
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub battery_soc: f64,
    pub battery_temp: f64,
    pub rail_12v: RailData,
    pub rail_5v: RailData,
    pub rail_3v3: RailData,
    pub fault: PowerFault,
    pub device_id: u16,
    pub hardware_version: u16,
    pub firmware_version: u16,
}

impl PowerData {
    pub fn rail(&self, rail: Rail) -> &RailData {
        match rail {
            Rail::Rail12V => &self.rail_12v,
            Rail::Rail5V => &self.rail_5v,
            Rail::Rail3V3 => &self.rail_3v3,
        }
    }

    pub fn rail_mut(&mut self, rail: Rail) -> &mut RailData {
        match rail {
            Rail::Rail12V => &mut self.rail_12v,
            Rail::Rail5V => &mut self.rail_5v,
            Rail::Rail3V3 => &mut self.rail_3v3,
        }
    }
}

/// Alarm thresholds used by `check_alarms` (§4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerAlarmThresholds {
    pub battery_voltage_min: f64,
    pub battery_voltage_max: f64,
    pub battery_current_max: f64,
    pub battery_temp_max: f64,
}

impl Default for PowerAlarmThresholds {
    fn default() -> Self {
        Self {
            battery_voltage_min: 20.0,
            battery_voltage_max: 29.0,
            battery_current_max: 30.0,
            battery_temp_max: 60.0,
        }
    }
}

/// Evaluate alarm thresholds against live telemetry and fold the result
/// into `data.fault`. Returns `true` if any fault bit is now set.
pub fn check_alarms(data: &mut PowerData, thresholds: &PowerAlarmThresholds) -> bool {
    data.fault.set(
        PowerFault::OVERVOLTAGE,
        data.battery_voltage > thresholds.battery_voltage_max,
    );
    data.fault.set(
        PowerFault::UNDERVOLTAGE,
        data.battery_voltage < thresholds.battery_voltage_min,
    );
    data.fault.set(
        PowerFault::OVERCURRENT,
        data.battery_current.abs() > thresholds.battery_current_max,
    );
    data.fault.set(
        PowerFault::OVER_TEMPERATURE,
        data.battery_temp > thresholds.battery_temp_max,
    );
    data.fault.has_any()
}
