//! C10 Configuration: the `core.toml` schema loaded at startup, embedding
//! [`SharedConfig`] under `[shared]` the way every workspace binary does
//! (see `oht_common::config`) and adding every core-specific knob named in
//! the design document's defaults.

use oht_common::config::{ConfigError, ConfigLoader, SharedConfig};
use oht_common::consts::{
    DEFAULT_CONFIG_PATH, DEFAULT_CONTROL_FREQUENCY_HZ, DEFAULT_ESTOP_DEBOUNCE_MS,
    DEFAULT_ESTOP_RESPONSE_TIMEOUT_MS, DEFAULT_FAILOVER_THRESHOLD_PCT, DEFAULT_FAILOVER_TIMEOUT_MS,
    DEFAULT_HEALTH_CHECK_INTERVAL_MS, DEFAULT_MAX_EVENTS_PER_TICK, DEFAULT_OFFLINE_THRESHOLD_MS,
    DEFAULT_RS485_BAUD, DEFAULT_RS485_MAX_RETRIES, DEFAULT_RS485_RETRY_DELAY_MS,
    DEFAULT_RS485_TIMEOUT_MS, DEFAULT_SERIAL_DEVICE, DEFAULT_SWEEP_END, DEFAULT_SWEEP_START,
    DEFAULT_TICK_PERIOD_MS,
};
use oht_common::motor::MotorLimits;
use oht_common::network::{InterfaceKind, InterfacePriority};
use oht_common::power::PowerAlarmThresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD_MS
}
fn default_max_events_per_tick() -> usize {
    DEFAULT_MAX_EVENTS_PER_TICK
}
fn default_rt() -> bool {
    false
}
fn default_rt_cpu_core() -> usize {
    0
}
fn default_rt_priority() -> i32 {
    80
}

/// `[bus]`: RS485 transport and discovery-sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_sweep_start")]
    pub sweep_start: u8,
    #[serde(default = "default_sweep_end")]
    pub sweep_end: u8,
    #[serde(default = "default_offline_threshold_ms")]
    pub offline_threshold_ms: u64,
}

fn default_serial_device() -> String {
    DEFAULT_SERIAL_DEVICE.to_string()
}
fn default_baud() -> u32 {
    DEFAULT_RS485_BAUD
}
fn default_timeout_ms() -> u64 {
    DEFAULT_RS485_TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    DEFAULT_RS485_MAX_RETRIES
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RS485_RETRY_DELAY_MS
}
fn default_sweep_start() -> u8 {
    DEFAULT_SWEEP_START
}
fn default_sweep_end() -> u8 {
    DEFAULT_SWEEP_END
}
fn default_offline_threshold_ms() -> u64 {
    DEFAULT_OFFLINE_THRESHOLD_MS
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_baud(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            sweep_start: default_sweep_start(),
            sweep_end: default_sweep_end(),
            offline_threshold_ms: default_offline_threshold_ms(),
        }
    }
}

/// `[safety]`: dual-channel E-Stop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_estop_debounce_ms")]
    pub estop_debounce_ms: u64,
    #[serde(default = "default_estop_response_timeout_ms")]
    pub estop_response_timeout_ms: u64,
}

fn default_estop_debounce_ms() -> u64 {
    DEFAULT_ESTOP_DEBOUNCE_MS
}
fn default_estop_response_timeout_ms() -> u64 {
    DEFAULT_ESTOP_RESPONSE_TIMEOUT_MS
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            estop_debounce_ms: default_estop_debounce_ms(),
            estop_response_timeout_ms: default_estop_response_timeout_ms(),
        }
    }
}

/// One `[[network.interfaces]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterfaceConfig {
    pub id: String,
    pub kind: InterfaceKind,
    pub priority: InterfacePriority,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// `[network]`: link manager tuning plus the configured uplinks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_failover_timeout_ms")]
    pub failover_timeout_ms: u64,
    #[serde(default = "default_failover_threshold_pct")]
    pub failover_threshold_pct: u8,
    #[serde(default)]
    pub interfaces: Vec<NetworkInterfaceConfig>,
}

fn default_health_check_interval_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_MS
}
fn default_failover_timeout_ms() -> u64 {
    DEFAULT_FAILOVER_TIMEOUT_MS
}
fn default_failover_threshold_pct() -> u8 {
    DEFAULT_FAILOVER_THRESHOLD_PCT
}

/// `[control]`: cascaded PID gains and sample rate (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_frequency_hz")]
    pub frequency_hz: u32,
    #[serde(default)]
    pub position: crate::control::PidGains,
    #[serde(default)]
    pub velocity: crate::control::PidGains,
}

fn default_control_frequency_hz() -> u32 {
    DEFAULT_CONTROL_FREQUENCY_HZ
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_control_frequency_hz(),
            position: crate::control::PidGains::default(),
            velocity: crate::control::PidGains::default(),
        }
    }
}

/// `[rt]`: real-time OS tuning, only applied when built with `--features rt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtConfig {
    #[serde(default = "default_rt")]
    pub enabled: bool,
    #[serde(default = "default_rt_cpu_core")]
    pub cpu_core: usize,
    #[serde(default = "default_rt_priority")]
    pub priority: i32,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self { enabled: default_rt(), cpu_core: default_rt_cpu_core(), priority: default_rt_priority() }
    }
}

/// Full `core.toml` schema (§4.9, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub shared: SharedConfig,
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    #[serde(default = "default_max_events_per_tick")]
    pub max_events_per_tick: usize,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub rt: RtConfig,
    #[serde(default)]
    pub motor_limits: MotorLimits,
    #[serde(default)]
    pub power_thresholds: PowerAlarmThresholds,
}

impl CoreConfig {
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Validate cross-field invariants beyond what serde already enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.tick_period_ms == 0 {
            return Err(ConfigError::ValidationError("tick_period_ms must be non-zero".into()));
        }
        if self.bus.sweep_start > self.bus.sweep_end {
            return Err(ConfigError::ValidationError("bus.sweep_start must be <= bus.sweep_end".into()));
        }
        if self.network.interfaces.len() > oht_common::consts::MAX_INTERFACES {
            return Err(ConfigError::ValidationError(format!(
                "network.interfaces exceeds the maximum of {}",
                oht_common::consts::MAX_INTERFACES
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[shared]
service_name = "oht_core"
"#
    }

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config: CoreConfig = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.tick_period_ms, DEFAULT_TICK_PERIOD_MS);
        assert_eq!(config.bus.device, DEFAULT_SERIAL_DEVICE);
        assert_eq!(config.bus.baud, DEFAULT_RS485_BAUD);
        assert_eq!(config.safety.estop_debounce_ms, DEFAULT_ESTOP_DEBOUNCE_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_period_is_rejected() {
        let mut config: CoreConfig = toml::from_str(minimal_toml()).unwrap();
        config.tick_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_sweep_range_is_rejected() {
        let mut config: CoreConfig = toml::from_str(minimal_toml()).unwrap();
        config.bus.sweep_start = 0x20;
        config.bus.sweep_end = 0x01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn network_interfaces_parse_from_toml() {
        let toml_str = r#"
[shared]
service_name = "oht_core"

[[network.interfaces]]
id = "eth0"
kind = "Ethernet"
priority = "Primary"

[[network.interfaces]]
id = "wlan0"
kind = "WiFi"
priority = "Secondary"
"#;
        let config: CoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.interfaces.len(), 2);
        assert_eq!(config.network.interfaces[0].id, "eth0");
    }

    #[test]
    fn load_reports_file_not_found() {
        let err = CoreConfig::load(Path::new("/nonexistent/core.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }

    #[test]
    fn load_round_trips_through_a_temp_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        file.flush().unwrap();
        let config = CoreConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.service_name, "oht_core");
    }
}
