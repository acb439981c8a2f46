//! System-wide constants for the OHT-50 control core.
//!
//! Single source of truth for numeric limits and default paths. Imported
//! by every crate in the workspace — no duplication permitted.

/// Maximum number of slave modules on the RS485 segment.
pub const MAX_SLAVES: usize = 16;

/// Lowest valid Modbus unit address.
pub const MIN_SLAVE_ADDRESS: u8 = 1;

/// Highest valid Modbus unit address.
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Conventional address of the power module.
pub const ADDRESS_POWER: u8 = 0x02;

/// Conventional address of the motor module.
pub const ADDRESS_MOTOR: u8 = 0x03;

/// Default discovery sweep window (inclusive), per §9 Open Questions.
pub const DEFAULT_SWEEP_START: u8 = 0x01;
pub const DEFAULT_SWEEP_END: u8 = 0x10;

/// Maximum number of configured network interfaces.
pub const MAX_INTERFACES: usize = 4;

/// Default orchestrator tick period [ms].
pub const DEFAULT_TICK_PERIOD_MS: u64 = 10;

/// Default maximum number of events drained from the priority queue per tick.
pub const DEFAULT_MAX_EVENTS_PER_TICK: usize = 8;

/// Default RS485 baud rate.
pub const DEFAULT_RS485_BAUD: u32 = 115_200;

/// Default RS485 per-request timeout [ms].
pub const DEFAULT_RS485_TIMEOUT_MS: u64 = 1000;

/// Default RS485 transmit retry count.
pub const DEFAULT_RS485_MAX_RETRIES: u32 = 3;

/// Default RS485 retry backoff starting delay [ms]; doubles on each retry.
pub const DEFAULT_RS485_RETRY_DELAY_MS: u64 = 100;

/// Default serial device path.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyOHT485";

/// Default E-Stop debounce time [ms] (S2).
pub const DEFAULT_ESTOP_DEBOUNCE_MS: u64 = 50;

/// Default E-Stop response time budget [ms] (S3).
pub const DEFAULT_ESTOP_RESPONSE_TIMEOUT_MS: u64 = 100;

/// Default slave offline threshold [ms] (I-R2): how long a slave may go
/// unseen before its status is demoted from `Online`.
pub const DEFAULT_OFFLINE_THRESHOLD_MS: u64 = 3000;

/// Default network health-check interval [ms].
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 10_000;

/// Default failover threshold window [ms]: time an active interface may
/// stay below `failover_threshold` health before losing its slot.
pub const DEFAULT_FAILOVER_TIMEOUT_MS: u64 = 3000;

/// Default minimum health percentage an active interface must sustain.
pub const DEFAULT_FAILOVER_THRESHOLD_PCT: u8 = 40;

/// Default control-loop sample frequency [Hz].
pub const DEFAULT_CONTROL_FREQUENCY_HZ: u32 = 1000;

/// Default homing output, as a fraction of full output range.
pub const DEFAULT_HOMING_OUTPUT_FRACTION: f64 = 0.10;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/oht50/core.toml";

/// Per-(component, kind) error log duplicate-suppression window [ms] (§7).
pub const ERROR_DEDUP_WINDOW_MS: u64 = 1000;

/// Shutdown grace period, expressed as a multiple of the tick period (§5).
pub const SHUTDOWN_GRACE_TICKS: u32 = 2;
