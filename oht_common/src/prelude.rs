//! Prelude module for common re-exports.
//!
//! ```rust
//! use oht_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_TICK_PERIOD_MS, MAX_SLAVES};

// ─── State Machine ──────────────────────────────────────────────────
pub use crate::state::{FaultKind, FsmContext, SystemEvent, SystemState};

// ─── Safety ─────────────────────────────────────────────────────────
pub use crate::safety::{EstopState, SafetyContext};

// ─── Slave Registry ─────────────────────────────────────────────────
pub use crate::registry::{SlaveDescriptor, SlaveKind, SlaveStatus};

// ─── Narrow HAL ─────────────────────────────────────────────────────
pub use crate::hal::{HalError as NarrowHalError, LedId, LedPattern, NarrowHal, RelayId};
