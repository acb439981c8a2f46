//! C6 Safety Monitor: the dual-channel E-Stop finite state machine.

pub mod estop;

pub use estop::{EstopError, EstopMonitor, EstopOutcome};
