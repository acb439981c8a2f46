//! # OHT-50 Control Core
//!
//! The master-module control core for an Overhead Hoist Transport: a
//! deterministic tick loop that talks RS485/Modbus to slave modules (motor,
//! power, sensor), runs the dual-channel E-Stop safety monitor, the system
//! state machine, the network link manager, and the cascaded PID control
//! loop, and exposes the result over the external interfaces described in
//! the design document.
//!
//! ## Module Map
//!
//! 1. **clock** — monotonic time source for the tick loop
//! 2. **bus** — RS485 transport (`bus::transport`) and Modbus-RTU codec
//!    (`bus::modbus`)
//! 3. **registry** — slave discovery and liveness tracking
//! 4. **drivers** — typed per-module operations (motor, power)
//! 5. **safety** — dual-channel E-Stop monitor
//! 6. **state** — the system state machine (table-driven, §4.7)
//! 7. **network** — network link manager and failover
//! 8. **control** — cascaded PID control loop and control modes
//! 9. **orchestrator** — binds every component into the fixed-period tick
//! 10. **config** — TOML configuration loading
//! 11. **error** — top-level error type
//! 12. **hal_sim** — no-hardware `NarrowHal` backend used until a real
//!     GPIO/LED driver is wired in
//!
//! ## Zero-Allocation Hot Path
//!
//! The tick loop and bus transport avoid heap allocation once started:
//! slave and interface tables are fixed-capacity (`heapless`), and Modbus
//! frames are encoded into stack buffers.

pub mod bus;
pub mod clock;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod hal_sim;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod safety;
pub mod state;

pub use error::CoreError;
