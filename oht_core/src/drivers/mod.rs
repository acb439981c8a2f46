//! C5 Module Drivers: typed operations over the bus transport for each
//! kind of slave module, with a safety pre-check before any command that
//! would move the hoist.

pub mod motor;
pub mod power;

pub use motor::{MotorDriver, MotorDriverError};
pub use power::{PowerDriver, PowerDriverError};
