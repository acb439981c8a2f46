//! C2/C3: RS485 bus transport and Modbus-RTU codec.

pub mod modbus;
pub mod transport;
pub mod worker;

pub use transport::{BusStats, BusStatus, BusTransport, TransportError};
pub use worker::BusWorker;
