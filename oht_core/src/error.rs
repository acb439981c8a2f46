//! Top-level error type: wraps every component error so the orchestrator
//! and binary entry point have one `Result` to propagate.

use thiserror::Error;

use crate::bus::modbus::ModbusError;
use crate::bus::transport::TransportError;
use crate::control::ControlError;
use crate::network::link::LinkError;
use crate::registry::RegistryError;
use crate::safety::estop::EstopError;
use oht_common::config::ConfigError;

use crate::drivers::motor::MotorDriverError;
use crate::drivers::power::PowerDriverError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Modbus(#[from] ModbusError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Estop(#[from] EstopError),
    #[error(transparent)]
    MotorDriver(#[from] MotorDriverError),
    #[error(transparent)]
    PowerDriver(#[from] PowerDriverError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("fatal runtime fault: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Process exit code (§6): 0 clean shutdown is handled separately by
    /// the caller, 1 for anything surfaced before the tick loop starts
    /// running, 2 for a fault raised once it's running.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::Init(_) | CoreError::Config(_) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_errors_exit_with_code_one() {
        let err = CoreError::Init("bad device path".into());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn runtime_faults_exit_with_code_two() {
        let err = CoreError::Fatal("bus down".into());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn component_errors_convert_via_from() {
        let transport_err: CoreError = TransportError::Timeout(3).into();
        assert_eq!(transport_err.exit_code(), 2);
    }
}
