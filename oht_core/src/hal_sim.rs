//! Simulated `NarrowHal` backend (§6): used when no GPIO/LED hardware is
//! present, the same role `evo_hal`'s simulation driver plays for motion —
//! E-Stop always reads safe, LED/relay writes are logged and discarded.

use oht_common::hal::{HalError, LedId, LedPattern, NarrowHal, RelayId};
use tracing::debug;

/// No-hardware HAL: both E-Stop channels read closed (safe), LED and relay
/// writes succeed and are logged at debug level.
pub struct SimulatedHal;

impl SimulatedHal {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimulatedHal {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrowHal for SimulatedHal {
    fn read_estop_channels(&mut self) -> Result<(bool, bool), HalError> {
        Ok((true, true))
    }

    fn set_led(&mut self, id: LedId, pattern: LedPattern) -> Result<(), HalError> {
        debug!(?id, ?pattern, "simulated LED");
        Ok(())
    }

    fn set_relay(&mut self, id: RelayId, on: bool) -> Result<(), HalError> {
        debug!(?id, on, "simulated relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estop_channels_read_safe() {
        let mut hal = SimulatedHal::new();
        assert_eq!(hal.read_estop_channels().unwrap(), (true, true));
    }

    #[test]
    fn led_and_relay_writes_succeed() {
        let mut hal = SimulatedHal::new();
        assert!(hal.set_led(LedId::Power, LedPattern::On).is_ok());
        assert!(hal.set_relay(RelayId::Relay1, true).is_ok());
    }
}
