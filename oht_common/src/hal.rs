//! Narrow hardware abstraction consumed by the core (§6).
//!
//! The core never touches GPIO/UART syscalls directly. It consumes a
//! single trait exposing the five status LEDs, the relay pair, and the
//! dual E-Stop channel inputs. Concrete implementations (real GPIO,
//! simulation) live outside the core crate.

use thiserror::Error;

/// Error type for narrow HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    #[error("HAL initialization failed: {0}")]
    InitFailed(String),

    #[error("HAL communication error: {0}")]
    CommunicationError(String),

    #[error("invalid HAL argument: {0}")]
    InvalidArgument(String),
}

/// The five fixed status LEDs (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedId {
    Power,
    System,
    Communication,
    Network,
    Error,
}

/// LED display pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedPattern {
    Off,
    On,
    BlinkSlow,
    BlinkFast,
    Pulse,
}

/// The relay outputs consumed directly by the core (e.g. E-Stop latch).
/// Per-rail power relays are driven through the power driver instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayId {
    Relay1,
    Relay2,
}

/// Narrow hardware abstraction trait consumed by the safety monitor and
/// the state machine's LED-pattern entry/exit effects.
///
/// # Timing contract
///
/// | Operation | Max duration | RT constraint |
/// |---|---|---|
/// | `read_estop_channels` | a few µs | **HARD** — called every tick |
/// | `set_led` / `set_relay` | a few µs | **HARD** — called every tick |
///
/// Implementations must not block or allocate; they are called from the
/// orchestrator's cooperative tick loop (§5).
pub trait NarrowHal: Send {
    /// Read the two independent E-Stop channel inputs (CH1, CH2).
    fn read_estop_channels(&mut self) -> Result<(bool, bool), HalError>;

    /// Set the display pattern for one status LED.
    fn set_led(&mut self, id: LedId, pattern: LedPattern) -> Result<(), HalError>;

    /// Drive one relay output.
    fn set_relay(&mut self, id: RelayId, on: bool) -> Result<(), HalError>;

    /// Run a self-test of the HAL's own wiring (§4.6 `self_test`).
    /// Default implementation reports success; real HAL backends should
    /// verify channel continuity.
    fn self_test(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

/// LED pattern for every (state, LED) combination the state machine
/// drives on entry (§6 example: `Move` = Comm On, System BlinkFast, Error Off).
#[derive(Debug, Clone, Copy)]
pub struct LedPatternSet {
    pub power: LedPattern,
    pub system: LedPattern,
    pub communication: LedPattern,
    pub network: LedPattern,
    pub error: LedPattern,
}

impl LedPatternSet {
    pub fn apply(&self, hal: &mut dyn NarrowHal) -> Result<(), HalError> {
        hal.set_led(LedId::Power, self.power)?;
        hal.set_led(LedId::System, self.system)?;
        hal.set_led(LedId::Communication, self.communication)?;
        hal.set_led(LedId::Network, self.network)?;
        hal.set_led(LedId::Error, self.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHal {
        ch1: bool,
        ch2: bool,
        leds: std::collections::HashMap<LedId, LedPattern>,
    }

    impl NarrowHal for TestHal {
        fn read_estop_channels(&mut self) -> Result<(bool, bool), HalError> {
            Ok((self.ch1, self.ch2))
        }

        fn set_led(&mut self, id: LedId, pattern: LedPattern) -> Result<(), HalError> {
            self.leds.insert(id, pattern);
            Ok(())
        }

        fn set_relay(&mut self, _id: RelayId, _on: bool) -> Result<(), HalError> {
            Ok(())
        }
    }

    #[test]
    fn self_test_default_impl_succeeds() {
        let mut hal = TestHal {
            ch1: false,
            ch2: false,
            leds: Default::default(),
        };
        assert!(hal.self_test().is_ok());
    }

    #[test]
    fn led_pattern_set_applies_all_five_leds() {
        let mut hal = TestHal {
            ch1: false,
            ch2: false,
            leds: Default::default(),
        };
        let set = LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::BlinkFast,
            communication: LedPattern::On,
            network: LedPattern::Off,
            error: LedPattern::Off,
        };
        set.apply(&mut hal).unwrap();
        assert_eq!(hal.leds.get(&LedId::System), Some(&LedPattern::BlinkFast));
        assert_eq!(hal.leds.len(), 5);
    }

    #[test]
    fn hal_error_display_includes_message() {
        let err = HalError::CommunicationError("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
    }
}
