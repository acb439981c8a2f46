//! Shared helpers for the end-to-end scenario tests below: a
//! software-simulated RS485 slave that answers Modbus requests from a
//! small in-memory script instead of a real bus, plus the minimal
//! `core.toml` the orchestrator needs to start up.

use std::io;
use std::sync::{Arc, Mutex};

use oht_common::consts::{ADDRESS_MOTOR, ADDRESS_POWER};
use oht_core::bus::modbus::crc16;
use oht_core::bus::transport::{BusTransport, SerialLink};
use oht_core::config::CoreConfig;
use oht_core::hal_sim::SimulatedHal;
use oht_core::orchestrator::CoreOrchestrator;

/// What a [`ScriptedLink`] answers for each configured slave address. A
/// test drives the scenario by mutating this through the `Arc<Mutex<_>>`
/// handle it kept, since the link itself is moved onto the bus worker's
/// own thread once the orchestrator is built.
#[derive(Default, Clone)]
pub struct SlaveScript {
    pub motor_status: Option<[u16; 6]>,
    pub power_battery: Option<[u16; 4]>,
    pub motor_unresponsive: bool,
    pub power_unresponsive: bool,
}

pub type SharedScript = Arc<Mutex<SlaveScript>>;

pub fn shared_script(script: SlaveScript) -> SharedScript {
    Arc::new(Mutex::new(script))
}

/// A `SerialLink` that replays canned Modbus responses from a
/// [`SlaveScript`] instead of talking to a real port. Every status poll
/// and move command the motor/power drivers build is answered in one
/// `read()` call, matching the single write-then-read shape
/// `BusTransport::try_once` expects.
pub struct ScriptedLink {
    script: SharedScript,
    last_request: Vec<u8>,
}

impl ScriptedLink {
    pub fn new(script: SharedScript) -> Self {
        Self { script, last_request: Vec::new() }
    }
}

fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&body);
    body.push((crc & 0xFF) as u8);
    body.push((crc >> 8) as u8);
    body
}

impl SerialLink for ScriptedLink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.last_request = buf.to_vec();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let req = self.last_request.clone();
        if req.len() < 2 {
            return Ok(0);
        }
        let addr = req[0];
        let function = req[1];

        let script = self.script.lock().unwrap();
        let unresponsive = if addr == ADDRESS_MOTOR { script.motor_unresponsive } else { script.power_unresponsive };
        if unresponsive {
            return Ok(0);
        }

        let body = match function {
            0x03 | 0x04 => {
                let registers: Option<Vec<u16>> = if addr == ADDRESS_MOTOR {
                    script.motor_status.map(|block| block.to_vec())
                } else {
                    script.power_battery.map(|block| block.to_vec())
                };
                registers.map(|regs| {
                    let mut b = vec![addr, function, (regs.len() * 2) as u8];
                    for r in &regs {
                        b.extend_from_slice(&r.to_be_bytes());
                    }
                    b
                })
            }
            // Write single register (0x06): the ack echoes the request
            // verbatim, minus its own CRC.
            0x06 => Some(req[..req.len() - 2].to_vec()),
            // Write multiple registers (0x10): the ack is address,
            // function, start register, and register count — no payload.
            0x10 => Some(req[..6].to_vec()),
            _ => None,
        };

        match body {
            Some(raw) => {
                let framed = with_crc(raw);
                let n = framed.len();
                buf[..n].copy_from_slice(&framed);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encode a motor status block the way [`oht_core::drivers::motor::MotorDriver::apply_status`]
/// expects to decode it: status word, position (two registers), velocity
/// (two registers), fault code.
pub fn motor_status_block(status: u16, position: i32, velocity: i32, fault_code: u16) -> [u16; 6] {
    let pos = position as u32;
    let vel = velocity as u32;
    [status, (pos >> 16) as u16, (pos & 0xFFFF) as u16, (vel >> 16) as u16, (vel & 0xFFFF) as u16, fault_code]
}

pub mod motor_status {
    pub const READY: u16 = 0x0001;
    pub const ENABLED: u16 = 0x0002;
    pub const MOVING: u16 = 0x0004;
    pub const FAULT: u16 = 0x0008;
}

/// A battery telemetry block (voltage, current, soc, temp, each scaled by
/// 100) that decodes to a healthy reading with no alarms.
pub fn healthy_battery_block() -> [u16; 4] {
    [2450, 150, 8500, 3200]
}

/// Minimal `core.toml` with a short bus timeout/retry policy so a test
/// that drives an unresponsive slave doesn't spend real wall-clock time
/// waiting out the production defaults.
pub fn fast_retry_config() -> CoreConfig {
    let toml_str = r#"
[shared]
service_name = "oht_core_test"

[bus]
timeout_ms = 20
max_retries = 1
retry_delay_ms = 5
offline_threshold_ms = 50
"#;
    toml::from_str(toml_str).unwrap()
}

/// Build an orchestrator wired to a [`ScriptedLink`] plus the shared
/// script that drives it, and a simulated (always-safe-reading) HAL —
/// per-scenario tests supply E-Stop channel state directly through
/// `TickInputs` instead.
pub fn build_orchestrator(config: CoreConfig, script: SharedScript) -> CoreOrchestrator<ScriptedLink> {
    let link = ScriptedLink::new(script);
    let transport = BusTransport::with_link(link, config.bus.timeout_ms);
    CoreOrchestrator::new(config, transport, Box::new(SimulatedHal::new()))
}

/// Tick repeatedly (non-blocking — `poll_one_slave` never blocks the
/// caller) until `predicate` holds or a real wall-clock deadline passes,
/// so a test waits only as long as the bus worker's background thread
/// actually needs and never hangs if the condition is never met.
pub fn tick_until<L, F>(orch: &mut CoreOrchestrator<L>, start_us: u64, predicate: F) -> bool
where
    L: SerialLink + 'static,
    F: Fn(&CoreOrchestrator<L>) -> bool,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let mut now_us = start_us;
    while std::time::Instant::now() < deadline {
        orch.tick(oht_core::orchestrator::TickInputs { now_us, estop_ch1: true, estop_ch2: true });
        if predicate(orch) {
            return true;
        }
        now_us += 1;
    }
    false
}
