//! C10 Orchestrator (§4.9, §5): binds every component into one
//! fixed-period cooperative tick. Mirrors the RT setup / absolute-time
//! sleep / simulation-mode fallback shape used elsewhere in this codebase
//! for deterministic cycle loops, but the cycle body itself implements the
//! seven-step tick sequence instead of a three-phase SHM read/process/write.
//!
//! ## RT Setup
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault the stack.
//! 3. `sched_setaffinity` — pin to the configured CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! All four are no-ops unless built with `--features rt`.
//!
//! ## Tick Body (§4.9)
//! 1. Safety monitor update — always runs first and pre-empts everything.
//! 2. Drain up to `max_events_per_tick` events from the priority queue.
//! 3. Feed each drained event to the state machine.
//! 4. One round-robin bus transaction (motor status, power status, and —
//!    while motion is active — the motor move command carrying the
//!    control loop's previous-tick output).
//! 5. Control-loop update when the state is `Move`, `Dock`, or `Homing`.
//! 6. One network interface health slot.
//! 7. Stats update, then sleep to the next tick deadline.

use oht_common::consts::{ERROR_DEDUP_WINDOW_MS, MAX_INTERFACES, MAX_SLAVES, SHUTDOWN_GRACE_TICKS};
use oht_common::hal::{LedPattern, LedPatternSet, NarrowHal};
use oht_common::network::NetworkInterface;
use oht_common::registry::{SlaveDescriptor, SlaveKind};
use oht_common::safety::SafetyContext;
use oht_common::state::{FaultKind, GuardFlags, SystemEvent, SystemState};
use thiserror::Error;
use tracing::warn;

use crate::bus::transport::{BusStats, BusStatus, BusTransport, Rs485Link, SerialLink, TransportError};
use crate::bus::worker::BusWorker;
use crate::clock::MonotonicClock;
use crate::config::CoreConfig;
use crate::control::{ControlLoop, Mode as ControlMode};
use crate::drivers::motor::MotorDriver;
use crate::drivers::power::PowerDriver;
use crate::network::link::LinkManager;
use crate::registry::SlaveRegistry;
use crate::safety::estop::{EstopMonitor, EstopOutcome};
use crate::state::machine::{StateMachine, TransitionOutcome};

const MAX_EVENT_QUEUE: usize = 32;
const MAX_DEDUP_ENTRIES: usize = 8;

/// §7: "The Orchestrator logs every error with component, operation, and
/// error kind; duplicate-suppression is based on (component, kind) within
/// a 1-second window." Tracks the last time each `(component, kind)` pair
/// was actually logged so a flapping bus link doesn't spam the log once
/// per tick. Fixed-capacity like every other hot-path collection in this
/// crate; once full, the oldest entry is evicted rather than letting the
/// table silently stop deduplicating new pairs.
#[derive(Default)]
struct ErrorLogDedup {
    entries: heapless::Vec<(&'static str, &'static str, u64), MAX_DEDUP_ENTRIES>,
}

impl ErrorLogDedup {
    /// Returns `true` (and records `now_us`) the first time `(component,
    /// kind)` is seen, or once `ERROR_DEDUP_WINDOW_MS` has elapsed since it
    /// was last logged; returns `false` — suppress — otherwise.
    fn should_log(&mut self, component: &'static str, kind: &'static str, now_us: u64) -> bool {
        let window_us = ERROR_DEDUP_WINDOW_MS * 1_000;
        if let Some(entry) = self.entries.iter_mut().find(|(c, k, _)| *c == component && *k == kind) {
            if now_us.saturating_sub(entry.2) < window_us {
                return false;
            }
            entry.2 = now_us;
            return true;
        }
        if self.entries.push((component, kind, now_us)).is_err() {
            if let Some((idx, _)) = self.entries.iter().enumerate().min_by_key(|(_, e)| e.2) {
                self.entries[idx] = (component, kind, now_us);
            }
        }
        true
    }
}

/// §7 error taxonomy, narrowed to the kinds a failed bus exchange can
/// actually surface as (`TransportError::Open` never occurs here — the
/// transport is already open by the time the worker is exchanging frames).
fn bus_error_kind(err: &TransportError) -> &'static str {
    match err {
        TransportError::Timeout(_) => "timeout",
        TransportError::Write(_) | TransportError::Open { .. } => "io_error",
        TransportError::FrameTooLarge(_) => "io_error",
        TransportError::Codec(_) => "crc_mismatch",
    }
}

/// Which outstanding bus transaction a `pending_bus_request` slot holds,
/// so the response can be decoded and applied the right way once it
/// arrives (§4.5: status polls decode a register block, a move command
/// decodes a write acknowledgement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusRequestKind {
    MotorStatus,
    PowerStatus,
    MotorMove,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("RT setup failed: {0}")]
    RtSetup(String),
    #[error("cycle overrun: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun { actual_ns: i64, budget_ns: i64 },
}

/// O(1) per-tick timing statistics, recorded with no allocation.
#[derive(Debug, Clone, Copy)]
pub struct TickStats {
    pub tick_count: u64,
    pub last_tick_ns: i64,
    pub min_tick_ns: i64,
    pub max_tick_ns: i64,
    pub sum_tick_ns: i64,
    pub missed_deadlines: u64,
}

impl TickStats {
    pub const fn new() -> Self {
        Self { tick_count: 0, last_tick_ns: 0, min_tick_ns: i64::MAX, max_tick_ns: 0, sum_tick_ns: 0, missed_deadlines: 0 }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, deadline_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        self.min_tick_ns = self.min_tick_ns.min(duration_ns);
        self.max_tick_ns = self.max_tick_ns.max(duration_ns);
        self.sum_tick_ns += duration_ns;
        if duration_ns > deadline_ns {
            self.missed_deadlines += 1;
        }
    }

    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 { 0 } else { self.sum_tick_ns / self.tick_count as i64 }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw per-tick inputs the orchestrator cannot derive on its own — the
/// caller (the binary, or a test) supplies the latest hardware readings.
/// This keeps [`CoreOrchestrator::tick`] a pure function of its arguments,
/// the same way the cycle-level components in this crate take their
/// inputs explicitly instead of reaching into global state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickInputs {
    pub now_us: u64,
    pub estop_ch1: bool,
    pub estop_ch2: bool,
}

/// What happened during one [`CoreOrchestrator::tick`] call, for logging
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub state: SystemState,
    pub estop: EstopOutcome,
    pub events_processed: usize,
}

/// Events fanned out to a [`CoreOrchestrator::subscribe`] callback (§6).
/// Kept deliberately narrow — state changes and faults are what external
/// callers (the CLI, a future diagnostics surface) actually need to react
/// to without polling [`CoreOrchestrator::snapshot`] every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEvent {
    StateChanged { from: SystemState, to: SystemState },
    FaultRaised(FaultKind),
    EstopTriggered,
}

/// A point-in-time read of everything external callers need (§6): no
/// mutable borrow of the orchestrator survives past the call, so a
/// diagnostics loop can hold the snapshot while the tick thread moves on.
#[derive(Debug, Clone)]
pub struct CoreSnapshot {
    pub state: SystemState,
    pub fault: FaultKind,
    pub slaves: heapless::Vec<SlaveDescriptor, MAX_SLAVES>,
    pub network: heapless::Vec<NetworkInterface, MAX_INTERFACES>,
    /// `id` of the network interface the link manager is currently routing
    /// through (§4.8), or `None` before any interface has gone healthy.
    pub active_interface: Option<heapless::String<16>>,
    pub safety: SafetyContext,
    pub stats: TickStats,
}

/// Per-state front-panel LED pattern (§6), applied once per tick so the
/// panel always reflects `state_machine.state()` even across ticks where
/// no transition occurred. `Error` is the only LED tied to something other
/// than the state machine's own state (it tracks `Fault`/`EStop`).
fn led_pattern_for_state(state: SystemState) -> LedPatternSet {
    match state {
        SystemState::Boot => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::BlinkSlow,
            communication: LedPattern::Off,
            network: LedPattern::Off,
            error: LedPattern::Off,
        },
        SystemState::Init | SystemState::Config => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::BlinkSlow,
            communication: LedPattern::BlinkSlow,
            network: LedPattern::Off,
            error: LedPattern::Off,
        },
        SystemState::Idle | SystemState::Safe => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::On,
            communication: LedPattern::On,
            network: LedPattern::On,
            error: LedPattern::Off,
        },
        SystemState::Move | SystemState::Dock => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::BlinkFast,
            communication: LedPattern::On,
            network: LedPattern::On,
            error: LedPattern::Off,
        },
        SystemState::Paused => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::Pulse,
            communication: LedPattern::On,
            network: LedPattern::On,
            error: LedPattern::Off,
        },
        SystemState::Fault => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::Off,
            communication: LedPattern::On,
            network: LedPattern::On,
            error: LedPattern::BlinkFast,
        },
        SystemState::EStop => LedPatternSet {
            power: LedPattern::On,
            system: LedPattern::Off,
            communication: LedPattern::On,
            network: LedPattern::On,
            error: LedPattern::On,
        },
        SystemState::Shutdown => LedPatternSet {
            power: LedPattern::BlinkSlow,
            system: LedPattern::Off,
            communication: LedPattern::Off,
            network: LedPattern::Off,
            error: LedPattern::Off,
        },
    }
}

/// Binds the state machine, safety monitor, slave registry, drivers,
/// network link manager, and control loop into one fixed-period
/// cooperative tick (§4.9, §5). Generic over the serial link so tests run
/// against a loopback instead of a real RS485 port.
pub struct CoreOrchestrator<L: SerialLink + 'static> {
    config: CoreConfig,
    clock: MonotonicClock,
    bus: BusWorker,
    pending_bus_request: Option<(BusRequestKind, u8, u64)>,
    consecutive_bus_failures: u32,
    error_dedup: ErrorLogDedup,
    registry: SlaveRegistry,
    motor: MotorDriver,
    power: PowerDriver,
    state_machine: StateMachine,
    estop: EstopMonitor,
    network: LinkManager,
    control: ControlLoop,
    event_queue: heapless::Vec<SystemEvent, MAX_EVENT_QUEUE>,
    target_position: i32,
    last_control_output: crate::control::ControlOutput,
    poll_turn: u8,
    stats: TickStats,
    shutdown_requested_at: Option<u64>,
    hal: Box<dyn NarrowHal>,
    subscriber: Option<Box<dyn FnMut(CoreEvent) + Send>>,
    location_ok: bool,
    _link: core::marker::PhantomData<L>,
}

impl<L: SerialLink + 'static> CoreOrchestrator<L> {
    pub fn new(config: CoreConfig, transport: BusTransport<L>, hal: Box<dyn NarrowHal>) -> Self {
        let now_us = 0;
        let registry = SlaveRegistry::new()
            .with_sweep_range(config.bus.sweep_start, config.bus.sweep_end)
            .with_offline_threshold_ms(config.bus.offline_threshold_ms);
        let motor = MotorDriver::new(oht_common::consts::ADDRESS_MOTOR, config.motor_limits);
        let power = PowerDriver::new(oht_common::consts::ADDRESS_POWER, config.power_thresholds);
        let control = ControlLoop::new(config.control.position, config.control.velocity, config.motor_limits);
        let mut network = LinkManager::new().with_failover_policy(
            config.network.failover_threshold_pct,
            config.network.failover_timeout_ms,
            config.network.health_check_interval_ms,
        );
        for iface in &config.network.interfaces {
            let mut ni = oht_common::network::NetworkInterface::new(&iface.id, iface.kind, iface.priority);
            ni.enabled = iface.enabled;
            let _ = network.add_interface(ni);
        }
        let transport = transport.with_retry_policy(config.bus.max_retries, config.bus.retry_delay_ms);

        Self {
            config,
            clock: MonotonicClock::new(),
            bus: BusWorker::spawn(transport),
            pending_bus_request: None,
            consecutive_bus_failures: 0,
            error_dedup: ErrorLogDedup::default(),
            registry,
            motor,
            power,
            state_machine: StateMachine::new(now_us),
            estop: EstopMonitor::new(),
            network,
            control,
            event_queue: heapless::Vec::new(),
            target_position: 0,
            last_control_output: crate::control::ControlOutput {
                velocity_setpoint: 0.0,
                output: 0.0,
                state: crate::control::ControlState::Ok,
            },
            poll_turn: 0,
            stats: TickStats::new(),
            shutdown_requested_at: None,
            hal,
            subscriber: None,
            location_ok: true,
            _link: core::marker::PhantomData,
        }
    }

    /// Feed the hoist's position-sensor reading into the `move_ready`
    /// guard (§4.7), the same way [`Self::record_network_health`] feeds a
    /// link probe into the network guard. Defaults to `true`; a caller
    /// driving real position hardware clears it when the carriage strays
    /// outside its known-safe envelope.
    pub fn set_location_ok(&mut self, ok: bool) {
        self.location_ok = ok;
    }

    pub fn state(&self) -> SystemState {
        self.state_machine.state()
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// §6: register the single fan-out callback for state-change and fault
    /// events. A later call replaces the previous callback — there is one
    /// subscriber slot, matching the "single fan-out" wording rather than
    /// an unbounded observer list (which would need a heap-growing `Vec`,
    /// out of place in a crate that keeps every hot-path collection
    /// fixed-capacity).
    pub fn subscribe(&mut self, callback: Box<dyn FnMut(CoreEvent) + Send>) {
        self.subscriber = Some(callback);
    }

    /// §6: a point-in-time read of state, fault, registry, network, safety,
    /// and tick statistics, for a diagnostics surface or test assertion
    /// that shouldn't need to know the orchestrator's internal field names.
    pub fn snapshot(&self) -> CoreSnapshot {
        let mut slaves = heapless::Vec::new();
        for desc in self.registry.iter() {
            let _ = slaves.push(desc.clone());
        }
        let mut network = heapless::Vec::new();
        for iface in self.network.context().interfaces.iter() {
            let _ = network.push(iface.clone());
        }
        let active_interface = self.network.context().active_idx.and_then(|idx| self.network.context().interfaces.get(idx)).map(|iface| iface.id.clone());
        CoreSnapshot {
            state: self.state_machine.state(),
            fault: self.state_machine.context().current_fault,
            slaves,
            network,
            active_interface,
            safety: self.estop.context().clone(),
            stats: self.stats,
        }
    }

    fn notify(&mut self, event: CoreEvent) {
        if let Some(callback) = self.subscriber.as_mut() {
            callback(event);
        }
    }

    /// Feed a live health reading for one configured network interface
    /// (§4.8, §6). The tick loop's own `poll_one_interface` only re-applies
    /// the last known reading round-robin fashion — a real probe (ICMP
    /// ping, carrier-state check, whatever the platform uses) calls this
    /// whenever it has a fresh measurement.
    pub fn record_network_health(&mut self, id: &str, health_pct: u8, now_us: u64) {
        let _ = self.network.record_health(id, health_pct, now_us);
    }

    /// Confirm an E-Stop reset once the dual channels have re-agreed safe
    /// (§4.6): this is the safety circuit's physical reset input, a
    /// distinct signal from `inputs.estop_ch1/ch2` themselves, so a held
    /// E-Stop never clears itself just because the channels happen to
    /// re-close — an operator (or a supervisory system) must assert it.
    pub fn confirm_estop_reset(&mut self, now_us: u64) -> Result<(), crate::safety::estop::EstopError> {
        self.estop.confirm_reset(now_us)
    }

    /// Clear a latched E-Stop hardware fault (channel mismatch, §4.6 Open
    /// Question: fatal until explicit clear). Only valid once the channels
    /// agree again.
    pub fn clear_estop_fault(&mut self, now_us: u64) -> Result<(), crate::safety::estop::EstopError> {
        self.estop.clear_fault(now_us)
    }

    /// §5: request a cooperative shutdown. Takes effect once the grace
    /// period (`SHUTDOWN_GRACE_TICKS` ticks) has elapsed so in-flight bus
    /// transactions and state-machine effects settle first.
    pub fn request_shutdown(&mut self, now_us: u64) {
        if self.shutdown_requested_at.is_none() {
            self.shutdown_requested_at = Some(now_us);
            let _ = self.push_event(SystemEvent::Shutdown);
        }
    }

    pub fn shutdown_grace_elapsed(&self, now_us: u64) -> bool {
        match self.shutdown_requested_at {
            Some(requested) => now_us.saturating_sub(requested) >= SHUTDOWN_GRACE_TICKS as u64 * self.config.tick_period_ms * 1_000,
            None => false,
        }
    }

    /// Queue an external command (§4.9 step 2). Safety-priority events
    /// (`EStopTriggered`, `Shutdown`) jump to the front so the next drain
    /// sees them first, regardless of arrival order.
    pub fn push_event(&mut self, event: SystemEvent) -> bool {
        if event.is_safety_priority() {
            self.event_queue.insert(0, event).is_ok()
        } else {
            self.event_queue.push(event).is_ok()
        }
    }

    /// Run one tick of the seven-step sequence (§4.9). Returns a summary
    /// for logging; never panics on a degraded bus or network link — those
    /// surface through `stats()`/driver state instead.
    pub fn tick(&mut self, inputs: TickInputs) -> TickSummary {
        // Step 1: safety monitor, always first, always synchronous.
        let estop_outcome = self.estop.tick(inputs.estop_ch1, inputs.estop_ch2, inputs.now_us);
        if matches!(estop_outcome, EstopOutcome::Triggered | EstopOutcome::Faulted) {
            self.control.emergency_stop();
            let _ = self.push_event(SystemEvent::EStopTriggered);
            self.notify(CoreEvent::EstopTriggered);
        }

        self.state_machine.set_guards(self.current_guards());

        // §4.7: a state that has overstayed its configured timeout
        // synthesizes and processes its own `Timeout` event before any
        // queued event is drained, so P9 holds regardless of queue depth.
        if let Some(TransitionOutcome::Accepted { from, to, .. }) = self.state_machine.update(inputs.now_us) {
            self.on_state_entered(to);
            self.notify(CoreEvent::StateChanged { from, to });
        }

        // Step 2/3: drain the priority queue and feed the state machine.
        let mut events_processed = 0usize;
        while events_processed < self.config.max_events_per_tick {
            let Some(event) = self.next_queued_event() else { break };
            if let SystemEvent::MoveCmd { target_position } = &event {
                self.target_position = *target_position;
            }
            if let SystemEvent::FaultDetected { kind } = &event {
                self.notify(CoreEvent::FaultRaised(*kind));
            }
            if let TransitionOutcome::Accepted { from, to, .. } = self.state_machine.handle_event(event, inputs.now_us) {
                self.on_state_entered(to);
                self.notify(CoreEvent::StateChanged { from, to });
            }
            events_processed += 1;
        }

        // Step 4: one round-robin bus transaction, then the staleness sweep
        // (§4.4 I-R2, §7): a slave that crosses `offline_threshold_ms`
        // without a successful exchange is demoted to `Offline` and raises
        // a communication fault, the way repeated bus timeouts are meant to
        // escalate per §7's IoError/Timeout propagation policy.
        self.poll_one_slave(inputs.now_us);
        let newly_offline = self.registry.sweep_staleness(inputs.now_us);
        if !newly_offline.is_empty() {
            let _ = self.push_event(SystemEvent::FaultDetected { kind: FaultKind::Communication });
        }

        // Step 5: cascaded control loop, only while the system allows motion.
        if self.control_active() {
            let dt_s = self.config.tick_period_ms as f64 / 1000.0;
            let output = self.control.update(
                self.target_position,
                self.motor.data().current_position,
                self.motor.data().current_velocity,
                dt_s,
            );
            if output.state == crate::control::ControlState::Error {
                // Per `ControlLoop::update`'s contract, an `Error` output
                // must never reach the bus; keep the last good setpoint
                // and let the fault event move the state machine out of
                // `Move`/`Dock` before the stale value could be reused.
                let _ = self.push_event(SystemEvent::FaultDetected { kind: FaultKind::Motor });
            } else {
                self.last_control_output = output;
            }
        }

        // Step 6: one network interface health slot.
        self.poll_one_interface(inputs.now_us);

        let _ = led_pattern_for_state(self.state_machine.state()).apply(&mut *self.hal);

        TickSummary { state: self.state_machine.state(), estop: estop_outcome, events_processed }
    }

    /// Read the dual E-Stop channels through the HAL (§6). Falls back to
    /// the triggered state on a HAL error — a broken sensor must never be
    /// mistaken for a held-safe one.
    fn read_estop_channels(&mut self) -> (bool, bool) {
        self.hal.read_estop_channels().unwrap_or((false, false))
    }

    fn next_queued_event(&mut self) -> Option<SystemEvent> {
        if self.event_queue.is_empty() { None } else { Some(self.event_queue.remove(0)) }
    }

    fn current_guards(&self) -> GuardFlags {
        let bus_stats = BusStats { consecutive_failures: self.consecutive_bus_failures, ..Default::default() };
        GuardFlags {
            system_ready: true,
            safety_ok: self.estop.context().estop_state == oht_common::safety::EstopState::Safe,
            comms_ok: !matches!(bus_stats.status(), BusStatus::Down),
            sensors_ok: true,
            location_ok: self.location_ok,
            target_valid: true,
        }
    }

    fn control_active(&self) -> bool {
        matches!(self.state_machine.state(), SystemState::Move | SystemState::Dock)
            || self.control.mode() == ControlMode::Homing
    }

    /// React to newly-entered states the way the control loop's mode
    /// needs to track them (§4.9 I-C1: mode changes reset the PID state).
    fn on_state_entered(&mut self, to: SystemState) {
        match to {
            SystemState::Move => self.control.set_mode(ControlMode::Position),
            SystemState::Dock => self.control.set_mode(ControlMode::Homing),
            SystemState::EStop | SystemState::Fault => {
                self.control.emergency_stop();
            }
            SystemState::Idle | SystemState::Safe | SystemState::Paused => self.control.set_mode(ControlMode::Idle),
            _ => {}
        }
    }

    /// One round-robin bus transaction *slot* per tick (§4.9 step 4, §5):
    /// non-blocking. If a request is already outstanding this either
    /// applies its response (if the worker has finished) or abandons it
    /// past its deadline; otherwise it submits the next slot's request.
    /// The rotation covers motor status, power status, and — the bus
    /// transaction that carries C9's output to C5 (§4.5, §4.9 step 5) —
    /// the motor move command, so all three still add up to the single
    /// scheduled transaction §4.9 allows per tick. Never blocks the tick —
    /// the worker thread owns the only blocking I/O (§5 suspension point (b)).
    fn poll_one_slave(&mut self, now_us: u64) {
        if let Some((kind, address, _issued_at)) = self.pending_bus_request {
            match self.bus.poll() {
                Some(Ok(response)) => {
                    self.pending_bus_request = None;
                    self.consecutive_bus_failures = 0;
                    match kind {
                        BusRequestKind::MotorStatus => {
                            if let Ok(decoded) = crate::bus::modbus::decode_read_registers_response(&response) {
                                self.motor.apply_status(&decoded.registers);
                            }
                        }
                        BusRequestKind::PowerStatus => {
                            if let Ok(decoded) = crate::bus::modbus::decode_read_registers_response(&response) {
                                self.power.apply_battery_block(&decoded.registers);
                            }
                        }
                        BusRequestKind::MotorMove => {
                            let _ = crate::bus::modbus::decode_write_ack(&response);
                        }
                    }
                    if self.registry.get(address).is_none() {
                        let slave_kind = if address == self.motor.address() { SlaveKind::Motor } else { SlaveKind::Power };
                        let _ = self.registry.register(address, slave_kind, now_us);
                    }
                    let _ = self.registry.mark_online(address, now_us, 0.0);
                }
                Some(Err(err)) => {
                    self.pending_bus_request = None;
                    self.consecutive_bus_failures = self.consecutive_bus_failures.saturating_add(1);
                    let _ = self.registry.mark_error(address);
                    let kind = bus_error_kind(&err);
                    if self.error_dedup.should_log("bus", kind, now_us) {
                        warn!(component = "bus", operation = "exchange", kind, address, error = %err, "bus transaction failed");
                    }
                }
                None => {
                    let deadline_us = self.config.bus.timeout_ms * 1_000;
                    if now_us.saturating_sub(_issued_at) >= deadline_us {
                        self.bus.abandon();
                        self.pending_bus_request = None;
                        self.consecutive_bus_failures = self.consecutive_bus_failures.saturating_add(1);
                        let _ = self.registry.mark_error(address);
                        if self.error_dedup.should_log("bus", "timeout", now_us) {
                            warn!(component = "bus", operation = "exchange", kind = "timeout", address, "bus transaction deadline exceeded");
                        }
                    }
                }
            }
            return;
        }

        let slot = self.poll_turn;
        self.poll_turn = (self.poll_turn + 1) % 3;

        let (kind, address, frame_result) = match slot {
            0 => (BusRequestKind::MotorStatus, self.motor.address(), self.motor.build_poll_frame()),
            1 => (BusRequestKind::PowerStatus, self.power.address(), self.power.build_battery_poll_frame()),
            _ if self.control_active() => {
                let safety_ok = self.current_guards().safety_ok;
                let velocity = self.last_control_output.output.round() as i32;
                (
                    BusRequestKind::MotorMove,
                    self.motor.address(),
                    self.motor.build_move_frame(safety_ok, self.target_position, velocity),
                )
            }
            _ => (BusRequestKind::MotorStatus, self.motor.address(), self.motor.build_poll_frame()),
        };
        let Ok(frame) = frame_result else { return };

        if self.bus.submit(frame) {
            self.pending_bus_request = Some((kind, address, now_us));
        }
    }

    /// One network interface health slot per tick. In the absence of a
    /// live probe this reports the link manager's own last-seen health, so
    /// the failover/recovery logic keeps ticking even when nothing new
    /// has been measured yet.
    fn poll_one_interface(&mut self, now_us: u64) {
        let Some(iface) = self.network.context().interfaces.iter().cycle().nth(self.stats.tick_count as usize % self.network.context().interfaces.len().max(1)) else { return };
        let id = iface.id.clone();
        let health = iface.health_pct;
        let _ = self.network.record_health(id.as_str(), health, now_us);
    }

    /// Record one tick's duration against its deadline (§4.9 step 7): a
    /// missed deadline is counted, never made up by shortening the next
    /// sleep.
    pub fn record_tick(&mut self, duration_ns: i64) {
        let deadline_ns = self.config.tick_period_ms as i64 * 1_000_000;
        self.stats.record(duration_ns, deadline_ns);
    }
}

impl CoreOrchestrator<Rs485Link> {
    pub fn open(config: CoreConfig, hal: Box<dyn NarrowHal>) -> Result<Self, crate::error::CoreError> {
        let transport = BusTransport::open(&config.bus.device, config.bus.baud, config.bus.timeout_ms)?;
        Ok(Self::new(config, transport, hal))
    }

    /// Enter the tick loop. Never returns under normal operation;
    /// `request_shutdown` (or `should_shutdown` returning `true`) followed
    /// by the grace period ends it. `should_shutdown` is polled once per
    /// tick so a signal handler can request a clean stop from outside the
    /// loop (e.g. SIGINT/SIGTERM, §6). The dual E-Stop channels are read
    /// through the HAL handed to `open`/`new`, not from the caller.
    pub fn run(&mut self, mut should_shutdown: impl FnMut() -> bool) -> Result<(), OrchestratorError> {
        rt_setup(self.config.rt.cpu_core, self.config.rt.priority)?;

        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(&mut should_shutdown)
        }
        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(&mut should_shutdown)
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, should_shutdown: &mut impl FnMut() -> bool) -> Result<(), OrchestratorError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let tick_ns = self.config.tick_period_ms as i64 * 1_000_000;
        let mut next_wake = clock_gettime(clock).map_err(|e| OrchestratorError::RtSetup(format!("clock_gettime: {e}")))?;

        loop {
            next_wake = timespec_add_ns(next_wake, tick_ns);
            let cycle_start = clock_gettime(clock).map_err(|e| OrchestratorError::RtSetup(format!("clock_gettime: {e}")))?;

            if should_shutdown() {
                self.request_shutdown(self.clock.now_us());
            }
            let (ch1, ch2) = self.read_estop_channels();
            self.tick(TickInputs { now_us: self.clock.now_us(), estop_ch1: ch1, estop_ch2: ch2 });

            let cycle_end = clock_gettime(clock).map_err(|e| OrchestratorError::RtSetup(format!("clock_gettime: {e}")))?;
            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            self.record_tick(duration_ns);

            if self.shutdown_requested_at.is_some() && self.shutdown_grace_elapsed(self.clock.now_us()) {
                return Ok(());
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, should_shutdown: &mut impl FnMut() -> bool) -> Result<(), OrchestratorError> {
        use std::time::{Duration, Instant};

        let tick_duration = Duration::from_millis(self.config.tick_period_ms);

        loop {
            let cycle_start = Instant::now();
            if should_shutdown() {
                self.request_shutdown(self.clock.now_us());
            }
            let (ch1, ch2) = self.read_estop_channels();
            self.tick(TickInputs { now_us: self.clock.now_us(), estop_ch1: ch1, estop_ch2: ch2 });

            let elapsed = cycle_start.elapsed();
            self.record_tick(elapsed.as_nanos() as i64);

            if self.shutdown_requested_at.is_some() && self.shutdown_grace_elapsed(self.clock.now_us()) {
                return Ok(());
            }

            if let Some(remaining) = tick_duration.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }
}

/// Lock all current and future memory pages. No-op without `--features rt`.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), OrchestratorError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE).map_err(|e| OrchestratorError::RtSetup(format!("mlockall: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), OrchestratorError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), OrchestratorError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset.set(cpu).map_err(|e| OrchestratorError::RtSetup(format!("CpuSet::set({cpu}): {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset).map_err(|e| OrchestratorError::RtSetup(format!("sched_setaffinity: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), OrchestratorError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), OrchestratorError> {
    let param = libc::sched_param { sched_priority: priority };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(OrchestratorError::RtSetup(format!("sched_setscheduler(SCHED_FIFO, {priority}): {err}")));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), OrchestratorError> {
    Ok(())
}

fn rt_setup(cpu_core: usize, priority: i32) -> Result<(), OrchestratorError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(priority)?;
    Ok(())
}

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

#[cfg(test)]
mod error_dedup_tests {
    use super::ErrorLogDedup;
    use oht_common::consts::ERROR_DEDUP_WINDOW_MS;

    #[test]
    fn first_occurrence_of_a_pair_always_logs() {
        let mut dedup = ErrorLogDedup::default();
        assert!(dedup.should_log("bus", "timeout", 0));
    }

    #[test]
    fn repeat_within_the_window_is_suppressed() {
        let mut dedup = ErrorLogDedup::default();
        assert!(dedup.should_log("bus", "timeout", 0));
        assert!(!dedup.should_log("bus", "timeout", ERROR_DEDUP_WINDOW_MS * 1_000 - 1));
    }

    #[test]
    fn repeat_after_the_window_logs_again() {
        let mut dedup = ErrorLogDedup::default();
        assert!(dedup.should_log("bus", "timeout", 0));
        assert!(dedup.should_log("bus", "timeout", ERROR_DEDUP_WINDOW_MS * 1_000));
    }

    #[test]
    fn distinct_kinds_for_the_same_component_are_independent() {
        let mut dedup = ErrorLogDedup::default();
        assert!(dedup.should_log("bus", "timeout", 0));
        assert!(dedup.should_log("bus", "io_error", 0));
    }
}
