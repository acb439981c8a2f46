//! C4 Slave Registry: tracks discovered modules by address, applies
//! liveness/staleness rules, and runs the discovery sweep over the RS485
//! address range. The data model itself (`SlaveDescriptor` et al.) lives in
//! [`oht_common::registry`]; this module is the operational layer around it.

use oht_common::consts::{DEFAULT_OFFLINE_THRESHOLD_MS, DEFAULT_SWEEP_END, DEFAULT_SWEEP_START, MAX_SLAVES};
use oht_common::registry::{RegistryEvent, SlaveDescriptor, SlaveKind, SlaveStatus};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry is full ({0} slaves)")]
    Full(usize),
    #[error("no slave registered at address {0}")]
    NotFound(u8),
    #[error("address {0} is already registered")]
    AlreadyRegistered(u8),
}

/// Fixed-capacity table of discovered slaves plus the discovery sweep
/// cursor, with a callback sink for registry events (§4.4).
pub struct SlaveRegistry {
    slaves: heapless::Vec<SlaveDescriptor, MAX_SLAVES>,
    offline_threshold_us: u64,
    sweep_start: u8,
    sweep_end: u8,
    next_sweep_addr: u8,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self {
            slaves: heapless::Vec::new(),
            offline_threshold_us: DEFAULT_OFFLINE_THRESHOLD_MS * 1_000,
            sweep_start: DEFAULT_SWEEP_START,
            sweep_end: DEFAULT_SWEEP_END,
            next_sweep_addr: DEFAULT_SWEEP_START,
        }
    }

    pub fn with_sweep_range(mut self, start: u8, end: u8) -> Self {
        self.sweep_start = start;
        self.sweep_end = end;
        self.next_sweep_addr = start;
        self
    }

    /// Override the staleness threshold (`CoreConfig::bus.offline_threshold_ms`)
    /// instead of the hard-coded default.
    pub fn with_offline_threshold_ms(mut self, offline_threshold_ms: u64) -> Self {
        self.offline_threshold_us = offline_threshold_ms * 1_000;
        self
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    pub fn get(&self, address: u8) -> Option<&SlaveDescriptor> {
        self.slaves.iter().find(|s| s.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlaveDescriptor> {
        self.slaves.iter()
    }

    /// Next address the discovery sweep should probe, wrapping at
    /// `sweep_end` back to `sweep_start` (§4.4).
    pub fn next_sweep_address(&mut self) -> u8 {
        let addr = self.next_sweep_addr;
        self.next_sweep_addr = if addr >= self.sweep_end { self.sweep_start } else { addr + 1 };
        addr
    }

    /// Register a newly discovered slave. (I-R1: unique by address.)
    pub fn register(&mut self, address: u8, kind: SlaveKind, now_us: u64) -> Result<&SlaveDescriptor, RegistryError> {
        if self.get(address).is_some() {
            return Err(RegistryError::AlreadyRegistered(address));
        }
        let mut desc = SlaveDescriptor::new(address, kind, now_us);
        desc.status = SlaveStatus::Online;
        self.slaves.push(desc).map_err(|_| RegistryError::Full(self.slaves.len()))?;
        self.get(address).ok_or(RegistryError::NotFound(address))
    }

    fn find_mut(&mut self, address: u8) -> Option<&mut SlaveDescriptor> {
        self.slaves.iter_mut().find(|s| s.address == address)
    }

    /// Update liveness/latency counters after a successful exchange.
    pub fn mark_online(&mut self, address: u8, now_us: u64, latency_ms: f64) -> Result<RegistryEvent, RegistryError> {
        let desc = self.find_mut(address).ok_or(RegistryError::NotFound(address))?;
        let was_offline = desc.status == SlaveStatus::Offline;
        desc.status = SlaveStatus::Online;
        desc.last_seen_us = now_us;
        desc.last_latency_ms = latency_ms;
        desc.refresh_health();
        Ok(if was_offline { RegistryEvent::Online } else { RegistryEvent::Updated })
    }

    /// Record a failed exchange; escalates the warning/error counters and
    /// recomputes health (§4.4).
    pub fn mark_error(&mut self, address: u8) -> Result<RegistryEvent, RegistryError> {
        let desc = self.find_mut(address).ok_or(RegistryError::NotFound(address))?;
        desc.error_count = desc.error_count.saturating_add(1);
        desc.status = SlaveStatus::Error;
        desc.refresh_health();
        Ok(RegistryEvent::Updated)
    }

    /// (I-R2) Sweep every slave for staleness against `now_us` and flag
    /// any that crossed the offline threshold since last seen. Returns the
    /// addresses that transitioned to offline this call.
    pub fn sweep_staleness(&mut self, now_us: u64) -> heapless::Vec<u8, MAX_SLAVES> {
        let mut newly_offline = heapless::Vec::new();
        for desc in self.slaves.iter_mut() {
            if desc.status != SlaveStatus::Offline && desc.is_stale(now_us, self.offline_threshold_us) {
                desc.status = SlaveStatus::Offline;
                let _ = newly_offline.push(desc.address);
            }
        }
        newly_offline
    }

    pub fn unregister(&mut self, address: u8) -> Result<(), RegistryError> {
        let idx = self.slaves.iter().position(|s| s.address == address).ok_or(RegistryError::NotFound(address))?;
        self.slaves.swap_remove(idx);
        Ok(())
    }
}

impl Default for SlaveRegistry {
    fn default() -> Self {
        Self::new()
    }
}
