//! Network link manager (§4.8): arbitrates between up to four configured
//! uplinks, picking the healthiest by priority and failing over when the
//! active link degrades for longer than the configured timeout.

use oht_common::consts::{
    DEFAULT_FAILOVER_THRESHOLD_PCT, DEFAULT_FAILOVER_TIMEOUT_MS, DEFAULT_HEALTH_CHECK_INTERVAL_MS, MAX_INTERFACES,
};
use oht_common::network::{InterfaceState, LinkMode, NetworkEvent, NetworkInterface, NetworkLinkContext};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("interface table is full ({0} interfaces)")]
    Full(usize),
    #[error("no interface named {0:?}")]
    NotFound(heapless::String<16>),
    #[error("interface {0:?} already configured")]
    AlreadyConfigured(heapless::String<16>),
}

/// Owns [`NetworkLinkContext`] and runs the health-check/failover/recovery
/// logic around it. Never touches a socket: callers supply each
/// interface's current health percentage from whatever probe they run.
pub struct LinkManager {
    ctx: NetworkLinkContext,
    failover_threshold_pct: u8,
    failover_timeout_us: u64,
    health_check_interval_us: u64,
}

impl LinkManager {
    pub fn new() -> Self {
        Self {
            ctx: NetworkLinkContext::default(),
            failover_threshold_pct: DEFAULT_FAILOVER_THRESHOLD_PCT,
            failover_timeout_us: DEFAULT_FAILOVER_TIMEOUT_MS * 1_000,
            health_check_interval_us: DEFAULT_HEALTH_CHECK_INTERVAL_MS * 1_000,
        }
    }

    pub fn context(&self) -> &NetworkLinkContext {
        &self.ctx
    }

    /// Override the failover/health-check policy (`CoreConfig::network`)
    /// instead of the hard-coded defaults, the same way
    /// [`crate::registry::SlaveRegistry::with_offline_threshold_ms`] takes
    /// its threshold from configuration.
    pub fn with_failover_policy(mut self, failover_threshold_pct: u8, failover_timeout_ms: u64, health_check_interval_ms: u64) -> Self {
        self.failover_threshold_pct = failover_threshold_pct;
        self.failover_timeout_us = failover_timeout_ms * 1_000;
        self.health_check_interval_us = health_check_interval_ms * 1_000;
        self
    }

    pub fn set_mode(&mut self, mode: LinkMode) {
        self.ctx.mode = mode;
    }

    pub fn add_interface(&mut self, iface: NetworkInterface) -> Result<(), LinkError> {
        if self.ctx.interfaces.iter().any(|i| i.id == iface.id) {
            return Err(LinkError::AlreadyConfigured(iface.id));
        }
        let is_primary = iface.priority == oht_common::network::InterfacePriority::Primary;
        self.ctx.interfaces.push(iface).map_err(|_| LinkError::Full(MAX_INTERFACES))?;
        if is_primary {
            self.ctx.primary_idx = Some(self.ctx.interfaces.len() - 1);
        }
        Ok(())
    }

    fn find_idx(&self, id: &str) -> Option<usize> {
        self.ctx.interfaces.iter().position(|i| i.id == id)
    }

    /// Record a health probe result for one interface and react: connect on
    /// first healthy report, flag degraded ticks on the active link, and
    /// run the failover/recovery checks (§4.8).
    pub fn record_health(&mut self, id: &str, health_pct: u8, now_us: u64) -> heapless::Vec<NetworkEvent, 4> {
        let mut events = heapless::Vec::new();
        let Some(idx) = self.find_idx(id) else { return events };

        let healthy = health_pct >= self.failover_threshold_pct;
        let iface = &mut self.ctx.interfaces[idx];
        iface.health_pct = health_pct;
        iface.last_check_us = now_us;
        self.ctx.stats.health_checks_run += 1;

        if !healthy {
            self.ctx.stats.health_checks_failed += 1;
        }

        match (iface.state, healthy) {
            (InterfaceState::Disconnected | InterfaceState::Connecting, true) => {
                iface.state = InterfaceState::Connected;
                let _ = events.push(NetworkEvent::InterfaceConnected(iface.id.clone()));
            }
            (InterfaceState::Connected, false) => {
                iface.below_threshold_ticks += 1;
            }
            (InterfaceState::Connected, true) => {
                iface.below_threshold_ticks = 0;
            }
            (InterfaceState::Failed, true) => {
                // Reconnected; `check_primary_recovery` below still gates
                // switching back to it on sustained health, not just this
                // one passing check.
                iface.state = InterfaceState::Connected;
            }
            _ => {}
        }

        if Some(idx) == self.ctx.active_idx {
            if let Some(ev) = self.check_failover(idx, now_us) {
                let _ = events.push(ev);
            }
        } else if self.ctx.active_idx.is_none() && healthy {
            if let Some(ev) = self.activate_best(now_us) {
                let _ = events.push(ev);
            }
        }

        if let Some(ev) = self.check_primary_recovery(now_us) {
            let _ = events.push(ev);
        }

        events
    }

    fn check_failover(&mut self, active_idx: usize, now_us: u64) -> Option<NetworkEvent> {
        if self.ctx.mode != LinkMode::Auto {
            return None;
        }
        let ticks_needed = self.failover_timeout_us / self.health_check_interval_us.max(1);
        let iface = &self.ctx.interfaces[active_idx];
        if (iface.below_threshold_ticks as u64) < ticks_needed.max(1) {
            return None;
        }

        self.ctx.interfaces[active_idx].state = InterfaceState::Failed;
        self.ctx.interfaces[active_idx].failover_count += 1;
        let failed_id = self.ctx.interfaces[active_idx].id.clone();
        self.ctx.active_idx = None;
        self.ctx.failover_in_progress = true;
        self.ctx.stats.total_failovers += 1;

        if let Some(ev) = self.activate_best(now_us) {
            self.ctx.failover_in_progress = false;
            Some(ev)
        } else {
            Some(NetworkEvent::InterfaceFailed(failed_id))
        }
    }

    /// Pick the healthy, non-failed, lowest-priority-number interface and
    /// make it active.
    fn activate_best(&mut self, _now_us: u64) -> Option<NetworkEvent> {
        let best = self
            .ctx
            .interfaces
            .iter()
            .enumerate()
            .filter(|(_, i)| i.enabled && i.state == InterfaceState::Connected && i.health_pct >= self.failover_threshold_pct)
            .min_by_key(|(_, i)| i.priority)
            .map(|(idx, _)| idx);

        if let Some(idx) = best {
            self.ctx.active_idx = Some(idx);
            Some(NetworkEvent::FailoverCompleted(self.ctx.interfaces[idx].id.clone()))
        } else {
            None
        }
    }

    /// §4.8: once the primary interface has been healthy for long enough
    /// after a failover away from it, switch back (Auto mode only).
    fn check_primary_recovery(&mut self, now_us: u64) -> Option<NetworkEvent> {
        if self.ctx.mode != LinkMode::Auto {
            return None;
        }
        let primary_idx = self.ctx.primary_idx?;
        if self.ctx.active_idx == Some(primary_idx) {
            self.ctx.interfaces[primary_idx].recovery_since_us = None;
            return None;
        }
        let primary = &mut self.ctx.interfaces[primary_idx];
        if primary.state != InterfaceState::Connected || primary.health_pct < self.failover_threshold_pct {
            primary.recovery_since_us = None;
            return None;
        }
        let since = *primary.recovery_since_us.get_or_insert(now_us);
        if now_us.saturating_sub(since) < self.failover_timeout_us {
            return None;
        }

        self.ctx.active_idx = Some(primary_idx);
        self.ctx.interfaces[primary_idx].recovery_since_us = None;
        self.ctx.stats.total_restores += 1;
        Some(NetworkEvent::PrimaryRestored(self.ctx.interfaces[primary_idx].id.clone()))
    }
}

impl Default for LinkManager {
    fn default() -> Self {
        Self::new()
    }
}
