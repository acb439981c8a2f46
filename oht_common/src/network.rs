//! Network link data model shared between the link manager and its callers (§3, §4.8).

use serde::{Deserialize, Serialize};

use crate::consts::MAX_INTERFACES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceKind {
    Ethernet = 0,
    WiFi = 1,
    Cellular = 2,
    Vpn = 3,
}

impl InterfaceKind {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ethernet),
            1 => Some(Self::WiFi),
            2 => Some(Self::Cellular),
            3 => Some(Self::Vpn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfacePriority {
    Primary = 0,
    Secondary = 1,
    Backup = 2,
    Emergency = 3,
}

impl InterfacePriority {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Primary),
            1 => Some(Self::Secondary),
            2 => Some(Self::Backup),
            3 => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// Per-interface failover FSM state (§4.8): `Disconnected -> Connecting ->
/// Connected -> Failed -> Disconnected`, with `Disabled`/`Maintenance` as
/// off-tree states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
    Disabled = 4,
    Maintenance = 5,
}

impl InterfaceState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Failed),
            4 => Some(Self::Disabled),
            5 => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl Default for InterfaceState {
    fn default() -> Self {
        InterfaceState::Disconnected
    }
}

/// Arbitration mode for the link manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkMode {
    Auto = 0,
    Manual = 1,
    Disabled = 2,
}

impl Default for LinkMode {
    fn default() -> Self {
        LinkMode::Auto
    }
}

/// One configured uplink (§3). Identified by `id` (the OS interface name,
/// e.g. `eth0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: heapless::String<16>,
    pub kind: InterfaceKind,
    pub priority: InterfacePriority,
    pub enabled: bool,
    pub state: InterfaceState,
    pub health_pct: u8,
    pub failover_count: u32,
    pub last_check_us: u64,
    /// Consecutive health-check ticks the interface has been below
    /// `failover_threshold` while active; reset on a passing check.
    pub below_threshold_ticks: u32,
    /// First `now_us` at which the primary, once failed-over-away-from,
    /// began reporting sustained health again; `None` otherwise.
    pub recovery_since_us: Option<u64>,
}

impl NetworkInterface {
    pub fn new(id: &str, kind: InterfaceKind, priority: InterfacePriority) -> Self {
        Self {
            id: heapless::String::try_from(id).unwrap_or_default(),
            kind,
            priority,
            enabled: true,
            state: InterfaceState::Disconnected,
            health_pct: 0,
            failover_count: 0,
            last_check_us: 0,
            below_threshold_ticks: 0,
            recovery_since_us: None,
        }
    }
}

/// Aggregate network statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_failovers: u32,
    pub total_restores: u32,
    pub health_checks_run: u64,
    pub health_checks_failed: u64,
}

/// The live network link state bundle, exclusively owned by the link manager.
#[derive(Debug, Clone)]
pub struct NetworkLinkContext {
    pub mode: LinkMode,
    pub interfaces: heapless::Vec<NetworkInterface, MAX_INTERFACES>,
    pub active_idx: Option<usize>,
    pub primary_idx: Option<usize>,
    pub failover_in_progress: bool,
    pub stats: NetworkStats,
}

impl Default for NetworkLinkContext {
    fn default() -> Self {
        Self {
            mode: LinkMode::default(),
            interfaces: heapless::Vec::new(),
            active_idx: None,
            primary_idx: None,
            failover_in_progress: false,
            stats: NetworkStats::default(),
        }
    }
}

/// Events emitted by the network link manager (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    InterfaceConnected(heapless::String<16>),
    InterfaceDisconnected(heapless::String<16>),
    InterfaceFailed(heapless::String<16>),
    FailoverStarted,
    FailoverCompleted(heapless::String<16>),
    FailoverFailed,
    HealthCheckFailed(heapless::String<16>),
    PrimaryRestored(heapless::String<16>),
    ConfigurationChanged,
}
