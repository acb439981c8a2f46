//! Slave module data model shared between the registry and module drivers.

use serde::{Deserialize, Serialize};

/// Kind of slave module addressed on the RS485 segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlaveKind {
    Unknown = 0,
    Motor = 1,
    Power = 2,
    Io = 3,
    Dock = 4,
    Sensor = 5,
    Safety = 6,
}

impl SlaveKind {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Motor),
            2 => Some(Self::Power),
            3 => Some(Self::Io),
            4 => Some(Self::Dock),
            5 => Some(Self::Sensor),
            6 => Some(Self::Safety),
            _ => None,
        }
    }
}

impl Default for SlaveKind {
    fn default() -> Self {
        SlaveKind::Unknown
    }
}

/// Health/presence status of a slave module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlaveStatus {
    Unknown = 0,
    Online = 1,
    Warning = 2,
    Error = 3,
    Offline = 4,
    Calibrating = 5,
    Initializing = 6,
}

impl SlaveStatus {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Online),
            2 => Some(Self::Warning),
            3 => Some(Self::Error),
            4 => Some(Self::Offline),
            5 => Some(Self::Calibrating),
            6 => Some(Self::Initializing),
            _ => None,
        }
    }
}

impl Default for SlaveStatus {
    fn default() -> Self {
        SlaveStatus::Unknown
    }
}

/// Health-band classification produced by the shared health-score algorithm (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
    Failed,
}

/// Map a clamped `0..=100` health score onto its band.
pub fn health_band(health_pct: u8) -> HealthBand {
    match health_pct {
        90..=100 => HealthBand::Excellent,
        80..=89 => HealthBand::Good,
        60..=79 => HealthBand::Fair,
        40..=59 => HealthBand::Poor,
        20..=39 => HealthBand::Critical,
        _ => HealthBand::Failed,
    }
}

/// Compute the shared health score (§4.4): start at 100, subtract
/// `10 * error_count`, `5 * warning_count`, and a latency penalty above
/// 100 ms, then clamp to `[0, 100]`.
pub fn health_score(error_count: u32, warning_count: u32, last_latency_ms: f64) -> u8 {
    let mut score = 100.0;
    score -= 10.0 * error_count as f64;
    score -= 5.0 * warning_count as f64;
    if last_latency_ms > 100.0 {
        score -= (last_latency_ms - 100.0) / 10.0;
    }
    score.clamp(0.0, 100.0) as u8
}

/// Bounded ASCII name/version field (≤32 bytes).
pub type BoundedName = heapless::String<32>;

/// One per discovered module (§3, I-R1..I-R3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveDescriptor {
    pub address: u8,
    pub kind: SlaveKind,
    pub name: BoundedName,
    pub version: BoundedName,
    pub status: SlaveStatus,
    pub health_pct: u8,
    pub last_seen_us: u64,
    pub last_health_us: u64,
    pub error_count: u32,
    pub warning_count: u32,
    pub last_latency_ms: f64,
}

impl SlaveDescriptor {
    pub fn new(address: u8, kind: SlaveKind, now_us: u64) -> Self {
        Self {
            address,
            kind,
            name: BoundedName::new(),
            version: BoundedName::new(),
            status: SlaveStatus::Unknown,
            health_pct: 100,
            last_seen_us: now_us,
            last_health_us: now_us,
            error_count: 0,
            warning_count: 0,
            last_latency_ms: 0.0,
        }
    }

    /// Recompute `health_pct` from (I-R3) the current error/warning
    /// counters and last observed latency.
    pub fn refresh_health(&mut self) {
        self.health_pct = health_score(self.error_count, self.warning_count, self.last_latency_ms);
    }

    /// (I-R2) whether this descriptor is stale given `now_us` and an
    /// offline threshold.
    pub fn is_stale(&self, now_us: u64, offline_threshold_us: u64) -> bool {
        now_us.saturating_sub(self.last_seen_us) > offline_threshold_us
    }
}

/// Events emitted by the slave registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Discovered,
    Online,
    Offline,
    Updated,
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_kind_round_trips() {
        for raw in 0u8..=6 {
            let kind = SlaveKind::from_u8(raw).expect("valid discriminant");
            assert_eq!(kind as u8, raw);
        }
        assert!(SlaveKind::from_u8(7).is_none());
    }

    #[test]
    fn slave_status_round_trips() {
        for raw in 0u8..=6 {
            let status = SlaveStatus::from_u8(raw).expect("valid discriminant");
            assert_eq!(status as u8, raw);
        }
        assert!(SlaveStatus::from_u8(7).is_none());
    }

    #[test]
    fn health_score_is_pure_function_of_inputs() {
        // P5: equal inputs, equal outputs.
        assert_eq!(health_score(1, 2, 50.0), health_score(1, 2, 50.0));
    }

    #[test]
    fn health_score_penalizes_errors_and_warnings() {
        assert_eq!(health_score(0, 0, 0.0), 100);
        assert_eq!(health_score(1, 0, 0.0), 90);
        assert_eq!(health_score(0, 2, 0.0), 90);
        assert_eq!(health_score(0, 0, 150.0), 95);
    }

    #[test]
    fn health_score_clamps_to_valid_range() {
        assert_eq!(health_score(50, 50, 0.0), 0);
    }

    #[test]
    fn health_band_boundaries_match_spec() {
        assert_eq!(health_band(100), HealthBand::Excellent);
        assert_eq!(health_band(90), HealthBand::Excellent);
        assert_eq!(health_band(89), HealthBand::Good);
        assert_eq!(health_band(60), HealthBand::Fair);
        assert_eq!(health_band(40), HealthBand::Poor);
        assert_eq!(health_band(20), HealthBand::Critical);
        assert_eq!(health_band(19), HealthBand::Failed);
        assert_eq!(health_band(0), HealthBand::Failed);
    }

    #[test]
    fn descriptor_refresh_health_uses_current_counters() {
        let mut desc = SlaveDescriptor::new(3, SlaveKind::Motor, 0);
        desc.error_count = 2;
        desc.refresh_health();
        assert_eq!(desc.health_pct, 80);
    }

    #[test]
    fn descriptor_staleness_respects_threshold() {
        let desc = SlaveDescriptor::new(2, SlaveKind::Power, 1_000_000);
        assert!(!desc.is_stale(1_500_000, 1_000_000));
        assert!(desc.is_stale(3_000_000, 1_000_000));
    }
}
