//! Configuration types

use crate::engine::EngineConfig;
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// User-defined configuration (natsim.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// `[simulator]` section. All fields optional; defaults model a typical
/// home-router NAPT profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Public address of the simulated router.
    pub public_ip: Ipv4Addr,
    /// First public port handed out.
    pub port_base: u16,
    /// Last allocatable public port.
    pub port_max: u16,
    /// Active lifetime of a translation entry, seconds.
    pub entry_timeout_secs: u64,
    /// Visibility window for Expired entries before eviction, seconds.
    pub grace_period_secs: u64,
    /// Expiration sweep period, milliseconds.
    pub sweep_interval_ms: u64,
    /// Pacing between packet stage transitions, milliseconds.
    pub stage_delay_ms: u64,
    /// Outbound trip time added before a response delay starts, milliseconds.
    pub response_transit_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            public_ip: Ipv4Addr::new(203, 0, 113, 5),
            port_base: 50000,
            port_max: 65535,
            entry_timeout_secs: 30,
            grace_period_secs: 5,
            sweep_interval_ms: 1000,
            stage_delay_ms: 500,
            response_transit_ms: 1500,
        }
    }
}

impl SimulatorConfig {
    /// Lower into the typed config the engine consumes.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            public_ip: self.public_ip,
            port_base: self.port_base,
            port_max: self.port_max,
            entry_timeout: Duration::from_secs(self.entry_timeout_secs),
            grace_period: Duration::from_secs(self.grace_period_secs),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            stage_delay: Duration::from_millis(self.stage_delay_ms),
            response_transit: Duration::from_millis(self.response_transit_ms),
        }
    }
}
