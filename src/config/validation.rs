//! Configuration validation

use super::Config;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_ports(config, &mut result);
    validate_timers(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    let sim = &config.simulator;

    if sim.port_base > sim.port_max {
        result.error(format!(
            "simulator: invalid port range - base ({}) > max ({})",
            sim.port_base, sim.port_max
        ));
    }

    if sim.port_base < 49152 {
        result.warn(format!(
            "simulator.port_base: {} is below the dynamic port range (49152-65535)",
            sim.port_base
        ));
    }

    if sim.public_ip.is_private() || sim.public_ip.is_loopback() {
        result.warn(format!(
            "simulator.public_ip: {} is not a public address",
            sim.public_ip
        ));
    }
}

fn validate_timers(config: &Config, result: &mut ValidationResult) {
    let sim = &config.simulator;

    if sim.entry_timeout_secs == 0 {
        result.error("simulator.entry_timeout_secs: must be greater than zero");
    }

    if sim.sweep_interval_ms == 0 {
        result.error("simulator.sweep_interval_ms: must be greater than zero");
    }

    // The staleness window between an entry aging out and the sweep
    // recording it is one sweep period; it has to fit inside the grace
    // period or observers can miss the Expired state entirely.
    if sim.grace_period_secs == 0 {
        result.warn(
            "simulator.grace_period_secs: 0 evicts entries immediately on expiry; \
             observers will never see the Expired state",
        );
    } else if sim.sweep_interval_ms >= sim.grace_period_secs * 1000 {
        result.error(format!(
            "simulator: sweep_interval_ms ({}) must be shorter than grace_period_secs ({}s)",
            sim.sweep_interval_ms, sim.grace_period_secs
        ));
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    let known_levels = ["error", "warn", "info", "debug", "trace"];
    if !known_levels.contains(&config.log.level.to_lowercase().as_str()) {
        result.warn(format!(
            "log.level: unknown level {:?}, falling back to info",
            config.log.level
        ));
    }

    let known_formats = ["pretty", "compact", "json"];
    if !known_formats.contains(&config.log.format.as_str()) {
        result.warn(format!(
            "log.format: unknown format {:?}, falling back to pretty",
            config.log.format
        ));
    }
}
