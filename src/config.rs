//! Static emulator configuration, read once at startup from the environment.

use anyhow::{anyhow, ensure, Context};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_WORKING_FILE: &str =
    "/var/volatile/tmp/dbus-multiplus-emulator_data_watt_hours.json";
pub const DEFAULT_STORAGE_FILE: &str = "/data/etc/dbus-multiplus-emulator/data_watt_hours.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::L1 => "L1",
            Phase::L2 => "L2",
            Phase::L3 => "L3",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Phase::L1),
            "L2" => Ok(Phase::L2),
            "L3" => Ok(Phase::L3),
            other => Err(anyhow!("unknown phase `{other}`, expected L1, L2 or L3")),
        }
    }
}

/// Where and how often the energy ledger is written.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyConfig {
    /// Fast tier, rewritten often. Best placed on a ramdisk.
    pub working_file: PathBuf,
    /// Durable tier, rewritten rarely to spare flash storage.
    pub storage_file: PathBuf,
    pub working_interval: Duration,
    pub storage_interval: Duration,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            working_file: PathBuf::from(DEFAULT_WORKING_FILE),
            storage_file: PathBuf::from(DEFAULT_STORAGE_FILE),
            working_interval: Duration::from_secs(60),
            storage_interval: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorConfig {
    pub service_name: String,
    pub device_instance: u32,
    pub product_id: i64,
    pub product_name: String,
    pub connection: String,
    pub firmware_version: i64,
    pub hardware_version: String,
    pub grid_frequency: f64,
    pub phases: Vec<Phase>,
    /// Pinned battery service; `None` takes any `com.victronenergy.battery*`.
    pub battery_service: Option<String>,
    /// Pinned grid meter service; `None` takes any `com.victronenergy.grid*`.
    pub grid_service: Option<String>,
    pub nominal_inverter_power: i64,
    pub publish_interval: Duration,
    pub energy: EnergyConfig,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            service_name: "com.victronenergy.vebus.ttyS3".to_string(),
            device_instance: 275,
            product_id: 2623,
            product_name: "MultiPlus-II xx/5000/xx-xx (emulated)".to_string(),
            connection: "VE.Bus".to_string(),
            firmware_version: 1175,
            hardware_version: "0.0.3 (20230821)".to_string(),
            grid_frequency: 50.0,
            phases: Phase::ALL.to_vec(),
            battery_service: None,
            grid_service: None,
            nominal_inverter_power: 4500,
            publish_interval: Duration::from_secs(1),
            energy: EnergyConfig::default(),
        }
    }
}

impl EmulatorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from a key lookup, falling back to defaults
    /// for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let grid_frequency: f64 = parse_or(&lookup, "GRID_FREQUENCY", defaults.grid_frequency)?;
        ensure!(
            grid_frequency.is_finite() && grid_frequency > 0.0,
            "GRID_FREQUENCY must be a positive number, got {grid_frequency}"
        );

        let phases = match lookup("PHASES") {
            Some(raw) if !raw.trim().is_empty() => parse_phases(&raw)?,
            _ => defaults.phases,
        };

        let energy = EnergyConfig {
            working_file: text(
                "ENERGY_WORKING_FILE",
                defaults.energy.working_file.display().to_string(),
            )
            .into(),
            storage_file: text(
                "ENERGY_STORAGE_FILE",
                defaults.energy.storage_file.display().to_string(),
            )
            .into(),
            working_interval: Duration::from_secs(parse_or(
                &lookup,
                "ENERGY_WORKING_INTERVAL_SECS",
                defaults.energy.working_interval.as_secs(),
            )?),
            storage_interval: Duration::from_secs(parse_or(
                &lookup,
                "ENERGY_STORAGE_INTERVAL_SECS",
                defaults.energy.storage_interval.as_secs(),
            )?),
        };
        ensure!(
            !energy.working_interval.is_zero() && !energy.storage_interval.is_zero(),
            "energy flush intervals must be at least one second"
        );

        Ok(Self {
            service_name: text("SERVICE_NAME", defaults.service_name),
            device_instance: parse_or(&lookup, "DEVICE_INSTANCE", defaults.device_instance)?,
            product_name: text("PRODUCT_NAME", defaults.product_name),
            connection: text("CONNECTION", defaults.connection),
            grid_frequency,
            phases,
            battery_service: optional_service(lookup("BATTERY_SERVICE")),
            grid_service: optional_service(lookup("GRID_SERVICE")),
            nominal_inverter_power: parse_or(
                &lookup,
                "NOMINAL_INVERTER_POWER",
                defaults.nominal_inverter_power,
            )?,
            energy,
            ..defaults
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value `{raw}` for {key}")),
        _ => Ok(default),
    }
}

/// Parses a comma separated phase list such as `L1,L3`, dropping repeats.
pub fn parse_phases(raw: &str) -> anyhow::Result<Vec<Phase>> {
    let mut phases = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let phase: Phase = part.parse()?;
        if !phases.contains(&phase) {
            phases.push(phase);
        }
    }
    ensure!(!phases.is_empty(), "at least one phase must be configured");
    Ok(phases)
}

fn optional_service(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
