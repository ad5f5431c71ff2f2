//! Two-tier persistence for the energy ledger.
//!
//! The working file is rewritten often and is meant for volatile storage; the
//! storage file is rewritten rarely to keep flash wear down. On startup the
//! fresher working file wins.

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde_derive::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcEnergy {
    /// Watt-hours that flowed into the battery.
    #[serde(default)]
    pub charging: f64,
    /// Watt-hours that flowed out of the battery.
    #[serde(default)]
    pub discharging: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyLedger {
    #[serde(with = "chrono::serde::ts_seconds", alias = "time_creation")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dc: DcEnergy,
}

impl EnergyLedger {
    /// A zeroed ledger. `created_at` is kept to whole seconds, as stored.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at: created_at.trunc_subsecs(0),
            dc: DcEnergy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStore {
    working_path: PathBuf,
    storage_path: PathBuf,
}

impl LedgerStore {
    pub fn new(working_path: impl Into<PathBuf>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            working_path: working_path.into(),
            storage_path: storage_path.into(),
        }
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Loads the freshest readable ledger, falling back to a zeroed one.
    pub fn load(&self, now: DateTime<Utc>) -> EnergyLedger {
        for (tier, path) in [("working", &self.working_path), ("storage", &self.storage_path)] {
            if !path.exists() {
                debug!(tier, path = %path.display(), "no ledger file");
                continue;
            }
            match read_ledger(path) {
                Ok(ledger) => {
                    info!(
                        tier,
                        path = %path.display(),
                        charging_wh = ledger.dc.charging,
                        discharging_wh = ledger.dc.discharging,
                        "loaded energy ledger"
                    );
                    return ledger;
                }
                Err(e) => warn!(tier, path = %path.display(), "ignoring unreadable ledger: {e:#}"),
            }
        }
        info!("starting a new energy ledger");
        EnergyLedger::new(now)
    }

    pub fn save_working(&self, ledger: &EnergyLedger) -> Result<()> {
        write_ledger(&self.working_path, ledger)
    }

    pub fn save_storage(&self, ledger: &EnergyLedger) -> Result<()> {
        write_ledger(&self.storage_path, ledger)
    }
}

fn read_ledger(path: &Path) -> Result<EnergyLedger> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger from {}", path.display()))?;
    let ledger: EnergyLedger = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse ledger from {}", path.display()))?;
    for (name, wh) in [
        ("charging", ledger.dc.charging),
        ("discharging", ledger.dc.discharging),
    ] {
        ensure!(
            wh.is_finite() && wh >= 0.0,
            "ledger {} holds an invalid {name} total of {wh} Wh",
            path.display()
        );
    }
    Ok(ledger)
}

/// Sibling temp file for `path`, unique per full file name.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_ledger(path: &Path, ledger: &EnergyLedger) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(ledger).context("Failed to serialize ledger")?;

    // Atomic replace via a sibling temp file.
    let temp = temp_path(path);
    fs::write(&temp, json)
        .with_context(|| format!("Failed to write temp file {}", temp.display()))?;
    fs::rename(&temp, path)
        .with_context(|| format!("Failed to rename temp file to {}", path.display()))?;

    debug!(path = %path.display(), "saved energy ledger");
    Ok(())
}
