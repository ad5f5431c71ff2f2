use crate::config::EnergyConfig;
use crate::ledger_store::{DcEnergy, EnergyLedger, LedgerStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Energy moved through the battery since the ledger was created.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyTotals {
    pub charging_wh: f64,
    pub discharging_wh: f64,
}

/// Integrates battery power over time into charge/discharge counters and
/// writes them to the ledger store on two cadences.
///
/// Positive battery power is charging, negative is discharging.
#[derive(Debug)]
pub struct EnergyAccumulator {
    created_at: DateTime<Utc>,
    /// Totals loaded at startup, kept apart so a reload is exact.
    base: DcEnergy,
    charging_ws: f64,
    discharging_ws: f64,
    last_sample: Option<Instant>,
    last_working_flush: Option<Instant>,
    last_storage_flush: Option<Instant>,
    working_interval: Duration,
    storage_interval: Duration,
    store: LedgerStore,
}

impl EnergyAccumulator {
    pub fn new(
        ledger: EnergyLedger,
        store: LedgerStore,
        working_interval: Duration,
        storage_interval: Duration,
    ) -> Self {
        Self {
            created_at: ledger.created_at,
            base: ledger.dc,
            charging_ws: 0.0,
            discharging_ws: 0.0,
            last_sample: None,
            last_working_flush: None,
            last_storage_flush: None,
            working_interval,
            storage_interval,
            store,
        }
    }

    /// Loads the ledger from the configured files and resumes counting.
    pub fn open(config: &EnergyConfig, now: DateTime<Utc>) -> Self {
        let store = LedgerStore::new(&config.working_file, &config.storage_file);
        let ledger = store.load(now);
        Self::new(
            ledger,
            store,
            config.working_interval,
            config.storage_interval,
        )
    }

    /// Adds `power * elapsed` to the matching counter. The first sample only
    /// starts the clock. Absent power counts as no flow.
    pub fn accumulate(&mut self, power: Option<f64>, now: Instant) {
        let elapsed = self
            .last_sample
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_sample = Some(now);

        let Some(power) = power.filter(|p| p.is_finite()) else {
            return;
        };
        let watt_seconds = power.abs() * elapsed.as_secs_f64();
        if power > 0.0 {
            self.charging_ws += watt_seconds;
        } else if power < 0.0 {
            self.discharging_ws += watt_seconds;
        }
    }

    pub fn totals(&self) -> EnergyTotals {
        EnergyTotals {
            charging_wh: self.base.charging + self.charging_ws / SECONDS_PER_HOUR,
            discharging_wh: self.base.discharging + self.discharging_ws / SECONDS_PER_HOUR,
        }
    }

    pub fn ledger(&self) -> EnergyLedger {
        let totals = self.totals();
        EnergyLedger {
            created_at: self.created_at,
            dc: DcEnergy {
                charging: totals.charging_wh,
                discharging: totals.discharging_wh,
            },
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Writes the working file if its interval has passed. Returns whether a
    /// write happened.
    pub fn flush_working(&mut self, now: Instant) -> Result<bool> {
        if !interval_elapsed(&mut self.last_working_flush, self.working_interval, now) {
            return Ok(false);
        }
        self.store.save_working(&self.ledger())?;
        debug!(totals = ?self.totals(), "flushed energy ledger to working file");
        Ok(true)
    }

    /// Writes the durable storage file if its interval has passed.
    pub fn flush_durable(&mut self, now: Instant) -> Result<bool> {
        if !interval_elapsed(&mut self.last_storage_flush, self.storage_interval, now) {
            return Ok(false);
        }
        self.store.save_storage(&self.ledger())?;
        debug!(totals = ?self.totals(), "flushed energy ledger to storage file");
        Ok(true)
    }

    /// Writes both files regardless of cadence.
    pub fn flush_all(&mut self, now: Instant) -> Result<()> {
        let ledger = self.ledger();
        self.store.save_working(&ledger)?;
        self.store.save_storage(&ledger)?;
        self.last_working_flush = Some(now);
        self.last_storage_flush = Some(now);
        Ok(())
    }
}

/// The first check starts the interval; later checks fire once it has passed.
fn interval_elapsed(last: &mut Option<Instant>, interval: Duration, now: Instant) -> bool {
    match *last {
        Some(previous) if now.saturating_duration_since(previous) < interval => false,
        Some(_) => {
            *last = Some(now);
            true
        }
        None => {
            *last = Some(now);
            false
        }
    }
}
