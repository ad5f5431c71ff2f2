//! MultiPlus Inverter/Charger Emulator
//!
//! Presents a virtual inverter/charger on a device bus by combining values from
//! an upstream battery monitor and grid meter, and keeps a persistent ledger of
//! energy moved through the battery.

pub mod bus;
pub mod config;
pub mod derivation;
pub mod energy_accumulator;
pub mod error;
pub mod ledger_store;
pub mod publisher;
pub mod schema;
pub mod subscription;
pub mod value_cache;

// Re-export commonly used types for easier access
pub use bus::{Bus, BusEvent, BusValue, LocalBus};
pub use config::{EmulatorConfig, Phase};
pub use energy_accumulator::{EnergyAccumulator, EnergyTotals};
pub use error::EmulatorError;
pub use ledger_store::{EnergyLedger, LedgerStore};
pub use publisher::{Publisher, UpdateIndex};
pub use subscription::subscribe_upstream;
pub use value_cache::{DeviceRole, ValueCache};
