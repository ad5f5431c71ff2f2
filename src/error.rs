use crate::bus::{BusError, BusValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("expected a number at `{path}`, got {value}")]
    NotNumeric { path: String, value: BusValue },
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
