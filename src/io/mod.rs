//! IO module - configuration and output files.

mod config;
mod energy_log;
mod frames;
mod pqr;

pub use config::{AnnealingConfig, MoleculeConfig, MoveConfig, OutputConfig, SimulationConfig, SystemConfig, TemperingConfig};
pub use energy_log::{EnergyLog, EnergyRecord};
pub use frames::FrameWriter;
pub use pqr::PqrOutput;

#[cfg(test)]
pub(crate) use config::tests::sample as sample_config;
