//! Sampling module - path-integral moves, samplers and the Metropolis loop.

mod kernel;
mod moves;
mod orientation;
mod pimc;
mod random;
mod ring;
mod staging;
mod tempering;
mod traits;

pub use kernel::{BoltzmannKernel, Contribution, Proposal, Verdict};
pub use moves::{displace, pick_move, spin_flip, DisplacementModel, MoveSettings, MoveType};
pub use orientation::OrientationSampler;
pub use pimc::{PathIntegralNvt, RunSummary};
pub use random::RandomStream;
pub use ring::{chain_length, cyclic_sum_sq, orientation_distance};
pub use staging::StagingSampler;
pub use tempering::{AnnealingSchedule, Tempering};
pub use traits::{EnergyCalculator, EnergyTerms, ReplicaOutput};
