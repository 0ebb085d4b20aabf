//! Rust PIMC - path-integral Monte Carlo for molecular systems in Rust
//!
//! Each molecule is represented by a closed ring of P beads, one bead per
//! classical replica of the system. This crate provides the replica ring, the
//! staging and orientation-bisection samplers, the path-integral acceptance
//! kernel, the NVT Metropolis loop and the cross-replica bookkeeping.

pub mod aggregate;
pub mod comm;
pub mod constants;
pub mod error;
pub mod io;
pub mod replica;
pub mod sampling;
pub mod systems;

#[cfg(test)]
mod tests;

// Re-export commonly used types at crate root
pub use aggregate::{Aggregator, MessageLayout, ReplicaMessage, RunningAverage};
pub use comm::{Communicator, LocalComm, ThreadComm, ThreadGroup};
pub use error::{PimcError, PimcResult};
pub use io::{EnergyLog, FrameWriter, PqrOutput, SimulationConfig};
pub use replica::{Checkpoint, Observables, Replica};
pub use sampling::{
    BoltzmannKernel, EnergyCalculator, EnergyTerms, MoveType, OrientationSampler, PathIntegralNvt, RandomStream,
    ReplicaOutput, RunSummary, StagingSampler,
};
pub use systems::{Atom, Cell, LennardJones, Molecule, MoleculeId, MoleculeList, NuclearSpin, SorbateData};
