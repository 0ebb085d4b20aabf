//! Traits for the collaborators of the path-integral engine.

use crate::error::PimcResult;
use crate::replica::Replica;

/// Potential-energy components of one replica, in Kelvin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyTerms {
    pub coulombic: f64,
    pub polarization: f64,
    pub vdw: f64,
    pub three_body: f64,
    /// False when an iterative solver (e.g. polarization) failed to converge
    pub solver_converged: bool,
}

impl Default for EnergyTerms {
    fn default() -> Self {
        Self {
            coulombic: 0.0,
            polarization: 0.0,
            vdw: 0.0,
            three_body: 0.0,
            solver_converged: true,
        }
    }
}

impl EnergyTerms {
    pub fn total(&self) -> f64 {
        self.coulombic + self.polarization + self.vdw + self.three_body
    }
}

/// Trait for computing the potential energy of one replica.
pub trait EnergyCalculator {
    fn potential_energy(&self, replica: &Replica) -> EnergyTerms;
}

/// Per-replica output files (trajectory, restart, final state, dipoles and fields).
pub trait ReplicaOutput {
    /// Append the current state to the trajectory
    fn write_states(&mut self, replica: &Replica) -> PimcResult<()>;
    /// Overwrite the restart file
    fn write_restart(&mut self, replica: &Replica) -> PimcResult<()>;
    /// Write the final configuration
    fn write_final(&mut self, replica: &Replica) -> PimcResult<()>;

    fn write_dipole(&mut self, _replica: &Replica) -> PimcResult<()> {
        Ok(())
    }

    fn write_field(&mut self, _replica: &Replica) -> PimcResult<()> {
        Ok(())
    }
}
