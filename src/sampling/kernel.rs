//! Acceptance factor of a proposed path-integral move.

use crate::constants::{thermal_wavelength2, AMU2KG, MAXVALUE};
use crate::error::{PimcError, PimcResult};
use crate::sampling::MoveType;
use crate::systems::{Molecule, NuclearSpin, SorbateData};

/// init / trial / current triple of one scalar tracked by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contribution {
    pub init: f64,
    pub trial: f64,
    pub current: f64,
}

impl Contribution {
    pub fn change(&self) -> f64 {
        self.trial - self.init
    }
}

/// Everything the kernel needs about one proposal.
#[derive(Debug, Clone, Copy)]
pub struct Proposal<'a> {
    pub move_type: MoveType,
    pub energy: Contribution,
    pub chain_length: Contribution,
    pub orientation_distance: Contribution,
    /// Target molecule after the move (replica 0)
    pub target: &'a Molecule,
    pub sorbate: Option<&'a SorbateData>,
    pub n_beads: usize,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub factor: f64,
    /// Energy to record for the trial state (sentinel when non-finite)
    pub trial_energy: f64,
}

pub struct BoltzmannKernel;

impl BoltzmannKernel {
    pub fn evaluate(proposal: &Proposal) -> PimcResult<Verdict> {
        let energy = proposal.energy;
        if !energy.trial.is_finite() {
            return Ok(Verdict {
                factor: 0.0,
                trial_energy: MAXVALUE,
            });
        }
        let t = proposal.temperature;
        let factor = match proposal.move_type {
            MoveType::PerturbBeads => {
                let p = proposal.n_beads as f64;
                let energy_term = energy.change() / t;
                let lambda2 = thermal_wavelength2(AMU2KG * proposal.target.mass, t);
                let com_term = proposal.chain_length.change() * std::f64::consts::PI * p / lambda2;
                // only sorbates with an orientation handle carry the rotational ring term
                let oriented = proposal.sorbate.filter(|s| s.orientation_handle().is_some());
                let orient_term = match oriented {
                    Some(sorbate) => {
                        let reduced_mass = sorbate.reduced_mass.ok_or_else(|| {
                            PimcError::MissingRequiredDatum(format!(
                                "no reduced mass specified for sorbate molecule \"{}\"",
                                sorbate.name
                            ))
                        })?;
                        let lambda2 = thermal_wavelength2(AMU2KG * reduced_mass, t);
                        proposal.orientation_distance.change() * std::f64::consts::PI * p / lambda2
                    }
                    None => 0.0,
                };
                (-energy_term - com_term - orient_term).exp()
            }
            MoveType::SpinFlip => {
                let g = proposal.target.rot_partfunc_g;
                let u = proposal.target.rot_partfunc_u;
                match proposal.target.nuclear_spin {
                    NuclearSpin::Para => g / (g + u),
                    NuclearSpin::Ortho => u / (g + u),
                }
            }
            _ => (-energy.change() / t).exp(),
        };
        Ok(Verdict {
            factor,
            trial_energy: energy.trial,
        })
    }
}
