//! Minimum-image Lennard-Jones pair energy between atoms of different molecules.
//!
//! Energies are in Kelvin (ε/k_B), lengths in Angstrom. Parameters for unlike
//! atom types follow Lorentz-Berthelot mixing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::replica::Replica;
use crate::sampling::{EnergyCalculator, EnergyTerms};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LjParameters {
    /// Well depth in Kelvin
    pub epsilon: f64,
    /// Contact distance in Angstrom
    pub sigma: f64,
}

#[derive(Debug, Clone)]
pub struct LennardJones {
    params: HashMap<String, LjParameters>,
    cutoff: f64,
}

impl LennardJones {
    pub fn new(params: HashMap<String, LjParameters>, cutoff: f64) -> Self {
        Self { params, cutoff }
    }

    fn mixed(&self, a: &str, b: &str) -> Option<LjParameters> {
        let pa = self.params.get(a)?;
        let pb = self.params.get(b)?;
        Some(LjParameters {
            epsilon: (pa.epsilon * pb.epsilon).sqrt(),
            sigma: 0.5 * (pa.sigma + pb.sigma),
        })
    }

    /// 4ε[(σ/r)¹² − (σ/r)⁶]
    pub fn pair_energy(params: &LjParameters, r2: f64) -> f64 {
        let s2 = params.sigma * params.sigma / r2;
        let s6 = s2 * s2 * s2;
        4.0 * params.epsilon * (s6 * s6 - s6)
    }
}

impl EnergyCalculator for LennardJones {
    fn potential_energy(&self, replica: &Replica) -> EnergyTerms {
        let molecules: Vec<_> = replica.molecules.iter().map(|(_, m)| m).collect();
        let cutoff2 = self.cutoff * self.cutoff;
        let mut vdw = 0.0;

        for (i, mi) in molecules.iter().enumerate() {
            for mj in molecules.iter().skip(i + 1) {
                if mi.frozen && mj.frozen {
                    continue;
                }
                for ai in &mi.atoms {
                    for aj in &mj.atoms {
                        let Some(p) = self.mixed(&ai.atom_type, &aj.atom_type) else {
                            continue;
                        };
                        let dr = replica.cell.minimum_image(&(ai.pos - aj.pos));
                        let r2 = dr.norm_squared();
                        if r2 > cutoff2 {
                            continue;
                        }
                        // overlapping sites give +inf, which the engine treats as a rejected contact
                        vdw += Self::pair_energy(&p, r2);
                    }
                }
            }
        }

        EnergyTerms {
            vdw,
            ..EnergyTerms::default()
        }
    }
}
