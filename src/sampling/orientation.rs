//! Orientation bisection for linear rotors.
//!
//! Subramanian et al., J. Chem. Phys. 146, 094105 (2017).
//! Starting from one random direction at bead 0, the closed ring of P bond
//! directions is filled by recursive midpoint placement. Between two placed
//! directions I and K (angle ψ apart), the midpoint J is drawn from a
//! von Mises-Fisher distribution about their bisector with concentration
//!
//!   K = 4 κ p cos(ψ/2),   κ = π b² / λ²(μ)
//!
//! where p doubles at each level of the recursion.

use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::random::RandomStream;
use crate::constants::{thermal_wavelength2, AMU2KG, ANGSTROM2METER};
use crate::error::{PimcError, PimcResult};
use crate::replica::Replica;
use crate::systems::{orthogonal_to, SorbateData};

/// Below this concentration the polar angle is drawn uniformly in cos
const MIN_CONCENTRATION: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct OrientationSampler {
    orientations: Vec<Vector3<f64>>,
}

impl OrientationSampler {
    pub fn new(n_beads: usize) -> Self {
        Self {
            orientations: vec![Vector3::zeros(); n_beads],
        }
    }

    pub fn orientations(&self) -> &[Vector3<f64>] {
        &self.orientations
    }

    /// Fill all P directions for a rotor with bond length `bond_length` (Å)
    /// and reduced mass `reduced_mass` (AMU) at `temperature` (K).
    pub fn generate(&mut self, bond_length: f64, reduced_mass: f64, temperature: f64, rng: &mut RandomStream) {
        let n_beads = self.orientations.len();
        if n_beads == 0 {
            return;
        }
        let b = bond_length * ANGSTROM2METER;
        let kappa = std::f64::consts::PI * b * b / thermal_wavelength2(reduced_mass * AMU2KG, temperature);

        self.orientations.iter_mut().for_each(|v| *v = Vector3::zeros());
        self.orientations[0] = rng.unit_vector();
        self.place(0, n_beads, 2, kappa, rng);
    }

    fn place(&mut self, start: usize, end: usize, p: usize, kappa: f64, rng: &mut RandomStream) {
        let n_beads = self.orientations.len();
        if p > n_beads {
            return;
        }
        let mid = (start + end) / 2;
        let vi = self.orientations[start];
        let vk = self.orientations[if end == n_beads { 0 } else { end }];

        let bisector = (vi + vk).try_normalize(1e-12).unwrap_or_else(|| orthogonal_to(&vi));
        let (psi, ortho) = if p > 2 {
            let psi = vi.angle(&vk);
            let chord = (vk - vi).try_normalize(1e-12).unwrap_or_else(|| orthogonal_to(&bisector));
            (psi, chord)
        } else {
            (0.0, orthogonal_to(&bisector))
        };

        let c = rng.uniform();
        let angle_b = rng.uniform() * std::f64::consts::TAU;
        let concentration = 4.0 * kappa * p as f64 * (0.5 * psi).cos();
        let cos_a = if concentration.abs() < MIN_CONCENTRATION {
            1.0 - 2.0 * c
        } else {
            1.0 + (1.0 - c * (1.0 - (-2.0 * concentration).exp())).ln() / concentration
        };
        let angle_a = cos_a.clamp(-1.0, 1.0).acos();

        let bisector_axis = Unit::new_unchecked(bisector);
        let azimuth = UnitQuaternion::from_axis_angle(&bisector_axis, angle_b) * ortho;
        let tilt_axis = Unit::new_normalize(azimuth);
        let vj = UnitQuaternion::from_axis_angle(&tilt_axis, angle_a) * bisector;
        self.orientations[mid] = vj.normalize();

        if p < n_beads {
            self.place(start, mid, 2 * p, kappa, rng);
            self.place(mid, end, 2 * p, kappa, rng);
        }
    }

    /// Re-orient every replica's target molecule, or do nothing when the
    /// molecule type has no orientation handle.
    pub fn perturb_target(
        &mut self,
        replicas: &mut [Replica],
        sorbate: Option<&SorbateData>,
        temperature: f64,
        rng: &mut RandomStream,
    ) -> PimcResult<()> {
        let Some(sorbate) = sorbate else {
            return Ok(());
        };
        let Some((site, bond_length)) = sorbate.orientation_handle() else {
            return Ok(());
        };
        let reduced_mass = sorbate.reduced_mass.ok_or_else(|| {
            PimcError::MissingRequiredDatum(format!(
                "no reduced mass specified for sorbate molecule \"{}\"",
                sorbate.name
            ))
        })?;
        if self.orientations.len() != replicas.len() {
            self.orientations = vec![Vector3::zeros(); replicas.len()];
        }

        self.generate(bond_length, reduced_mass, temperature, rng);

        for (replica, direction) in replicas.iter_mut().zip(&self.orientations) {
            let index = replica.index;
            if !replica.target_molecule_mut()?.orient(direction, site) {
                return Err(PimcError::Internal(format!(
                    "replica {}: orientation site {} of \"{}\" is unusable",
                    index, site, sorbate.name
                )));
            }
        }
        Ok(())
    }
}
