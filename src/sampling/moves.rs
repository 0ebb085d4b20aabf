//! Move selection and execution on the whole replica ring.

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::random::RandomStream;
use crate::comm::Communicator;
use crate::error::{PimcError, PimcResult};
use crate::replica::Replica;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    #[default]
    Displace,
    SpinFlip,
    PerturbBeads,
    Insert,
    Remove,
    Adiabatic,
    Volume,
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MoveType::Displace => "displace",
            MoveType::SpinFlip => "spinflip",
            MoveType::PerturbBeads => "perturb_beads",
            MoveType::Insert => "insert",
            MoveType::Remove => "remove",
            MoveType::Adiabatic => "adiabatic",
            MoveType::Volume => "volume",
        };
        f.write_str(name)
    }
}

/// How a Displace move perturbs a molecule.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementModel {
    #[default]
    Rigid,
    Anharmonic,
    ChargeTransfer,
    Wavepacket,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveSettings {
    pub spinflip_probability: f64,
    pub bead_perturb_probability: f64,
    pub quantum_rotation: bool,
    /// Fraction of each cell vector for translations
    pub move_factor: f64,
    /// Maximum rotation angle in degrees
    pub rot_factor: f64,
    pub displacement: DisplacementModel,
}

impl Default for MoveSettings {
    fn default() -> Self {
        Self {
            spinflip_probability: 0.0,
            bead_perturb_probability: 0.0,
            quantum_rotation: false,
            move_factor: 0.1,
            rot_factor: 10.0,
            displacement: DisplacementModel::Rigid,
        }
    }
}

impl MoveSettings {
    /// Move type for a uniform roll on [0, 1).
    pub fn classify(&self, roll: f64) -> MoveType {
        if self.quantum_rotation && roll < self.spinflip_probability {
            MoveType::SpinFlip
        } else if roll < self.spinflip_probability + self.bead_perturb_probability {
            MoveType::PerturbBeads
        } else {
            MoveType::Displace
        }
    }
}

/// Choose the next move and target for every replica from one pair of shared draws.
pub fn pick_move(replicas: &mut [Replica], settings: &MoveSettings, rng: &mut RandomStream) -> PimcResult<MoveType> {
    let move_roll = rng.uniform();
    let target_roll = rng.uniform();
    let move_type = settings.classify(move_roll);

    for replica in replicas.iter_mut() {
        let eligible = replica.eligible_molecules();
        if eligible.is_empty() {
            return Err(PimcError::NoMoleculesInSystem { replica: replica.index });
        }
        let k = ((target_roll * eligible.len() as f64) as usize).min(eligible.len() - 1);
        replica.select_target(move_type, eligible[k])?;
    }
    debug!(%move_type, target_roll, "picked move");
    Ok(move_type)
}

/// Independent translation per replica, then one shared rotation about the ring centroid.
pub fn displace<C: Communicator>(
    replicas: &mut [Replica],
    settings: &MoveSettings,
    rng: &mut RandomStream,
    comm: &C,
) -> PimcResult<()> {
    if settings.displacement != DisplacementModel::Rigid {
        return Err(PimcError::UnsupportedSetting(format!(
            "{:?} displacement is not implemented for path integrals",
            settings.displacement
        )));
    }

    // components 3..6 belong to the non-rigid models
    let seed = rng.uniforms::<6>();
    let rolls = [seed[0], seed[1], seed[2]];

    let mut centroid = Vector3::zeros();
    for replica in replicas.iter_mut() {
        let shift = replica.cell.translation(settings.move_factor, &rolls);
        let molecule = replica.target_molecule_mut()?;
        molecule.translate(&shift);
        molecule.update_com();
        centroid += molecule.com;
    }
    centroid /= replicas.len().max(1) as f64;

    let axis = rng.normal_vector();
    let angle = (rng.uniform() * settings.rot_factor).to_radians();
    let rotation = Unit::try_new(axis, 1e-12)
        .map(|axis| UnitQuaternion::from_axis_angle(&axis, angle))
        .unwrap_or_else(UnitQuaternion::identity);

    for replica in replicas.iter_mut() {
        replica.target_molecule_mut()?.rotate_about(&rotation, &centroid);
    }
    comm.barrier()?;
    Ok(())
}

/// Toggle the nuclear spin of the target in every replica.
pub fn spin_flip(replicas: &mut [Replica]) -> PimcResult<()> {
    for replica in replicas.iter_mut() {
        let molecule = replica.target_molecule_mut()?;
        molecule.nuclear_spin = molecule.nuclear_spin.flipped();
    }
    Ok(())
}
