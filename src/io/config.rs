//! YAML run configuration.
//!
//! Example:
//! ```yaml
//! numsteps: 10000
//! corrtime: 100
//! temperature: 30.0
//! trotter_number: 8
//! pi_trial_chain_length: 3
//! moves:
//!   bead_perturb_probability: 0.5
//! sorbates:
//!   - name: H2
//!     reduced_mass: 0.504
//!     bond_length: 0.742
//!     orientation_site: 0
//! system:
//!   cell: [[20.0, 0.0, 0.0], [0.0, 20.0, 0.0], [0.0, 0.0, 20.0]]
//!   lennard_jones:
//!     H: { epsilon: 8.6, sigma: 2.96 }
//!   molecules:
//!     - molecule_type: H2
//!       atoms:
//!         - { atom_type: H, mass: 1.008, pos: [0.371, 0.0, 0.0] }
//!         - { atom_type: H, mass: 1.008, pos: [-0.371, 0.0, 0.0] }
//! ```

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{PimcError, PimcResult};
use crate::replica::{Histogram, Replica};
use crate::sampling::{AnnealingSchedule, DisplacementModel, MoveSettings};
use crate::systems::{Atom, Cell, LennardJones, LjParameters, Molecule, MoleculeList, NuclearSpin, SorbateData};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoveConfig {
    #[serde(default = "default_move_factor")]
    pub move_factor: f64,
    /// Degrees
    #[serde(default = "default_rot_factor")]
    pub rot_factor: f64,
    #[serde(default)]
    pub spinflip_probability: f64,
    #[serde(default)]
    pub bead_perturb_probability: f64,
    #[serde(default = "default_one")]
    pub pi_bead_perturb_factor: f64,
    #[serde(default)]
    pub quantum_rotation: bool,
    #[serde(default)]
    pub displacement: DisplacementModel,
}

fn default_move_factor() -> f64 {
    0.1
}

fn default_rot_factor() -> f64 {
    10.0
}

fn default_one() -> f64 {
    1.0
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            move_factor: default_move_factor(),
            rot_factor: default_rot_factor(),
            spinflip_probability: 0.0,
            bead_perturb_probability: 0.0,
            pi_bead_perturb_factor: 1.0,
            quantum_rotation: false,
            displacement: DisplacementModel::Rigid,
        }
    }
}

impl MoveConfig {
    pub fn settings(&self) -> MoveSettings {
        MoveSettings {
            spinflip_probability: self.spinflip_probability,
            bead_perturb_probability: self.bead_perturb_probability,
            quantum_rotation: self.quantum_rotation,
            move_factor: self.move_factor,
            rot_factor: self.rot_factor,
            displacement: self.displacement,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AnnealingConfig {
    #[serde(default)]
    pub linear: bool,
    pub target: f64,
    #[serde(default = "default_one")]
    pub schedule: f64,
}

impl AnnealingConfig {
    pub fn schedule(&self) -> AnnealingSchedule {
        if self.linear {
            AnnealingSchedule::Linear { target: self.target }
        } else {
            AnnealingSchedule::Geometric {
                target: self.target,
                schedule: self.schedule,
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TemperingConfig {
    pub frequency: usize,
    pub max_temperature: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub energy_output: Option<PathBuf>,
    #[serde(default)]
    pub energy_output_csv: Option<PathBuf>,
    #[serde(default)]
    pub pqr_restart: bool,
    #[serde(default)]
    pub pqr_output: bool,
    #[serde(default)]
    pub write_pi_frames: bool,
    /// Histogram cells per cell axis
    #[serde(default)]
    pub histogram_bins: Option<usize>,
    #[serde(default)]
    pub polarization: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            energy_output: None,
            energy_output_csv: None,
            pqr_restart: false,
            pqr_output: false,
            write_pi_frames: false,
            histogram_bins: None,
            polarization: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoleculeConfig {
    pub molecule_type: String,
    pub atoms: Vec<Atom>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub adiabatic: bool,
    #[serde(default)]
    pub target: bool,
    #[serde(default)]
    pub spin: NuclearSpin,
    #[serde(default = "default_one")]
    pub rot_partfunc_g: f64,
    #[serde(default = "default_one")]
    pub rot_partfunc_u: f64,
}

impl MoleculeConfig {
    pub fn build(&self) -> Molecule {
        let mut molecule = Molecule::new(self.molecule_type.clone(), self.atoms.clone());
        molecule.frozen = self.frozen;
        molecule.adiabatic = self.adiabatic;
        molecule.target = self.target;
        molecule.nuclear_spin = self.spin;
        molecule.rot_partfunc_g = self.rot_partfunc_g;
        molecule.rot_partfunc_u = self.rot_partfunc_u;
        molecule
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemConfig {
    /// Cell vectors in Å
    pub cell: [[f64; 3]; 3],
    #[serde(default)]
    pub lennard_jones: HashMap<String, LjParameters>,
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    pub molecules: Vec<MoleculeConfig>,
}

fn default_cutoff() -> f64 {
    10.0
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub numsteps: usize,
    pub corrtime: usize,
    /// Kelvin
    pub temperature: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    pub trotter_number: usize,
    #[serde(default)]
    pub pi_trial_chain_length: Option<usize>,
    #[serde(default)]
    pub parallel_restarts: bool,
    #[serde(default)]
    pub moves: MoveConfig,
    #[serde(default)]
    pub simulated_annealing: Option<AnnealingConfig>,
    #[serde(default)]
    pub parallel_tempering: Option<TemperingConfig>,
    #[serde(default)]
    pub sorbates: Vec<SorbateData>,
    #[serde(default)]
    pub output: OutputConfig,
    pub system: SystemConfig,
}

impl SimulationConfig {
    pub fn load(path: &Path) -> PimcResult<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: SimulationConfig = serde_yaml::from_reader(reader)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Replica count and trial chain checks; run before any replica is built.
    pub fn validate(&self) -> PimcResult<()> {
        let p = self.trotter_number;
        if p < 4 || !p.is_power_of_two() {
            error!(requested = p, observed = p, "trotter number must be a power of two >= 4");
            return Err(PimcError::InvalidReplicaCount {
                requested: p,
                observed: p,
            });
        }
        match self.pi_trial_chain_length {
            None => {
                error!("pi_trial_chain_length must be set for path-integral runs");
                return Err(PimcError::InvalidSetting(
                    "pi_trial_chain_length must be set for path-integral runs".to_string(),
                ));
            }
            Some(n) if n == 0 || n >= p => {
                error!(requested = n, max = p - 1, "trial chain length out of range");
                return Err(PimcError::InvalidSetting(format!(
                    "pi_trial_chain_length must be in [1, {}], got {}",
                    p - 1,
                    n
                )));
            }
            Some(_) => {}
        }
        if self.corrtime == 0 {
            return Err(PimcError::InvalidSetting("corrtime must be positive".to_string()));
        }
        if self.temperature <= 0.0 {
            return Err(PimcError::InvalidSetting(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if let Some(pt) = &self.parallel_tempering {
            if pt.frequency == 0 || pt.max_temperature < self.temperature {
                return Err(PimcError::InvalidSetting(format!(
                    "parallel tempering needs frequency > 0 and max_temperature >= {}",
                    self.temperature
                )));
            }
        }
        Ok(())
    }

    pub fn trial_chain_length(&self) -> PimcResult<usize> {
        self.pi_trial_chain_length
            .ok_or_else(|| PimcError::InvalidSetting("pi_trial_chain_length must be set".to_string()))
    }

    pub fn cell(&self) -> PimcResult<Cell> {
        let [a, b, c] = self.system.cell;
        Cell::new([Vector3::from(a), Vector3::from(b), Vector3::from(c)])
    }

    pub fn sorbate_names(&self) -> Vec<String> {
        self.sorbates.iter().map(|s| s.name.clone()).collect()
    }

    /// P identical replicas of the configured system.
    pub fn build_replicas(&self) -> PimcResult<Vec<Replica>> {
        let cell = self.cell()?;
        let replicas = (0..self.trotter_number)
            .map(|i| {
                let mut list = MoleculeList::new();
                for m in &self.system.molecules {
                    list.push(m.build());
                }
                let mut replica = Replica::new(i, list, cell, self.temperature);
                replica.histogram = self.output.histogram_bins.map(Histogram::new);
                replica
            })
            .collect();
        Ok(replicas)
    }

    pub fn energy_model(&self) -> LennardJones {
        LennardJones::new(self.system.lennard_jones.clone(), self.system.cutoff)
    }
}
