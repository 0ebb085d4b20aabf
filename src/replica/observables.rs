//! Per-replica observable and statistics records.
//!
//! Every record here has a fixed number of fields so it can be flattened into
//! the bookkeeping buffer (see `aggregate::wire`).

use nalgebra::Vector3;

use crate::sampling::MoveType;
use crate::systems::{Cell, MoleculeList};

/// g/cm³ per (AMU/Å³)
const AMU_PER_A3_TO_G_PER_CM3: f64 = 1.660_539_066_60;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observables {
    pub energy: f64,
    pub coulombic_energy: f64,
    pub polarization_energy: f64,
    pub vdw_energy: f64,
    pub three_body_energy: f64,
    /// Å³
    pub volume: f64,
    pub n_molecules: f64,
    /// g/cm³ of the movable molecules
    pub density: f64,
    /// AMU
    pub frozen_mass: f64,
    /// AMU
    pub total_mass: f64,
    /// Fraction of movable molecules in the para state
    pub spin_ratio: f64,
    pub temperature: f64,
}

impl Observables {
    pub const FIELDS: usize = 12;

    pub fn to_array(&self) -> [f64; Self::FIELDS] {
        [
            self.energy,
            self.coulombic_energy,
            self.polarization_energy,
            self.vdw_energy,
            self.three_body_energy,
            self.volume,
            self.n_molecules,
            self.density,
            self.frozen_mass,
            self.total_mass,
            self.spin_ratio,
            self.temperature,
        ]
    }

    pub fn from_array(v: &[f64; Self::FIELDS]) -> Self {
        Self {
            energy: v[0],
            coulombic_energy: v[1],
            polarization_energy: v[2],
            vdw_energy: v[3],
            three_body_energy: v[4],
            volume: v[5],
            n_molecules: v[6],
            density: v[7],
            frozen_mass: v[8],
            total_mass: v[9],
            spin_ratio: v[10],
            temperature: v[11],
        }
    }
}

/// Acceptance bookkeeping of one replica.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    pub accept: u64,
    pub reject: u64,
    pub accept_displace: u64,
    pub reject_displace: u64,
    pub accept_perturb: u64,
    pub reject_perturb: u64,
    pub accept_spinflip: u64,
    pub reject_spinflip: u64,
    pub boltzmann_factor: f64,
    pub acceptance_rate: f64,
    pub acceptance_rate_displace: f64,
    pub acceptance_rate_perturb: f64,
    pub acceptance_rate_spinflip: f64,
}

fn rate(accept: u64, reject: u64) -> f64 {
    let total = accept + reject;
    if total == 0 {
        0.0
    } else {
        accept as f64 / total as f64
    }
}

impl NodeStats {
    pub fn register_accept(&mut self, move_type: MoveType) {
        self.accept += 1;
        match move_type {
            MoveType::Displace => self.accept_displace += 1,
            MoveType::PerturbBeads => self.accept_perturb += 1,
            MoveType::SpinFlip => self.accept_spinflip += 1,
            _ => {}
        }
    }

    pub fn register_reject(&mut self, move_type: MoveType) {
        self.reject += 1;
        match move_type {
            MoveType::Displace => self.reject_displace += 1,
            MoveType::PerturbBeads => self.reject_perturb += 1,
            MoveType::SpinFlip => self.reject_spinflip += 1,
            _ => {}
        }
    }

    /// Refresh the acceptance rates from the counters.
    pub fn track_ar(&mut self) {
        self.acceptance_rate = rate(self.accept, self.reject);
        self.acceptance_rate_displace = rate(self.accept_displace, self.reject_displace);
        self.acceptance_rate_perturb = rate(self.accept_perturb, self.reject_perturb);
        self.acceptance_rate_spinflip = rate(self.accept_spinflip, self.reject_spinflip);
    }
}

/// Running means of `NodeStats` over the current correlation interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AvgNodeStats {
    pub counter: f64,
    pub boltzmann_factor: f64,
    pub boltzmann_factor_sq: f64,
    pub acceptance_rate: f64,
    pub acceptance_rate_displace: f64,
    pub acceptance_rate_perturb: f64,
    pub acceptance_rate_spinflip: f64,
}

impl AvgNodeStats {
    pub const FIELDS: usize = 7;

    pub fn update(&mut self, stats: &NodeStats) {
        self.counter += 1.0;
        let w = 1.0 / self.counter;
        let bf = stats.boltzmann_factor.min(1.0);
        self.boltzmann_factor += w * (bf - self.boltzmann_factor);
        self.boltzmann_factor_sq += w * (bf * bf - self.boltzmann_factor_sq);
        self.acceptance_rate += w * (stats.acceptance_rate - self.acceptance_rate);
        self.acceptance_rate_displace +=
            w * (stats.acceptance_rate_displace - self.acceptance_rate_displace);
        self.acceptance_rate_perturb +=
            w * (stats.acceptance_rate_perturb - self.acceptance_rate_perturb);
        self.acceptance_rate_spinflip +=
            w * (stats.acceptance_rate_spinflip - self.acceptance_rate_spinflip);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn to_array(&self) -> [f64; Self::FIELDS] {
        [
            self.counter,
            self.boltzmann_factor,
            self.boltzmann_factor_sq,
            self.acceptance_rate,
            self.acceptance_rate_displace,
            self.acceptance_rate_perturb,
            self.acceptance_rate_spinflip,
        ]
    }

    pub fn from_array(v: &[f64; Self::FIELDS]) -> Self {
        Self {
            counter: v[0],
            boltzmann_factor: v[1],
            boltzmann_factor_sq: v[2],
            acceptance_rate: v[3],
            acceptance_rate_displace: v[4],
            acceptance_rate_perturb: v[5],
            acceptance_rate_spinflip: v[6],
        }
    }
}

/// Per-sorbate accounting in a multi-sorbate system.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SorbateInfo {
    pub n_molecules: f64,
    /// AMU
    pub mass: f64,
    /// Mass percent of the whole (frozen included) system
    pub percent_wt: f64,
    /// g/cm³
    pub density: f64,
}

impl SorbateInfo {
    pub const FIELDS: usize = 4;

    pub fn to_array(&self) -> [f64; Self::FIELDS] {
        [self.n_molecules, self.mass, self.percent_wt, self.density]
    }

    pub fn from_array(v: &[f64; Self::FIELDS]) -> Self {
        Self {
            n_molecules: v[0],
            mass: v[1],
            percent_wt: v[2],
            density: v[3],
        }
    }
}

/// Population histogram of movable-molecule COMs on a fractional grid of the cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub bins_per_axis: usize,
    pub counts: Vec<i32>,
}

impl Histogram {
    pub fn new(bins_per_axis: usize) -> Self {
        Self {
            bins_per_axis,
            counts: vec![0; bins_per_axis.pow(3)],
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn zero(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    fn bin(&self, frac: &Vector3<f64>) -> usize {
        let n = self.bins_per_axis;
        let axis = |x: f64| (((x - x.floor()) * n as f64) as usize).min(n - 1);
        (axis(frac.x) * n + axis(frac.y)) * n + axis(frac.z)
    }

    /// Zero the grid and count every movable molecule COM once.
    pub fn populate(&mut self, molecules: &MoleculeList, cell: &Cell) {
        self.zero();
        if self.bins_per_axis == 0 {
            return;
        }
        for (_, m) in molecules.iter().filter(|(_, m)| m.is_movable()) {
            let idx = self.bin(&cell.to_fractional(&m.com));
            self.counts[idx] += 1;
        }
    }

    pub fn add(&mut self, counts: &[i32]) {
        for (c, x) in self.counts.iter_mut().zip(counts) {
            *c += x;
        }
    }
}

/// Mass accounting of a molecule list inside `cell`.
pub(crate) fn mass_accounting(molecules: &MoleculeList, cell: &Cell, obs: &mut Observables) {
    let mut frozen = 0.0;
    let mut total = 0.0;
    let mut movable = 0usize;
    let mut para = 0usize;
    for (_, m) in molecules.iter() {
        total += m.mass;
        if m.frozen {
            frozen += m.mass;
        }
        if m.is_movable() {
            movable += 1;
            if m.nuclear_spin == crate::systems::NuclearSpin::Para {
                para += 1;
            }
        }
    }
    obs.frozen_mass = frozen;
    obs.total_mass = total;
    obs.n_molecules = movable as f64;
    obs.volume = cell.volume();
    obs.density = if obs.volume > 0.0 {
        (total - frozen) * AMU_PER_A3_TO_G_PER_CM3 / obs.volume
    } else {
        0.0
    };
    obs.spin_ratio = if movable > 0 {
        para as f64 / movable as f64
    } else {
        0.0
    };
}

/// Density of `mass` AMU spread over `volume` Å³, in g/cm³.
pub(crate) fn density(mass: f64, volume: f64) -> f64 {
    if volume > 0.0 {
        mass * AMU_PER_A3_TO_G_PER_CM3 / volume
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_track_ar_per_move_type() {
        let mut stats = NodeStats::default();
        stats.register_accept(MoveType::Displace);
        stats.register_reject(MoveType::Displace);
        stats.register_reject(MoveType::Displace);
        stats.register_accept(MoveType::PerturbBeads);
        stats.track_ar();
        assert_relative_eq!(stats.acceptance_rate, 0.5);
        assert_relative_eq!(stats.acceptance_rate_displace, 1.0 / 3.0);
        assert_relative_eq!(stats.acceptance_rate_perturb, 1.0);
        assert_relative_eq!(stats.acceptance_rate_spinflip, 0.0);
    }

    #[test]
    fn test_avg_node_stats_running_mean() {
        let mut avg = AvgNodeStats::default();
        for bf in [0.2, 0.4, 3.0] {
            let stats = NodeStats { boltzmann_factor: bf, ..NodeStats::default() };
            avg.update(&stats);
        }
        // factors above one are clipped to one
        assert_relative_eq!(avg.boltzmann_factor, (0.2 + 0.4 + 1.0) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(avg.boltzmann_factor_sq, (0.04 + 0.16 + 1.0) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(avg.counter, 3.0);
        avg.clear();
        assert_eq!(avg, AvgNodeStats::default());
    }

    #[test]
    fn test_histogram_bins_wrap_into_cell() {
        use crate::systems::{Atom, Molecule};
        let cell = Cell::cubic(10.0).unwrap();
        let mut list = MoleculeList::new();
        for x in [1.0, 6.0, 11.0, -4.0] {
            let atom = Atom { atom_type: "X".into(), mass: 1.0, charge: 0.0, pos: Vector3::new(x, 1.0, 1.0) };
            list.push(Molecule::new("X", vec![atom]));
        }
        let mut hist = Histogram::new(2);
        hist.populate(&list, &cell);
        assert_eq!(hist.counts.iter().sum::<i32>(), 4);
        // x = 1 and x = 11 share a bin, x = 6 and x = -4 share the other
        assert_eq!(hist.counts[0], 2);
        assert_eq!(hist.counts[4], 2);
    }
}
