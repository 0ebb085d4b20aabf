//! Replica module - one Trotter slice (bead) of the path-integral system.
//!
//! Each replica is a full classical copy of the molecular system. All replicas
//! carry the same molecule topology (count, order, type); only positions,
//! orientations and spin labels differ between them.

mod checkpoint;
mod observables;

pub use checkpoint::Checkpoint;
pub use observables::{AvgNodeStats, Histogram, NodeStats, Observables, SorbateInfo};

use crate::error::{PimcError, PimcResult};
use crate::sampling::{EnergyTerms, MoveType};
use crate::systems::{Cell, Molecule, MoleculeId, MoleculeList};

#[derive(Debug, Clone)]
pub struct Replica {
    /// Position of this bead on the ring, 0..P
    pub index: usize,
    pub molecules: MoleculeList,
    pub cell: Cell,
    /// Bath temperature in K (relabelled by parallel tempering)
    pub temperature: f64,
    pub step: usize,
    pub observables: Observables,
    pub node_stats: NodeStats,
    pub avg_node_stats: AvgNodeStats,
    pub checkpoint: Checkpoint,
    /// Set by the energy model when its iterative solver did not converge
    pub solver_failed: bool,
    pub histogram: Option<Histogram>,
    pub sorbate_info: Vec<SorbateInfo>,
}

impl Replica {
    pub fn new(index: usize, molecules: MoleculeList, cell: Cell, temperature: f64) -> Self {
        let mut replica = Self {
            index,
            molecules,
            cell,
            temperature,
            step: 0,
            observables: Observables::default(),
            node_stats: NodeStats::default(),
            avg_node_stats: AvgNodeStats::default(),
            checkpoint: Checkpoint::default(),
            solver_failed: false,
            histogram: None,
            sorbate_info: Vec::new(),
        };
        replica.observables.volume = cell.volume();
        replica.observables.temperature = temperature;
        replica
    }

    /// Molecules that may be targeted by a move, in list order.
    pub fn eligible_molecules(&self) -> Vec<MoleculeId> {
        self.molecules
            .iter()
            .filter(|(_, m)| m.is_movable())
            .map(|(id, _)| id)
            .collect()
    }

    /// Handle of the molecule selected by the last `select_target`.
    pub fn target(&self) -> PimcResult<MoleculeId> {
        self.checkpoint.target.ok_or_else(|| {
            PimcError::Internal(format!("replica {} has no perturbation target", self.index))
        })
    }

    pub fn target_molecule(&self) -> PimcResult<&Molecule> {
        let id = self.target()?;
        self.molecules
            .get(id)
            .ok_or_else(|| PimcError::Internal(format!("replica {}: stale target handle", self.index)))
    }

    pub fn target_molecule_mut(&mut self) -> PimcResult<&mut Molecule> {
        let id = self.target()?;
        let index = self.index;
        self.molecules
            .get_mut(id)
            .ok_or_else(|| PimcError::Internal(format!("replica {}: stale target handle", index)))
    }

    /// Make `id` the pending target: record its neighbours and a deep copy for rollback.
    pub fn select_target(&mut self, move_type: MoveType, id: MoleculeId) -> PimcResult<()> {
        let backup = self
            .molecules
            .get(id)
            .cloned()
            .ok_or_else(|| PimcError::Internal(format!("replica {}: no molecule {:?}", self.index, id)))?;
        let head = self.molecules.predecessor(id);
        let tail = self.molecules.successor(id);
        self.checkpoint.select(move_type, id, head, tail, backup);
        Ok(())
    }

    /// Snapshot the current observables as the last accepted state.
    pub fn backup_observables(&mut self) {
        self.checkpoint.observables = self.observables;
    }

    /// Undo the pending move. The backup is kept, so restoring twice gives the same state.
    pub fn restore(&mut self) {
        self.solver_failed = false;
        if let (Some(id), Some(backup)) = (self.checkpoint.target, self.checkpoint.molecule_backup.as_ref()) {
            self.molecules.replace(id, backup.clone());
        }
        self.observables = self.checkpoint.observables;
    }

    pub fn set_energy_terms(&mut self, terms: &EnergyTerms) {
        self.observables.coulombic_energy = terms.coulombic;
        self.observables.polarization_energy = terms.polarization;
        self.observables.vdw_energy = terms.vdw;
        self.observables.three_body_energy = terms.three_body;
        self.observables.energy = terms.total();
        self.solver_failed = !terms.solver_converged;
    }

    pub fn calc_system_mass(&mut self) {
        observables::mass_accounting(&self.molecules, &self.cell, &mut self.observables);
        self.observables.temperature = self.temperature;
    }

    /// Per-sorbate counts and mass fractions of the movable molecules, one entry per name.
    pub fn update_sorbate_info(&mut self, names: &[String]) {
        let volume = self.cell.volume();
        let total_mass: f64 = self.molecules.iter().map(|(_, m)| m.mass).sum();
        self.sorbate_info = names
            .iter()
            .map(|name| {
                let (count, mass) = self
                    .molecules
                    .iter()
                    .filter(|(_, m)| m.is_movable() && &m.molecule_type == name)
                    .fold((0usize, 0.0), |(n, mass), (_, m)| (n + 1, mass + m.mass));
                SorbateInfo {
                    n_molecules: count as f64,
                    mass,
                    percent_wt: if total_mass > 0.0 { 100.0 * mass / total_mass } else { 0.0 },
                    density: observables::density(mass, volume),
                }
            })
            .collect();
    }

    pub fn population_histogram(&mut self) {
        if let Some(histogram) = self.histogram.as_mut() {
            histogram.populate(&self.molecules, &self.cell);
        }
    }

    pub fn atom_count(&self) -> usize {
        self.molecules.atom_count()
    }

    /// Same molecule count, order and types as `other`.
    pub fn same_topology(&self, other: &Replica) -> bool {
        self.molecules.len() == other.molecules.len()
            && self
                .molecules
                .iter()
                .zip(other.molecules.iter())
                .all(|((_, a), (_, b))| a.molecule_type == b.molecule_type && a.atoms.len() == b.atoms.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::Atom;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn h2(center: Vector3<f64>) -> Molecule {
        Molecule::new(
            "H2",
            vec![
                Atom { atom_type: "H".into(), mass: 1.008, charge: 0.0, pos: center + Vector3::new(0.371, 0.0, 0.0) },
                Atom { atom_type: "H".into(), mass: 1.008, charge: 0.0, pos: center - Vector3::new(0.371, 0.0, 0.0) },
            ],
        )
    }

    fn replica() -> Replica {
        let mut list = MoleculeList::new();
        let mut wall = h2(Vector3::zeros());
        wall.frozen = true;
        list.push(wall);
        list.push(h2(Vector3::new(2.0, 0.0, 0.0)));
        list.push(h2(Vector3::new(4.0, 0.0, 0.0)));
        Replica::new(0, list, Cell::cubic(10.0).unwrap(), 20.0)
    }

    #[test]
    fn test_eligible_skips_frozen() {
        let r = replica();
        let eligible = r.eligible_molecules();
        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].index(), 1);
    }

    #[test]
    fn test_select_records_neighbours() {
        let mut r = replica();
        let id = r.eligible_molecules()[0];
        r.select_target(MoveType::Displace, id).unwrap();
        assert_eq!(r.checkpoint.head.map(|h| h.index()), Some(0));
        assert_eq!(r.checkpoint.tail.map(|t| t.index()), Some(2));
        assert!(r.checkpoint.molecule_backup.is_some());
    }

    #[test]
    fn test_restore_puts_backup_back() {
        let mut r = replica();
        let id = r.eligible_molecules()[1];
        r.select_target(MoveType::Displace, id).unwrap();
        r.backup_observables();
        r.target_molecule_mut().unwrap().translate(&Vector3::new(1.0, 1.0, 1.0));
        r.observables.energy = 42.0;
        r.solver_failed = true;
        r.restore();
        assert_relative_eq!(r.molecules[id].com, Vector3::new(4.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(r.observables.energy, 0.0);
        assert!(!r.solver_failed);
    }

    #[test]
    fn test_target_without_selection_is_internal() {
        let r = replica();
        assert!(matches!(r.target(), Err(PimcError::Internal(_))));
    }

    #[test]
    fn test_sorbate_info_counts_movable_only() {
        let mut r = replica();
        r.update_sorbate_info(&["H2".to_string(), "CO2".to_string()]);
        assert_eq!(r.sorbate_info.len(), 2);
        assert_relative_eq!(r.sorbate_info[0].n_molecules, 2.0);
        assert_relative_eq!(r.sorbate_info[0].percent_wt, 200.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(r.sorbate_info[1].mass, 0.0);
    }

    #[test]
    fn test_system_mass() {
        let mut r = replica();
        r.calc_system_mass();
        assert_relative_eq!(r.observables.frozen_mass, 2.016, epsilon = 1e-12);
        assert_relative_eq!(r.observables.total_mass, 3.0 * 2.016, epsilon = 1e-12);
        assert_relative_eq!(r.observables.n_molecules, 2.0);
        assert_relative_eq!(r.observables.spin_ratio, 1.0);
        assert_relative_eq!(r.observables.density, 2.0 * 2.016 * 1.66053906660 / 1000.0, epsilon = 1e-12);
    }
}
