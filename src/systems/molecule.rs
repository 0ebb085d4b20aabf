//! Molecules and the per-replica molecule arena.
//!
//! A replica's molecules live in a `MoleculeList`: an arena with stable
//! `MoleculeId` handles and predecessor/successor links. Handles never move, so a
//! checkpoint can keep the handles of a target and its neighbours and restore a
//! backup into the same slot without touching the rest of the list.

use nalgebra::{Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// An atomic site.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Atom {
    pub atom_type: String,
    /// Mass in AMU
    pub mass: f64,
    /// Partial charge in e
    #[serde(default)]
    pub charge: f64,
    /// Position in Angstrom
    pub pos: Vector3<f64>,
}

/// Two-valued nuclear spin label of a homonuclear rotor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NuclearSpin {
    #[default]
    Para,
    Ortho,
}

impl NuclearSpin {
    pub fn flipped(self) -> Self {
        match self {
            NuclearSpin::Para => NuclearSpin::Ortho,
            NuclearSpin::Ortho => NuclearSpin::Para,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub molecule_type: String,
    pub atoms: Vec<Atom>,
    /// Total mass in AMU
    pub mass: f64,
    /// Center of mass in Angstrom
    pub com: Vector3<f64>,
    pub frozen: bool,
    pub adiabatic: bool,
    /// Externally fixed target molecule
    pub target: bool,
    pub nuclear_spin: NuclearSpin,
    /// Rotational partition-function weights (gerade / ungerade)
    pub rot_partfunc_g: f64,
    pub rot_partfunc_u: f64,
}

impl Molecule {
    pub fn new(molecule_type: impl Into<String>, atoms: Vec<Atom>) -> Self {
        let mass = atoms.iter().map(|a| a.mass).sum();
        let mut molecule = Self {
            molecule_type: molecule_type.into(),
            atoms,
            mass,
            com: Vector3::zeros(),
            frozen: false,
            adiabatic: false,
            target: false,
            nuclear_spin: NuclearSpin::Para,
            rot_partfunc_g: 1.0,
            rot_partfunc_u: 1.0,
        };
        molecule.update_com();
        molecule
    }

    /// Eligible as a Monte Carlo target
    pub fn is_movable(&self) -> bool {
        !(self.frozen || self.adiabatic || self.target)
    }

    pub fn update_com(&mut self) {
        if self.atoms.is_empty() {
            return;
        }
        if self.mass > 0.0 {
            let weighted: Vector3<f64> = self.atoms.iter().map(|a| a.pos * a.mass).sum();
            self.com = weighted / self.mass;
        } else {
            let sum: Vector3<f64> = self.atoms.iter().map(|a| a.pos).sum();
            self.com = sum / self.atoms.len() as f64;
        }
    }

    pub fn translate(&mut self, shift: &Vector3<f64>) {
        for atom in self.atoms.iter_mut() {
            atom.pos += shift;
        }
        self.com += shift;
    }

    /// Rigidly move the molecule so that its COM sits at `com`.
    pub fn move_to(&mut self, com: &Vector3<f64>) {
        self.update_com();
        let shift = com - self.com;
        self.translate(&shift);
    }

    /// Rotate every site about `center`.
    pub fn rotate_about(&mut self, rotation: &UnitQuaternion<f64>, center: &Vector3<f64>) {
        for atom in self.atoms.iter_mut() {
            atom.pos = center + rotation * (atom.pos - center);
        }
        self.update_com();
    }

    /// Unit vector from the COM to the handle site, if it is well defined.
    pub fn bond_direction(&self, site: usize) -> Option<Vector3<f64>> {
        let handle = self.atoms.get(site)?;
        Unit::try_new(handle.pos - self.com, 1e-12).map(|u| u.into_inner())
    }

    /// Rotate the molecule about its COM so the handle site points along `direction`.
    /// Returns false when the handle is missing or sits on the COM.
    pub fn orient(&mut self, direction: &Vector3<f64>, site: usize) -> bool {
        self.update_com();
        let Some(current) = self.bond_direction(site) else {
            return false;
        };
        let rotation = align(&current, direction);
        let center = self.com;
        self.rotate_about(&rotation, &center);
        true
    }
}

/// Any unit vector orthogonal to `v`.
pub fn orthogonal_to(v: &Vector3<f64>) -> Vector3<f64> {
    let different = (Vector3::new(1.0, 2.0, -3.0) + v).normalize();
    let ortho = different.cross(v);
    match Unit::try_new(ortho, 1e-12) {
        Some(u) => u.into_inner(),
        None => v.cross(&Vector3::x()).try_normalize(1e-12).unwrap_or_else(Vector3::y),
    }
}

/// Shortest rotation taking direction `from` onto direction `to`.
pub fn align(from: &Vector3<f64>, to: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        // antiparallel (or degenerate): half turn about any perpendicular axis
        let axis = Unit::new_normalize(orthogonal_to(from));
        UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI)
    })
}

/// Stable handle into a `MoleculeList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoleculeId(usize);

impl MoleculeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    molecule: Molecule,
    prev: Option<MoleculeId>,
    next: Option<MoleculeId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoleculeList {
    nodes: Vec<Node>,
    head: Option<MoleculeId>,
    tail: Option<MoleculeId>,
}

impl MoleculeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a molecule at the end of the list.
    pub fn push(&mut self, molecule: Molecule) -> MoleculeId {
        let id = MoleculeId(self.nodes.len());
        self.nodes.push(Node {
            molecule,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: MoleculeId) -> Option<&Molecule> {
        self.nodes.get(id.0).map(|n| &n.molecule)
    }

    pub fn get_mut(&mut self, id: MoleculeId) -> Option<&mut Molecule> {
        self.nodes.get_mut(id.0).map(|n| &mut n.molecule)
    }

    pub fn predecessor(&self, id: MoleculeId) -> Option<MoleculeId> {
        self.nodes.get(id.0).and_then(|n| n.prev)
    }

    pub fn successor(&self, id: MoleculeId) -> Option<MoleculeId> {
        self.nodes.get(id.0).and_then(|n| n.next)
    }

    /// Put `molecule` into the slot of `id`, keeping its links, and hand back the old occupant.
    pub fn replace(&mut self, id: MoleculeId, molecule: Molecule) -> Option<Molecule> {
        self.nodes
            .get_mut(id.0)
            .map(|n| std::mem::replace(&mut n.molecule, molecule))
    }

    /// Walk the list from head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn ids(&self) -> Vec<MoleculeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn atom_count(&self) -> usize {
        self.iter().map(|(_, m)| m.atoms.len()).sum()
    }
}

impl Index<MoleculeId> for MoleculeList {
    type Output = Molecule;

    fn index(&self, id: MoleculeId) -> &Molecule {
        &self.nodes[id.0].molecule
    }
}

impl IndexMut<MoleculeId> for MoleculeList {
    fn index_mut(&mut self, id: MoleculeId) -> &mut Molecule {
        &mut self.nodes[id.0].molecule
    }
}

pub struct Iter<'a> {
    list: &'a MoleculeList,
    cursor: Option<MoleculeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (MoleculeId, &'a Molecule);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.list.nodes[id.0];
        self.cursor = node.next;
        Some((id, &node.molecule))
    }
}
