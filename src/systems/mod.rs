//! Systems module - molecules, periodic cells and reference interactions.

mod cell;
mod lennard_jones;
mod molecule;
mod sorbate;

pub use cell::Cell;
pub use lennard_jones::{LennardJones, LjParameters};
pub use molecule::{align, orthogonal_to, Atom, Molecule, MoleculeId, MoleculeList, NuclearSpin};
pub use sorbate::{SorbateData, SorbateTable};
