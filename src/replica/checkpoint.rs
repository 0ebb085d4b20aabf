use crate::replica::Observables;
use crate::sampling::MoveType;
use crate::systems::{Molecule, MoleculeId};

/// The pending move of one replica and everything needed to undo it.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub move_type: MoveType,
    /// Molecule targeted for perturbation
    pub target: Option<MoleculeId>,
    /// Predecessor of the target in the molecule list (None when it is first)
    pub head: Option<MoleculeId>,
    /// Successor of the target in the molecule list
    pub tail: Option<MoleculeId>,
    pub molecule_backup: Option<Molecule>,
    /// Last accepted observables
    pub observables: Observables,
    pub biased_move: bool,
}

impl Checkpoint {
    /// Record a new target. Any previous backup is released before the new one is stored.
    pub fn select(
        &mut self,
        move_type: MoveType,
        target: MoleculeId,
        head: Option<MoleculeId>,
        tail: Option<MoleculeId>,
        backup: Molecule,
    ) {
        self.molecule_backup = None;
        self.move_type = move_type;
        self.target = Some(target);
        self.head = head;
        self.tail = tail;
        self.biased_move = false;
        self.molecule_backup = Some(backup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::{Atom, MoleculeList};
    use nalgebra::Vector3;

    fn molecule(name: &str) -> Molecule {
        let atom = Atom {
            atom_type: "He".into(),
            mass: 4.0026,
            charge: 0.0,
            pos: Vector3::zeros(),
        };
        Molecule::new(name, vec![atom])
    }

    #[test]
    fn test_reselect_replaces_backup() {
        let mut list = MoleculeList::new();
        let a = list.push(molecule("A"));
        let b = list.push(molecule("B"));

        let mut checkpoint = Checkpoint { biased_move: true, ..Checkpoint::default() };
        checkpoint.select(MoveType::Displace, a, None, Some(b), molecule("A"));
        assert_eq!(checkpoint.head, None);
        assert!(!checkpoint.biased_move);

        checkpoint.select(MoveType::SpinFlip, b, Some(a), None, molecule("B"));
        assert_eq!(checkpoint.target, Some(b));
        assert_eq!(checkpoint.head, Some(a));
        assert_eq!(checkpoint.move_type, MoveType::SpinFlip);
        assert_eq!(
            checkpoint.molecule_backup.as_ref().map(|m| m.molecule_type.as_str()),
            Some("B")
        );
    }
}
