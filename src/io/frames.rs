//! Path-integral trajectory frames (xyz): every bead of every molecule in one frame.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PimcError, PimcResult};
use crate::replica::Replica;

#[derive(Debug, Clone)]
pub struct FrameWriter {
    path: PathBuf,
    frame_number: usize,
}

impl FrameWriter {
    /// Frames of participant `rank` go to `<dir>/frames.<rank>.xyz`.
    pub fn new(dir: &Path, rank: usize) -> Self {
        Self {
            path: dir.join(format!("frames.{}.xyz", rank)),
            frame_number: 1,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    /// Overwrites the file on the first frame, appends afterwards.
    pub fn write_frame(&mut self, replicas: &[Replica]) -> PimcResult<()> {
        let file = if self.frame_number == 1 {
            File::create(&self.path)
        } else {
            OpenOptions::new().append(true).create(true).open(&self.path)
        }
        .map_err(|e| PimcError::file_write(&self.path, e))?;
        let mut out = BufWriter::new(file);

        let n_sites: usize = replicas.iter().map(|r| r.atom_count()).sum();
        write!(out, "{}\nFrame: {}\n", n_sites, self.frame_number).map_err(|e| PimcError::file_write(&self.path, e))?;
        for replica in replicas {
            for (_, molecule) in replica.molecules.iter() {
                for atom in &molecule.atoms {
                    writeln!(out, "{} {:.4} {:.4} {:.4}", atom.atom_type, atom.pos.x, atom.pos.y, atom.pos.z)
                        .map_err(|e| PimcError::file_write(&self.path, e))?;
                }
            }
        }
        out.flush().map_err(|e| PimcError::file_write(&self.path, e))?;
        self.frame_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::{Atom, Cell, Molecule, MoleculeList};
    use nalgebra::Vector3;
    use tempfile::tempdir;

    fn replicas() -> Vec<Replica> {
        (0..4)
            .map(|i| {
                let mut list = MoleculeList::new();
                list.push(Molecule::new(
                    "He",
                    vec![Atom { atom_type: "He".into(), mass: 4.0026, charge: 0.0, pos: Vector3::new(i as f64, 0.5, -1.25) }],
                ));
                Replica::new(i, list, Cell::cubic(10.0).unwrap(), 4.0)
            })
            .collect()
    }

    #[test]
    fn test_header_and_append() {
        let dir = tempdir().unwrap();
        let mut writer = FrameWriter::new(dir.path(), 0);
        let reps = replicas();
        writer.write_frame(&reps).unwrap();
        writer.write_frame(&reps).unwrap();

        let text = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2 * (2 + 4));
        assert_eq!(lines[0], "4");
        assert_eq!(lines[1], "Frame: 1");
        assert_eq!(lines[2], "He 0.0000 0.5000 -1.2500");
        assert_eq!(lines[7], "Frame: 2");
    }

    #[test]
    fn test_first_frame_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.0.xyz");
        std::fs::write(&path, "stale\nstale\n").unwrap();
        let mut writer = FrameWriter::new(dir.path(), 0);
        writer.write_frame(&replicas()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("4\nFrame: 1\n"));
        assert!(!text.contains("stale"));
    }
}
