//! Per-replica PQR output: appended trajectory, restart and final configuration.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PimcError, PimcResult};
use crate::replica::Replica;
use crate::sampling::ReplicaOutput;

#[derive(Debug, Clone)]
pub struct PqrOutput {
    dir: PathBuf,
    /// Replicas whose trajectory has been started in this run
    started: Vec<usize>,
    write_restart: bool,
    write_trajectory: bool,
}

impl PqrOutput {
    pub fn new(dir: &Path, write_restart: bool, write_trajectory: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            started: Vec::new(),
            write_restart,
            write_trajectory,
        }
    }

    pub fn path(&self, kind: &str, replica: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.pqr", kind, replica))
    }

    fn write(path: &Path, replica: &Replica, append: bool) -> PimcResult<()> {
        let file = if append {
            OpenOptions::new().append(true).create(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(|e| PimcError::file_write(path, e))?;
        let mut out = BufWriter::new(file);
        Self::format(&mut out, replica).map_err(|e| PimcError::file_write(path, e))
    }

    fn format<W: Write>(out: &mut W, replica: &Replica) -> std::io::Result<()> {
        writeln!(
            out,
            "REMARK replica {} step {} temperature {:.4} energy {:.6}",
            replica.index, replica.step, replica.temperature, replica.observables.energy
        )?;
        let mut serial = 1;
        for (resid, (_, molecule)) in replica.molecules.iter().enumerate() {
            let flag = if molecule.frozen { "F" } else { "M" };
            for atom in &molecule.atoms {
                writeln!(
                    out,
                    "ATOM  {:5} {:<4} {:<3} {} {:4}    {:8.3}{:8.3}{:8.3} {:8.5} {:6.3}",
                    serial,
                    atom.atom_type,
                    molecule.molecule_type,
                    flag,
                    resid + 1,
                    atom.pos.x,
                    atom.pos.y,
                    atom.pos.z,
                    atom.charge,
                    atom.mass
                )?;
                serial += 1;
            }
        }
        writeln!(out, "END")?;
        out.flush()
    }
}

impl ReplicaOutput for PqrOutput {
    fn write_states(&mut self, replica: &Replica) -> PimcResult<()> {
        if !self.write_trajectory {
            return Ok(());
        }
        let append = self.started.contains(&replica.index);
        if !append {
            self.started.push(replica.index);
        }
        Self::write(&self.path("traj", replica.index), replica, append)
    }

    fn write_restart(&mut self, replica: &Replica) -> PimcResult<()> {
        if !self.write_restart {
            return Ok(());
        }
        Self::write(&self.path("restart", replica.index), replica, false)
    }

    fn write_final(&mut self, replica: &Replica) -> PimcResult<()> {
        Self::write(&self.path("final", replica.index), replica, false)
    }
}
