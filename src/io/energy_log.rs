//! Energy log written by the root: one text line and one CSV row per replica slot.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PimcError, PimcResult};
use crate::replica::{AvgNodeStats, Observables};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyRecord {
    pub step: usize,
    pub replica: usize,
    pub temperature: f64,
    pub energy: f64,
    pub coulombic: f64,
    pub polarization: f64,
    pub vdw: f64,
    pub three_body: f64,
    pub n_molecules: f64,
    pub density: f64,
    pub acceptance_rate: f64,
    pub boltzmann_factor: f64,
}

impl EnergyRecord {
    pub fn new(step: usize, replica: usize, temperature: f64, obs: &Observables, stats: &AvgNodeStats) -> Self {
        Self {
            step,
            replica,
            temperature,
            energy: obs.energy,
            coulombic: obs.coulombic_energy,
            polarization: obs.polarization_energy,
            vdw: obs.vdw_energy,
            three_body: obs.three_body_energy,
            n_molecules: obs.n_molecules,
            density: obs.density,
            acceptance_rate: stats.acceptance_rate,
            boltzmann_factor: stats.boltzmann_factor,
        }
    }
}

#[derive(Default)]
pub struct EnergyLog {
    text: Option<(PathBuf, BufWriter<File>)>,
    csv: Option<csv::Writer<File>>,
}

impl EnergyLog {
    /// Open (truncating) the requested outputs; `None` disables a stream.
    pub fn create(text_path: Option<&Path>, csv_path: Option<&Path>) -> PimcResult<Self> {
        let text = match text_path {
            Some(path) => {
                let mut writer = BufWriter::new(File::create(path).map_err(|e| PimcError::file_write(path, e))?);
                writeln!(
                    writer,
                    "#step replica temperature energy coulombic polarization vdw three_body n_molecules density acceptance boltzmann_factor"
                )
                .map_err(|e| PimcError::file_write(path, e))?;
                Some((path.to_path_buf(), writer))
            }
            None => None,
        };
        let csv = csv_path.map(csv::Writer::from_path).transpose()?;
        Ok(Self { text, csv })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rec: &EnergyRecord) -> PimcResult<()> {
        if let Some((path, writer)) = self.text.as_mut() {
            writeln!(
                writer,
                "{} {} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.3} {:.6} {:.6} {:.6}",
                rec.step,
                rec.replica,
                rec.temperature,
                rec.energy,
                rec.coulombic,
                rec.polarization,
                rec.vdw,
                rec.three_body,
                rec.n_molecules,
                rec.density,
                rec.acceptance_rate,
                rec.boltzmann_factor
            )
            .map_err(|e| PimcError::file_write(path.as_path(), e))?;
        }
        if let Some(csv) = self.csv.as_mut() {
            csv.serialize(rec)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> PimcResult<()> {
        if let Some((path, writer)) = self.text.as_mut() {
            writer.flush().map_err(|e| PimcError::file_write(path.as_path(), e))?;
        }
        if let Some(csv) = self.csv.as_mut() {
            csv.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_text_and_csv_rows() {
        let dir = tempdir().unwrap();
        let text = dir.path().join("energy.dat");
        let csv_path = dir.path().join("energy.csv");
        let mut log = EnergyLog::create(Some(text.as_path()), Some(csv_path.as_path())).unwrap();
        let obs = Observables { energy: -12.5, vdw_energy: -12.5, ..Observables::default() };
        for replica in 0..2 {
            log.record(&EnergyRecord::new(10, replica, 77.0, &obs, &AvgNodeStats::default())).unwrap();
        }
        log.flush().unwrap();

        let lines: Vec<_> = std::fs::read_to_string(&text).unwrap().lines().map(String::from).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("10 0 77.000000 -12.500000"));

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "step");
        assert_eq!(reader.records().count(), 2);
    }
}
