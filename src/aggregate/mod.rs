//! Aggregate module - cross-replica bookkeeping at the root.
//!
//! Every correlation interval each replica packs its records into one buffer
//! (`wire`), the buffers are gathered at the root in replica order, and the
//! root folds them into the energy log and the running averages.

mod averages;
mod wire;

pub use averages::{EnsembleAverages, RunningAverage};
pub use wire::{MessageLayout, ReplicaMessage};

use tracing::info;

use crate::error::PimcResult;
use crate::io::{EnergyLog, EnergyRecord};
use crate::replica::{AvgNodeStats, Observables};

pub struct Aggregator {
    layout: MessageLayout,
    sorbate_names: Vec<String>,
    log: EnergyLog,
    pub averages: EnsembleAverages,
}

impl Aggregator {
    pub fn new(layout: MessageLayout, sorbate_names: Vec<String>, log: EnergyLog) -> Self {
        let averages = EnsembleAverages {
            sorbate_n_molecules: vec![RunningAverage::default(); layout.sorbate_records()],
            sorbate_percent_wt: vec![RunningAverage::default(); layout.sorbate_records()],
            histogram: vec![0; layout.histogram_bins],
            ..EnsembleAverages::default()
        };
        Self {
            layout,
            sorbate_names,
            log,
            averages,
        }
    }

    pub fn layout(&self) -> &MessageLayout {
        &self.layout
    }

    /// Log the starting energy of every replica before the first step and fold
    /// it into the energy average (coldest bath only under tempering).
    pub fn record_initial(
        &mut self,
        energies: &[f64],
        temperature: f64,
        tempering_index: Option<&[usize]>,
    ) -> PimcResult<()> {
        for (replica, &energy) in energies.iter().enumerate() {
            let obs = Observables { energy, ..Observables::default() };
            self.log
                .record(&EnergyRecord::new(0, replica, temperature, &obs, &AvgNodeStats::default()))?;
            if tempering_index.map_or(true, |index| index.get(replica) == Some(&0)) {
                self.averages.energy.push(energy);
            }
        }
        let mean = energies.iter().sum::<f64>() / energies.len().max(1) as f64;
        info!(energy = mean, temperature, "initial ring energy");
        self.log.flush()
    }

    /// Fold one gathered table (buffers ordered by replica) into the log and the averages.
    ///
    /// Under parallel tempering `tempering_index[j]` is replica j's temperature
    /// rank and only the rank-0 replica feeds the ensemble averages.
    pub fn consume(
        &mut self,
        step: usize,
        table: &[Vec<u8>],
        temperatures: &[f64],
        tempering_index: Option<&[usize]>,
    ) -> PimcResult<()> {
        for (j, bytes) in table.iter().enumerate() {
            let msg = ReplicaMessage::unpack(bytes, &self.layout)?;
            let temperature = temperatures.get(j).copied().unwrap_or(msg.observables.temperature);
            self.log.record(&EnergyRecord::new(
                step,
                j,
                temperature,
                &msg.observables,
                &msg.avg_node_stats,
            ))?;

            let avg = &mut self.averages;
            avg.acceptance_rate.push(msg.avg_node_stats.acceptance_rate);
            avg.boltzmann_factor.push(msg.avg_node_stats.boltzmann_factor);

            let contributes = tempering_index.map_or(true, |index| index.get(j) == Some(&0));
            if !contributes {
                continue;
            }
            let obs = &msg.observables;
            avg.energy.push(obs.energy);
            avg.coulombic_energy.push(obs.coulombic_energy);
            avg.polarization_energy.push(obs.polarization_energy);
            avg.vdw_energy.push(obs.vdw_energy);
            avg.three_body_energy.push(obs.three_body_energy);
            avg.n_molecules.push(obs.n_molecules);
            avg.density.push(obs.density);
            avg.spin_ratio.push(obs.spin_ratio);
            for (total, &c) in avg.histogram.iter_mut().zip(&msg.histogram) {
                *total += c as i64;
            }
            for (k, s) in msg.sorbates.iter().enumerate() {
                avg.sorbate_n_molecules[k].push(s.n_molecules);
                avg.sorbate_percent_wt[k].push(s.percent_wt);
            }
        }
        self.log.flush()
    }

    /// Summary of the running averages at `step`.
    pub fn output_file_data(&self, step: usize) {
        let avg = &self.averages;
        info!(
            step,
            energy = avg.energy.mean(),
            energy_err = avg.energy.std_error(),
            vdw = avg.vdw_energy.mean(),
            coulombic = avg.coulombic_energy.mean(),
            polarization = avg.polarization_energy.mean(),
            n_molecules = avg.n_molecules.mean(),
            density = avg.density.mean(),
            acceptance = avg.acceptance_rate.mean(),
            boltzmann_factor = avg.boltzmann_factor.mean(),
            "ensemble averages"
        );
        for (k, name) in self.sorbate_names.iter().enumerate().take(avg.sorbate_n_molecules.len()) {
            info!(
                sorbate = %name,
                n_molecules = avg.sorbate_n_molecules[k].mean(),
                percent_wt = avg.sorbate_percent_wt[k].mean(),
                "sorbate averages"
            );
        }
    }
}
