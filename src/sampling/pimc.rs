//! Path Integral Monte Carlo in the NVT ensemble.
//!
//! Each molecule is a closed ring of P beads, one bead per replica. A step
//! proposes one move of one molecule on every bead at once, evaluates the
//! acceptance factor (potential energy plus the ring spring terms for bead
//! perturbations) and commits or rolls back every replica together.
//!
//! Reference: Ceperley, D.M. (1995) "Path integrals in the theory of condensed helium"
//! Rev. Mod. Phys. 67, 279
//!
//! Every participant of a replica group holds all P replicas and the same
//! random stream. Moves are replayed identically everywhere; the only work
//! split between participants is the potential energy, which each one
//! computes for its own replica and shares with `all_gather`.

use std::ops::Range;
use tracing::{debug, error, info};

use super::kernel::{BoltzmannKernel, Contribution, Proposal};
use super::moves::{self, MoveSettings, MoveType};
use super::orientation::OrientationSampler;
use super::random::RandomStream;
use super::ring;
use super::staging::StagingSampler;
use super::tempering::{AnnealingSchedule, Tempering};
use super::traits::{EnergyCalculator, ReplicaOutput};
use crate::aggregate::{Aggregator, MessageLayout, ReplicaMessage};
use crate::comm::Communicator;
use crate::constants::MAXVALUE;
use crate::error::{PimcError, PimcResult};
use crate::io::{EnergyLog, FrameWriter, SimulationConfig};
use crate::replica::Replica;
use crate::systems::{SorbateData, SorbateTable};

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub accepted: u64,
    pub rejected: u64,
    /// Ring energy of the last accepted state, K
    pub energy: f64,
    pub temperature: f64,
}

pub struct PathIntegralNvt<E: EnergyCalculator, C: Communicator, O: ReplicaOutput> {
    config: SimulationConfig,
    settings: MoveSettings,
    trial_chain_length: usize,
    replicas: Vec<Replica>,
    sorbates: SorbateTable,
    sorbate_names: Vec<String>,
    energy_model: E,
    comm: C,
    output: O,
    rng: RandomStream,
    staging: StagingSampler,
    orientation: OrientationSampler,
    tempering: Option<Tempering>,
    annealing: Option<AnnealingSchedule>,
    aggregator: Aggregator,
    frames: FrameWriter,
    temperature: f64,
    step: usize,
    energy: Contribution,
    chain_length: Contribution,
    orientation_distance: Contribution,
    move_type: MoveType,
}

impl<E: EnergyCalculator, C: Communicator, O: ReplicaOutput> PathIntegralNvt<E, C, O> {
    /// Set up a run over `replicas` (all P of them, on every participant).
    ///
    /// # Arguments
    /// * `comm` - group of size 1 (all replicas here) or P (one replica per participant)
    /// * `seed` - seed of the shared random stream, identical on every participant
    pub fn new(
        config: SimulationConfig,
        mut replicas: Vec<Replica>,
        energy_model: E,
        comm: C,
        output: O,
        seed: u64,
    ) -> PimcResult<Self> {
        config.validate()?;
        let p = config.trotter_number;
        if replicas.len() != p {
            error!(requested = p, observed = replicas.len(), "replica set does not match trotter number");
            return Err(PimcError::InvalidReplicaCount {
                requested: p,
                observed: replicas.len(),
            });
        }
        if comm.size() != 1 && comm.size() != p {
            error!(requested = p, observed = comm.size(), "replica group size must be 1 or the trotter number");
            return Err(PimcError::InvalidReplicaCount {
                requested: p,
                observed: comm.size(),
            });
        }
        for (i, replica) in replicas.iter().enumerate() {
            if !replica.same_topology(&replicas[0]) {
                return Err(PimcError::Internal(format!(
                    "replica {} molecule list differs from replica 0",
                    i
                )));
            }
        }
        for (i, replica) in replicas.iter_mut().enumerate() {
            replica.index = i;
        }

        let output_dir = config.output.output_dir.clone();
        let log = if comm.is_root() {
            let text = config.output.energy_output.as_ref().map(|f| output_dir.join(f));
            let csv = config.output.energy_output_csv.as_ref().map(|f| output_dir.join(f));
            EnergyLog::create(text.as_deref(), csv.as_deref())?
        } else {
            EnergyLog::disabled()
        };
        let histogram_bins = config.output.histogram_bins.map_or(0, |b| b.pow(3));
        let layout = MessageLayout::new(histogram_bins, config.sorbates.len());
        let sorbate_names = config.sorbate_names();

        let temperature = config.temperature;
        let tempering = config
            .parallel_tempering
            .map(|pt| Tempering::new(temperature, pt.max_temperature, p, pt.frequency));
        if let Some(t) = &tempering {
            t.apply(&mut replicas);
        }

        info!(
            beads = p,
            group = comm.size(),
            rank = comm.rank(),
            temperature,
            steps = config.numsteps,
            trial_chain_length = config.trial_chain_length()?,
            "path-integral NVT set up"
        );

        Ok(Self {
            settings: config.moves.settings(),
            trial_chain_length: config.trial_chain_length()?,
            sorbates: SorbateTable::new(&config.sorbates),
            sorbate_names: sorbate_names.clone(),
            annealing: config.simulated_annealing.map(|a| a.schedule()),
            aggregator: Aggregator::new(layout, sorbate_names, log),
            frames: FrameWriter::new(&output_dir, comm.rank()),
            rng: RandomStream::new(seed),
            staging: StagingSampler::new(),
            orientation: OrientationSampler::new(p),
            replicas,
            energy_model,
            comm,
            output,
            tempering,
            temperature,
            step: 0,
            energy: Contribution::default(),
            chain_length: Contribution::default(),
            orientation_distance: Contribution::default(),
            move_type: MoveType::Displace,
            config,
        })
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn energy(&self) -> Contribution {
        self.energy
    }

    pub fn move_type(&self) -> MoveType {
        self.move_type
    }

    pub fn tempering(&self) -> Option<&Tempering> {
        self.tempering.as_ref()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    fn is_serial(&self) -> bool {
        self.comm.size() == 1
    }

    /// Replicas whose energy and files this participant owns.
    fn local_range(&self) -> Range<usize> {
        if self.is_serial() {
            0..self.replicas.len()
        } else {
            self.comm.rank()..self.comm.rank() + 1
        }
    }

    pub fn run(&mut self) -> PimcResult<RunSummary> {
        let n_steps = self.config.numsteps;
        self.setup()?;

        for step in 1..=n_steps {
            self.step = step;
            self.monte_carlo_step(step)?;

            if let Some(tempering) = self.tempering.as_mut() {
                if step % tempering.frequency == 0 {
                    let energies: Vec<f64> = self.replicas.iter().map(|r| r.observables.energy).collect();
                    tempering.attempt_swap(&energies, &mut self.rng);
                    tempering.apply(&mut self.replicas);
                }
            }

            for replica in self.replicas.iter_mut() {
                replica.node_stats.track_ar();
                let stats = replica.node_stats;
                replica.avg_node_stats.update(&stats);
            }

            if step % self.config.corrtime == 0 || step == n_steps {
                self.bookkeeping()?;
            }
        }

        self.comm.barrier()?;
        if self.comm.is_root() && self.config.output.write_pi_frames {
            self.frames.write_frame(&self.replicas)?;
        }
        self.comm.barrier()?;

        for i in self.local_range() {
            self.output.write_final(&self.replicas[i])?;
        }

        let stats = self.replicas[0].node_stats;
        info!(
            steps = n_steps,
            accepted = stats.accept,
            rejected = stats.reject,
            energy = self.energy.current,
            temperature = self.temperature,
            "run complete"
        );
        Ok(RunSummary {
            steps: n_steps,
            accepted: stats.accept,
            rejected: stats.reject,
            energy: self.energy.current,
            temperature: self.temperature,
        })
    }

    fn setup(&mut self) -> PimcResult<()> {
        for replica in self.replicas.iter_mut() {
            replica.observables.volume = replica.cell.volume();
        }
        if !self.config.parallel_restarts {
            self.staging
                .bootstrap(&mut self.replicas, self.temperature, &mut self.rng)?;
        }

        let energy = self.system_energy()?;
        self.energy.current = if energy.is_finite() { energy } else { MAXVALUE };
        for replica in self.replicas.iter_mut() {
            replica.calc_system_mass();
        }
        if self.comm.is_root() {
            let energies: Vec<f64> = self.replicas.iter().map(|r| r.observables.energy).collect();
            let index = self.tempering.as_ref().map(|t| t.index());
            self.aggregator
                .record_initial(&energies, self.temperature, index.as_deref())?;
        }
        for replica in self.replicas.iter_mut() {
            replica.backup_observables();
        }
        self.move_type = moves::pick_move(&mut self.replicas, &self.settings, &mut self.rng)?;
        Ok(())
    }

    fn monte_carlo_step(&mut self, step: usize) -> PimcResult<()> {
        for replica in self.replicas.iter_mut() {
            replica.step = step;
        }
        let executed = self.move_type;
        let p = self.replicas.len() as f64;
        self.energy.init = self.replicas.iter().map(|r| r.observables.energy).sum::<f64>() / p;

        if executed == MoveType::PerturbBeads {
            self.chain_length.init = ring::chain_length(&self.replicas)?;
            self.orientation_distance.init = ring::orientation_distance(&self.replicas, self.target_sorbate()?)?;
        }

        self.make_move()?;

        self.energy.trial = self.system_energy()?;
        if executed == MoveType::PerturbBeads {
            self.chain_length.trial = ring::chain_length(&self.replicas)?;
            self.orientation_distance.trial = ring::orientation_distance(&self.replicas, self.target_sorbate()?)?;
        }

        let verdict = BoltzmannKernel::evaluate(&Proposal {
            move_type: executed,
            energy: self.energy,
            chain_length: self.chain_length,
            orientation_distance: self.orientation_distance,
            target: self.replicas[0].target_molecule()?,
            sorbate: self.target_sorbate()?,
            n_beads: self.replicas.len(),
            temperature: self.temperature,
        })?;
        self.energy.trial = verdict.trial_energy;
        for replica in self.replicas.iter_mut() {
            if !replica.observables.energy.is_finite() {
                replica.observables.energy = MAXVALUE;
            }
            replica.node_stats.boltzmann_factor = verdict.factor;
        }

        let solver_failed = self.solver_failed()?;
        let roll = self.rng.uniform();
        if roll < verdict.factor && !solver_failed {
            self.energy.current = self.energy.trial;
            self.chain_length.current = self.chain_length.trial;
            self.orientation_distance.current = self.orientation_distance.trial;
            for replica in self.replicas.iter_mut() {
                replica.backup_observables();
                replica.node_stats.register_accept(executed);
            }
            debug!(step, %executed, factor = verdict.factor, energy = self.energy.current, "accepted");
            self.move_type = moves::pick_move(&mut self.replicas, &self.settings, &mut self.rng)?;

            if let Some(schedule) = self.annealing {
                self.temperature = schedule.next(self.temperature, step, self.config.numsteps);
                if self.tempering.is_none() {
                    for replica in self.replicas.iter_mut() {
                        replica.temperature = self.temperature;
                    }
                }
            }
        } else {
            self.energy.current = self.energy.init;
            self.chain_length.current = self.chain_length.init;
            self.orientation_distance.current = self.orientation_distance.init;
            for replica in self.replicas.iter_mut() {
                replica.restore();
                replica.node_stats.register_reject(executed);
            }
            debug!(step, %executed, factor = verdict.factor, solver_failed, "rejected");
            self.move_type = moves::pick_move(&mut self.replicas, &self.settings, &mut self.rng)?;
        }
        Ok(())
    }

    fn target_sorbate(&self) -> PimcResult<Option<&SorbateData>> {
        let molecule = self.replicas[0].target_molecule()?;
        Ok(self.sorbates.get(&molecule.molecule_type))
    }

    fn make_move(&mut self) -> PimcResult<()> {
        match self.move_type {
            MoveType::Displace => moves::displace(&mut self.replicas, &self.settings, &mut self.rng, &self.comm),
            MoveType::SpinFlip => moves::spin_flip(&mut self.replicas),
            MoveType::PerturbBeads => {
                let molecule_type = self.replicas[0].target_molecule()?.molecule_type.clone();
                let sorbate = self.sorbates.get(&molecule_type);
                self.orientation
                    .perturb_target(&mut self.replicas, sorbate, self.temperature, &mut self.rng)?;
                self.staging.perturb_target(
                    &mut self.replicas,
                    self.trial_chain_length,
                    self.temperature,
                    self.config.moves.pi_bead_perturb_factor,
                    &mut self.rng,
                )
            }
            other => Err(PimcError::InvalidMonteCarloMove(format!(
                "{} moves are not available for path integrals",
                other
            ))),
        }
    }

    /// Ring energy: the mean of the replicas' potential energies, or the first
    /// non-finite replica energy.
    fn system_energy(&mut self) -> PimcResult<f64> {
        if self.is_serial() {
            for replica in self.replicas.iter_mut() {
                let terms = self.energy_model.potential_energy(replica);
                replica.set_energy_terms(&terms);
            }
            let mut sum = 0.0;
            for replica in &self.replicas {
                let e = replica.observables.energy;
                if !e.is_finite() {
                    return Ok(e);
                }
                sum += e;
            }
            Ok(sum / self.replicas.len() as f64)
        } else {
            let rank = self.comm.rank();
            let terms = self.energy_model.potential_energy(&self.replicas[rank]);
            self.replicas[rank].set_energy_terms(&terms);
            let energies = self.comm.all_gather(self.replicas[rank].observables.energy)?;
            for (replica, e) in self.replicas.iter_mut().zip(&energies) {
                replica.observables.energy = *e;
            }
            if let Some(bad) = energies.iter().find(|e| !e.is_finite()) {
                return Ok(*bad);
            }
            Ok(energies.iter().sum::<f64>() / energies.len() as f64)
        }
    }

    /// True when any replica's solver failed; agreed on by the whole group.
    fn solver_failed(&self) -> PimcResult<bool> {
        if self.is_serial() {
            Ok(self.replicas.iter().any(|r| r.solver_failed))
        } else {
            let local = if self.replicas[self.comm.rank()].solver_failed { 1.0 } else { 0.0 };
            Ok(self.comm.reduce_sum(local)? > 0.0)
        }
    }

    /// Correlation-interval pass: local accounting, ordered file output, gather at the root.
    fn bookkeeping(&mut self) -> PimcResult<()> {
        if self.comm.is_root() && self.config.output.write_pi_frames {
            self.frames.write_frame(&self.replicas)?;
        }

        for i in self.local_range() {
            let replica = &mut self.replicas[i];
            replica.population_histogram();
            replica.calc_system_mass();
            if self.sorbate_names.len() > 1 {
                replica.update_sorbate_info(&self.sorbate_names);
            }
        }

        if self.is_serial() {
            for i in self.local_range() {
                self.write_replica_files(i)?;
            }
        } else {
            for j in 0..self.comm.size() {
                self.comm.barrier()?;
                if j == self.comm.rank() {
                    self.write_replica_files(j)?;
                }
            }
        }

        let layout = *self.aggregator.layout();
        let mut buffers = Vec::new();
        for i in self.local_range() {
            buffers.push(ReplicaMessage::from_replica(&self.replicas[i], &layout).pack(&layout)?);
        }
        let table = if self.is_serial() {
            Some(buffers)
        } else {
            let own = buffers.pop().unwrap_or_default();
            self.comm.gather(&own)?
        };

        if let Some(table) = table {
            let temperatures: Vec<f64> = self.replicas.iter().map(|r| r.temperature).collect();
            let index = self.tempering.as_ref().map(|t| t.index());
            self.aggregator
                .consume(self.step, &table, &temperatures, index.as_deref())?;
            self.aggregator.output_file_data(self.step);
        }

        for replica in self.replicas.iter_mut() {
            replica.avg_node_stats.clear();
        }
        Ok(())
    }

    fn write_replica_files(&mut self, i: usize) -> PimcResult<()> {
        let replica = &self.replicas[i];
        self.output.write_states(replica)?;
        self.output.write_restart(replica)?;
        if self.config.output.polarization {
            self.output.write_dipole(replica)?;
            self.output.write_field(replica)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalComm;
    use crate::io::{sample_config, TemperingConfig};
    use crate::sampling::EnergyTerms;
    use crate::systems::LennardJones;

    struct Discard;

    impl ReplicaOutput for Discard {
        fn write_states(&mut self, _replica: &Replica) -> PimcResult<()> {
            Ok(())
        }

        fn write_restart(&mut self, _replica: &Replica) -> PimcResult<()> {
            Ok(())
        }

        fn write_final(&mut self, _replica: &Replica) -> PimcResult<()> {
            Ok(())
        }
    }

    /// Energy model whose solver never converges.
    struct Unconverged;

    impl EnergyCalculator for Unconverged {
        fn potential_energy(&self, _replica: &Replica) -> EnergyTerms {
            EnergyTerms {
                vdw: -10.0,
                solver_converged: false,
                ..EnergyTerms::default()
            }
        }
    }

    fn engine_with<E: EnergyCalculator>(config: SimulationConfig, model: E) -> PathIntegralNvt<E, LocalComm, Discard> {
        let replicas = config.build_replicas().unwrap();
        PathIntegralNvt::new(config, replicas, model, LocalComm, Discard, 5).unwrap()
    }

    fn engine(config: SimulationConfig) -> PathIntegralNvt<LennardJones, LocalComm, Discard> {
        let model = config.energy_model();
        engine_with(config, model)
    }

    #[test]
    fn test_legacy_moves_are_refused() {
        let mut pimc = engine(sample_config());
        pimc.setup().unwrap();
        for legacy in [MoveType::Insert, MoveType::Remove, MoveType::Adiabatic, MoveType::Volume] {
            pimc.move_type = legacy;
            assert!(matches!(pimc.make_move(), Err(PimcError::InvalidMonteCarloMove(_))));
        }
    }

    #[test]
    fn test_rejected_step_restores_ring() {
        let mut pimc = engine_with(sample_config(), Unconverged);
        pimc.setup().unwrap();
        let before: Vec<_> = pimc.replicas.iter().map(|r| r.molecules.clone()).collect();
        pimc.monte_carlo_step(1).unwrap();
        for (replica, molecules) in pimc.replicas.iter().zip(&before) {
            assert_eq!(&replica.molecules, molecules);
        }
        assert_eq!(pimc.replicas[0].node_stats.reject, 1);
    }

    #[test]
    fn test_tempering_spreads_and_keeps_temperatures() {
        let mut config = sample_config();
        config.parallel_tempering = Some(TemperingConfig { frequency: 2, max_temperature: 120.0 });
        let mut pimc = engine(config);
        let mut initial: Vec<f64> = pimc.replicas().iter().map(|r| r.temperature).collect();
        pimc.run().unwrap();
        let mut after: Vec<f64> = pimc.replicas().iter().map(|r| r.temperature).collect();
        initial.sort_by(f64::total_cmp);
        after.sort_by(f64::total_cmp);
        assert_eq!(initial, after);
        assert_eq!(initial[0], 30.0);
        assert_eq!(initial[3], 120.0);
    }
}
