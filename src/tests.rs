//! Cross-module scenarios: samplers against the ring metrics, the kernel on
//! hand-built rings, and whole runs in both replica-group topologies.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use proptest::prelude::*;

use crate::aggregate::{MessageLayout, ReplicaMessage};
use crate::comm::{LocalComm, ThreadGroup};
use crate::constants::{thermal_wavelength2, AMU2KG};
use crate::error::{PimcError, PimcResult};
use crate::io::{sample_config, SimulationConfig};
use crate::replica::{Histogram, Replica};
use crate::sampling::{
    chain_length, cyclic_sum_sq, displace, pick_move, BoltzmannKernel, Contribution, MoveSettings, MoveType,
    OrientationSampler, PathIntegralNvt, Proposal, RandomStream, ReplicaOutput, StagingSampler,
};
use crate::systems::{Atom, Cell, Molecule, MoleculeList, NuclearSpin, SorbateData};

/// Discards every output call.
struct NullOutput;

impl ReplicaOutput for NullOutput {
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

/// Fails to append the trajectory of one replica.
struct FailingOutput {
    replica: usize,
}

impl ReplicaOutput for FailingOutput {
    fn write_states(&mut self, replica: &Replica) -> PimcResult<()> {
        if replica.index == self.replica {
            return Err(PimcError::file_write(
                format!("traj.{}.pqr", replica.index),
                std::io::Error::other("disk full"),
            ));
        }
        Ok(())
    }

    fn write_restart(&mut self, _replica: &Replica) -> PimcResult<()> {
        Ok(())
    }

    fn write_final(&mut self, _replica: &Replica) -> PimcResult<()> {
        Ok(())
    }
}

fn h2_at(com: Vector3<f64>) -> Molecule {
    let atom = |dx: f64| Atom {
        atom_type: "H".into(),
        mass: 1.008,
        charge: 0.0,
        pos: com + Vector3::new(dx, 0.0, 0.0),
    };
    Molecule::new("H2", vec![atom(0.371), atom(-0.371)])
}

fn ring_of(coms: &[Vector3<f64>]) -> Vec<Replica> {
    coms.iter()
        .enumerate()
        .map(|(i, com)| {
            let mut list = MoleculeList::new();
            list.push(h2_at(*com));
            Replica::new(i, list, Cell::cubic(20.0).unwrap(), 30.0)
        })
        .collect()
}

fn quiet(config: SimulationConfig) -> SimulationConfig {
    let mut config = config;
    config.output.output_dir = std::env::temp_dir();
    config
}

proptest! {
    #[test]
    fn prop_chain_length_invariant_under_rotation(
        coords in prop::collection::vec((-5.0f64..5.0, -5.0f64..5.0, -5.0f64..5.0), 2..12),
        shift in 0usize..12,
    ) {
        let points: Vec<Vector3<f64>> = coords.iter().map(|&(x, y, z)| Vector3::new(x, y, z)).collect();
        let mut rotated = points.clone();
        rotated.rotate_left(shift % points.len());
        let a = cyclic_sum_sq(&points);
        let b = cyclic_sum_sq(&rotated);
        prop_assert!((a - b).abs() <= 1e-12 * a.max(1e-30));
    }

    #[test]
    fn prop_staging_keeps_centroid(
        seed in any::<u64>(),
        n in 1usize..8,
        scale in 0.1f64..3.0,
    ) {
        let mut beads: Vec<Vector3<f64>> = (0..8)
            .map(|i| Vector3::new(i as f64 * 0.3, (i as f64).sin(), -0.2 * i as f64))
            .collect();
        let before = beads.iter().sum::<Vector3<f64>>() / 8.0;
        let mut rng = RandomStream::new(seed);
        let mut staging = StagingSampler::new();
        staging.perturb(&mut beads, n, 2.016, 20.0, scale, &mut rng).unwrap();
        let after = beads.iter().sum::<Vector3<f64>>() / 8.0;
        prop_assert!((after - before).norm() < 1e-9);
    }
}

#[test]
fn test_orientation_ring_is_unit_for_supported_sizes() {
    for p in [4, 8, 16, 32] {
        let mut sampler = OrientationSampler::new(p);
        let mut rng = RandomStream::new(p as u64);
        sampler.generate(0.742, 0.504, 10.0, &mut rng);
        assert_eq!(sampler.orientations().len(), p);
        for v in sampler.orientations() {
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_zero_change_is_always_accepted() {
    let molecule = h2_at(Vector3::zeros());
    let same = Contribution { init: 4.0, trial: 4.0, current: 4.0 };
    for move_type in [MoveType::Displace, MoveType::PerturbBeads] {
        let verdict = BoltzmannKernel::evaluate(&Proposal {
            move_type,
            energy: same,
            chain_length: Contribution { init: 1e-20, trial: 1e-20, current: 1e-20 },
            orientation_distance: Contribution::default(),
            target: &molecule,
            sorbate: None,
            n_beads: 4,
            temperature: 30.0,
        })
        .unwrap();
        assert_relative_eq!(verdict.factor, 1.0);
    }
}

#[test]
fn test_spin_flip_ignores_energy() {
    let mut molecule = h2_at(Vector3::zeros());
    molecule.rot_partfunc_g = 3.0;
    molecule.rot_partfunc_u = 1.0;
    molecule.nuclear_spin = NuclearSpin::Para;
    for de in [-50.0, 0.0, 1.0e4] {
        let verdict = BoltzmannKernel::evaluate(&Proposal {
            move_type: MoveType::SpinFlip,
            energy: Contribution { init: 0.0, trial: de, current: 0.0 },
            chain_length: Contribution::default(),
            orientation_distance: Contribution::default(),
            target: &molecule,
            sorbate: None,
            n_beads: 4,
            temperature: 30.0,
        })
        .unwrap();
        assert_relative_eq!(verdict.factor, 0.75);
    }
}

#[test]
fn test_four_bead_spring_factor() {
    let square = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
    ];
    let mut replicas = ring_of(&square);
    let init = chain_length(&replicas).unwrap();
    assert_relative_eq!(init, 4.0e-20, max_relative = 1e-12);

    // stretch the ring: bead 2 moves out to (2, 2, 0)
    let settings = MoveSettings { bead_perturb_probability: 1.0, ..Default::default() };
    let mut rng = RandomStream::new(3);
    assert_eq!(pick_move(&mut replicas, &settings, &mut rng).unwrap(), MoveType::PerturbBeads);
    replicas[2].target_molecule_mut().unwrap().move_to(&Vector3::new(2.0, 2.0, 0.0));
    let trial = chain_length(&replicas).unwrap();
    assert_relative_eq!(trial, 12.0e-20, max_relative = 1e-12);

    let target = replicas[0].target_molecule().unwrap();
    let verdict = BoltzmannKernel::evaluate(&Proposal {
        move_type: MoveType::PerturbBeads,
        energy: Contribution { init: 0.0, trial: 0.0, current: 0.0 },
        chain_length: Contribution { init, trial, current: init },
        orientation_distance: Contribution::default(),
        target,
        sorbate: None,
        n_beads: 4,
        temperature: 30.0,
    })
    .unwrap();
    let lambda2 = thermal_wavelength2(AMU2KG * 2.016, 30.0);
    let expected = (-(trial - init) * std::f64::consts::PI * 4.0 / lambda2).exp();
    assert_relative_eq!(verdict.factor, expected, max_relative = 1e-9);
}

#[test]
fn test_restore_twice_matches_restore_once() {
    let coms: Vec<_> = (0..4).map(|i| Vector3::new(i as f64 * 0.1, 0.0, 0.0)).collect();
    let mut replicas = ring_of(&coms);
    let before: Vec<_> = replicas.iter().map(|r| r.molecules.clone()).collect();
    for r in replicas.iter_mut() {
        r.observables.energy = -12.5;
        r.backup_observables();
    }

    let settings = MoveSettings::default();
    let mut rng = RandomStream::new(11);
    let move_type = pick_move(&mut replicas, &settings, &mut rng).unwrap();
    assert_eq!(move_type, MoveType::Displace);
    displace(&mut replicas, &settings, &mut rng, &LocalComm).unwrap();
    for r in replicas.iter_mut() {
        r.observables.energy = 99.0;
    }

    for r in replicas.iter_mut() {
        r.restore();
    }
    let once: Vec<_> = replicas.iter().map(|r| (r.molecules.clone(), r.observables)).collect();
    for r in replicas.iter_mut() {
        r.restore();
    }
    for (r, (molecules, observables)) in replicas.iter().zip(&once) {
        assert_eq!(&r.molecules, molecules);
        assert_eq!(&r.observables, observables);
        assert_eq!(r.observables.energy, -12.5);
    }
    for (r, molecules) in replicas.iter().zip(&before) {
        assert_eq!(&r.molecules, molecules);
    }
}

#[test]
fn test_replica_message_survives_the_wire() {
    let mut replicas = ring_of(&[Vector3::new(1.0, 1.0, 1.0)]);
    let replica = &mut replicas[0];
    replica.histogram = Some(Histogram::new(3));
    replica.population_histogram();
    replica.calc_system_mass();
    replica.observables.energy = -42.0;
    replica.avg_node_stats.boltzmann_factor = 0.5;

    let layout = MessageLayout::new(27, 1);
    let message = ReplicaMessage::from_replica(replica, &layout);
    let bytes = message.pack(&layout).unwrap();
    assert_eq!(bytes.len(), layout.byte_len());
    let back = ReplicaMessage::unpack(&bytes, &layout).unwrap();
    assert_eq!(back, message);
    assert_eq!(back.histogram.iter().sum::<i32>(), 1);
}

#[test]
fn test_rejects_unsupported_replica_count() {
    let config = SimulationConfig { trotter_number: 6, ..quiet(sample_config()) };
    let replicas = config.build_replicas().unwrap();
    let model = config.energy_model();
    let result = PathIntegralNvt::new(config, replicas, model, LocalComm, NullOutput, 1);
    assert!(matches!(
        result,
        Err(PimcError::InvalidReplicaCount { requested: 6, .. })
    ));
}

#[test]
fn test_serial_run_writes_every_replica() {
    let config = quiet(sample_config());
    let replicas = config.build_replicas().unwrap();
    let model = config.energy_model();
    let mut engine = PathIntegralNvt::new(config, replicas, model, LocalComm, NullOutput, 17).unwrap();
    let summary = engine.run().unwrap();
    assert_eq!(summary.steps, 20);
    assert_eq!(summary.accepted + summary.rejected, 20);
    assert!(summary.energy.is_finite());
    // four bookkeeping passes over four replicas
    assert_eq!(engine.aggregator().averages.acceptance_rate.count(), 16);
}

#[test]
fn test_thread_group_matches_serial_run() {
    let config = quiet(sample_config());
    let seed = 17;

    let replicas = config.build_replicas().unwrap();
    let model = config.energy_model();
    let mut serial = PathIntegralNvt::new(config.clone(), replicas, model, LocalComm, NullOutput, seed).unwrap();
    let serial_summary = serial.run().unwrap();

    let group = ThreadGroup::new(config.trotter_number);
    let results: Vec<(Vec<Replica>, f64)> = std::thread::scope(|s| {
        let handles: Vec<_> = group
            .members()
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                s.spawn(move || {
                    let replicas = config.build_replicas().unwrap();
                    let model = config.energy_model();
                    let mut engine =
                        PathIntegralNvt::new(config, replicas, model, comm, NullOutput, seed).unwrap();
                    let summary = engine.run().unwrap();
                    (engine.replicas().to_vec(), summary.energy)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (replicas, energy) in &results {
        assert_eq!(*energy, serial_summary.energy);
        for (threaded, expected) in replicas.iter().zip(serial.replicas()) {
            assert_eq!(threaded.molecules, expected.molecules);
            assert_eq!(threaded.observables.energy, expected.observables.energy);
        }
    }
}

#[test]
fn test_failed_write_on_one_rank_ends_whole_group() {
    let config = quiet(sample_config());
    let group = ThreadGroup::new(config.trotter_number);
    let results: Vec<PimcResult<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = group
            .members()
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                s.spawn(move || {
                    let replicas = config.build_replicas()?;
                    let model = config.energy_model();
                    let output = FailingOutput { replica: 1 };
                    PathIntegralNvt::new(config, replicas, model, comm, output, 17)?.run()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 4);
    assert!(matches!(results[1], Err(PimcError::FileWrite { .. })));
    for rank in [0, 2, 3] {
        assert!(matches!(results[rank], Err(PimcError::GroupAborted { rank: 1 })));
    }
}

#[test]
fn test_failed_write_ends_serial_run() {
    let config = quiet(sample_config());
    let replicas = config.build_replicas().unwrap();
    let model = config.energy_model();
    let mut engine =
        PathIntegralNvt::new(config, replicas, model, LocalComm, FailingOutput { replica: 2 }, 17).unwrap();
    assert!(matches!(engine.run(), Err(PimcError::FileWrite { .. })));
}

#[test]
fn test_sorbate_without_orientation_data_runs_com_only() {
    let mut config = quiet(sample_config());
    config.moves.bead_perturb_probability = 1.0;
    config.sorbates = vec![SorbateData {
        name: "H2".into(),
        reduced_mass: None,
        bond_length: None,
        orientation_site: None,
    }];
    let replicas = config.build_replicas().unwrap();
    let model = config.energy_model();
    let mut engine = PathIntegralNvt::new(config, replicas, model, LocalComm, NullOutput, 23).unwrap();
    let summary = engine.run().unwrap();
    assert_eq!(summary.accepted + summary.rejected, 20);
    let stats = engine.replicas()[0].node_stats;
    assert_eq!(stats.accept_perturb + stats.reject_perturb, 20);
}
