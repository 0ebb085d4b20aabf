//! Centroid staging of a molecule's bead ring.
//!
//! Coker, Berne & Thirumalai, J. Chem. Phys. 86, 5689 (1987).
//! A trial chain of `n` beads between two fixed anchors is regrown from the
//! free-particle density matrix: bead j sits on the line between its
//! predecessor and the far anchor, displaced by a Gaussian of width
//!
//!   σ_j = s · sqrt(ħ²β · t_j / (P · M)),   t_j = (n − j + 1)/(n − j + 2)
//!
//! Afterwards the whole ring is shifted so that its centroid is unchanged.

use nalgebra::Vector3;
use tracing::debug;

use super::random::RandomStream;
use crate::constants::{AMU2KG, HBAR2, KB, METER2ANGSTROM};
use crate::error::{PimcError, PimcResult};
use crate::replica::Replica;

#[derive(Debug, Clone, Default)]
pub struct StagingSampler {
    /// First fixed anchor of the next trial chain
    starter_bead: usize,
}

impl StagingSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starter_bead(&self) -> usize {
        self.starter_bead
    }

    /// Regrow `n` consecutive beads of `beads` (positions in Å) in place.
    ///
    /// # Arguments
    /// * `n` - trial chain length, 1 ≤ n < P
    /// * `mass` - molecular mass in AMU
    /// * `temperature` - bath temperature in K
    /// * `scale` - user multiplier on the Gaussian width
    pub fn perturb(
        &mut self,
        beads: &mut [Vector3<f64>],
        n: usize,
        mass: f64,
        temperature: f64,
        scale: f64,
        rng: &mut RandomStream,
    ) -> PimcResult<()> {
        let p = beads.len();
        if n == 0 || n >= p {
            return Err(PimcError::InvalidSetting(format!(
                "trial chain length {} outside [1, {}]",
                n,
                p.saturating_sub(1)
            )));
        }

        let beta = 1.0 / (KB * temperature);
        let mass_kg = mass * AMU2KG;

        let mut prev = self.starter_bead;
        let mut bead = (prev + 1) % p;
        let last = (prev + n + 1) % p;
        self.starter_bead = (self.starter_bead + 1) % p;

        let centroid: Vector3<f64> = beads.iter().sum::<Vector3<f64>>() / p as f64;

        for j in 1..=n {
            let init_factor = (n - j + 1) as f64 / (n - j + 2) as f64;
            let term_factor = 1.0 - init_factor;
            let sigma = scale * (HBAR2 * beta * init_factor / (p as f64 * mass_kg)).sqrt() * METER2ANGSTROM;
            let kick = rng.normal_vector();
            beads[bead] = init_factor * beads[prev] + term_factor * beads[last] + sigma * kick;
            prev = (prev + 1) % p;
            bead = (prev + 1) % p;
        }

        let drift = beads.iter().sum::<Vector3<f64>>() / p as f64 - centroid;
        for b in beads.iter_mut() {
            *b -= drift;
        }
        Ok(())
    }

    /// Stage the COM ring of every replica's current target molecule.
    pub fn perturb_target(
        &mut self,
        replicas: &mut [Replica],
        n: usize,
        temperature: f64,
        scale: f64,
        rng: &mut RandomStream,
    ) -> PimcResult<()> {
        let mut beads = Vec::with_capacity(replicas.len());
        for replica in replicas.iter_mut() {
            let molecule = replica.target_molecule_mut()?;
            molecule.update_com();
            beads.push(molecule.com);
        }
        let mass = replicas
            .first()
            .map(|r| r.target_molecule().map(|m| m.mass))
            .transpose()?
            .ok_or_else(|| PimcError::Internal("no replicas to stage".to_string()))?;

        self.perturb(&mut beads, n, mass, temperature, scale, rng)?;

        for (replica, com) in replicas.iter_mut().zip(&beads) {
            replica.target_molecule_mut()?.move_to(com);
        }
        Ok(())
    }

    /// Regrow the whole ring (n = P − 1) of every movable molecule.
    ///
    /// All replicas walk their full molecule lists in lock-step and replica 0
    /// decides which positions are eligible. A replica whose list ends before
    /// replica 0's is an internal error.
    pub fn bootstrap(&mut self, replicas: &mut [Replica], temperature: f64, rng: &mut RandomStream) -> PimcResult<()> {
        let p = replicas.len();
        let lists: Vec<_> = replicas.iter().map(|r| r.molecules.ids()).collect();
        let driver = lists
            .first()
            .ok_or_else(|| PimcError::Internal("no replicas to bootstrap".to_string()))?;

        let mut staged = 0;
        for (k, id0) in driver.iter().enumerate() {
            let mut ids = Vec::with_capacity(p);
            for (s, list) in lists.iter().enumerate() {
                let id = *list.get(k).ok_or_else(|| {
                    PimcError::Internal(format!(
                        "replica {} ran out of molecules at position {} while replica 0 has {}",
                        s,
                        k,
                        driver.len()
                    ))
                })?;
                ids.push(id);
            }
            if !replicas[0].molecules[*id0].is_movable() {
                continue;
            }

            let mut beads = Vec::with_capacity(p);
            for (replica, &id) in replicas.iter_mut().zip(&ids) {
                let molecule = &mut replica.molecules[id];
                molecule.update_com();
                beads.push(molecule.com);
            }
            let mass = replicas[0].molecules[*id0].mass;
            self.perturb(&mut beads, p - 1, mass, temperature, 1.0, rng)?;
            for ((replica, id), com) in replicas.iter_mut().zip(ids).zip(&beads) {
                replica.molecules[id].move_to(com);
            }
            staged += 1;
        }
        debug!(molecules = staged, beads = p, "bootstrap staging done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::{Atom, Cell, Molecule, MoleculeList};
    use approx::assert_relative_eq;

    fn ring(p: usize) -> Vec<Vector3<f64>> {
        (0..p)
            .map(|i| {
                let t = i as f64 / p as f64 * std::f64::consts::TAU;
                Vector3::new(t.cos(), t.sin(), 0.1 * i as f64)
            })
            .collect()
    }

    fn replica(index: usize, coms: &[Vector3<f64>]) -> Replica {
        let mut list = MoleculeList::new();
        for com in coms {
            let atom = |dx: f64| Atom {
                atom_type: "H".into(),
                mass: 1.008,
                charge: 0.0,
                pos: com + Vector3::new(dx, 0.0, 0.0),
            };
            list.push(Molecule::new("H2", vec![atom(0.371), atom(-0.371)]));
        }
        Replica::new(index, list, Cell::cubic(20.0).unwrap(), 30.0)
    }

    fn ring_of_replicas(p: usize, molecules: usize) -> Vec<Replica> {
        (0..p)
            .map(|i| {
                let coms: Vec<_> = (0..molecules)
                    .map(|m| Vector3::new(3.0 * m as f64 + 0.1 * i as f64, 0.05 * i as f64, 1.0))
                    .collect();
                replica(i, &coms)
            })
            .collect()
    }

    fn ring_centroid(replicas: &[Replica], position: usize) -> Vector3<f64> {
        let sum: Vector3<f64> = replicas
            .iter()
            .map(|r| r.molecules[r.molecules.ids()[position]].com)
            .sum();
        sum / replicas.len() as f64
    }

    #[test]
    fn test_bootstrap_keeps_each_ring_centroid() {
        let mut replicas = ring_of_replicas(8, 3);
        let frozen = replicas[0].molecules.ids()[1];
        replicas[0].molecules[frozen].frozen = true;
        let before: Vec<_> = (0..3).map(|m| ring_centroid(&replicas, m)).collect();
        let untouched: Vec<_> = replicas.iter().map(|r| r.molecules[frozen].clone()).collect();

        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(42);
        sampler.bootstrap(&mut replicas, 30.0, &mut rng).unwrap();

        for m in [0, 2] {
            assert_relative_eq!(ring_centroid(&replicas, m), before[m], epsilon = 1e-9);
        }
        for (replica, molecule) in replicas.iter().zip(&untouched) {
            assert_eq!(&replica.molecules[frozen], molecule);
        }
        // one call per staged molecule
        assert_eq!(sampler.starter_bead(), 2);
    }

    #[test]
    fn test_bootstrap_follows_replica_zero_eligibility() {
        let mut replicas = ring_of_replicas(4, 2);
        let first = replicas[1].molecules.ids()[0];
        replicas[1].molecules[first].frozen = true;
        let before = replicas[1].molecules[first].com;

        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(7);
        sampler.bootstrap(&mut replicas, 30.0, &mut rng).unwrap();

        // paired by list position, so replica 1's first molecule is staged with the others
        assert!((replicas[1].molecules[first].com - before).norm() > 1e-6);
        assert_eq!(sampler.starter_bead(), 2);
    }

    #[test]
    fn test_bootstrap_short_replica_is_internal() {
        let mut replicas = ring_of_replicas(4, 3);
        replicas[2] = replica(2, &[Vector3::new(0.0, 0.0, 1.0), Vector3::new(3.0, 0.0, 1.0)]);
        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(1);
        assert!(matches!(
            sampler.bootstrap(&mut replicas, 30.0, &mut rng),
            Err(PimcError::Internal(msg)) if msg.contains("replica 2")
        ));
    }

    #[test]
    fn test_starter_bead_advances() {
        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(1);
        let mut beads = ring(4);
        for expected in [1, 2, 3, 0, 1] {
            sampler.perturb(&mut beads, 2, 2.016, 10.0, 1.0, &mut rng).unwrap();
            assert_eq!(sampler.starter_bead(), expected);
        }
    }

    #[test]
    fn test_anchor_geometry_without_noise() {
        // zero scale: placed beads fall on the line between the anchors
        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(1);
        let mut beads = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(5.0, 5.0, 5.0),
            Vector3::new(-5.0, 2.0, 1.0),
            Vector3::new(3.0, 0.0, 0.0),
        ];
        let centroid: Vector3<f64> = beads.iter().sum::<Vector3<f64>>() / 4.0;
        sampler.perturb(&mut beads, 2, 2.016, 10.0, 0.0, &mut rng).unwrap();
        // bead 1 = 2/3·b0 + 1/3·b3, bead 2 = 1/2·b1 + 1/2·b3, then a common shift
        let shift = beads[0];
        assert_relative_eq!(beads[1] - shift, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(beads[2] - shift, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(beads[3] - shift, Vector3::new(3.0, 0.0, 0.0), epsilon = 1e-12);
        let after: Vector3<f64> = beads.iter().sum::<Vector3<f64>>() / 4.0;
        assert_relative_eq!(after, centroid, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_bad_chain_length() {
        let mut sampler = StagingSampler::new();
        let mut rng = RandomStream::new(1);
        let mut beads = ring(4);
        assert!(matches!(
            sampler.perturb(&mut beads, 4, 2.016, 10.0, 1.0, &mut rng),
            Err(PimcError::InvalidSetting(_))
        ));
        assert!(sampler.perturb(&mut beads, 0, 2.016, 10.0, 1.0, &mut rng).is_err());
    }
}
