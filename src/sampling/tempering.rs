//! Parallel tempering over the replica ring and simulated annealing.

use tracing::debug;

use super::random::RandomStream;
use crate::replica::Replica;

/// Temperature ladder over the replicas.
///
/// `system_ids[k]` is the replica holding temperature rank k; rank 0 is the
/// coldest bath (the run temperature).
#[derive(Debug, Clone)]
pub struct Tempering {
    pub frequency: usize,
    temperatures: Vec<f64>,
    system_ids: Vec<usize>,
}

impl Tempering {
    /// Geometric ladder T_k = T · (T_max / T)^(k / (P − 1)).
    pub fn new(temperature: f64, max_temperature: f64, n_replicas: usize, frequency: usize) -> Self {
        let ratio = max_temperature / temperature;
        let temperatures = (0..n_replicas)
            .map(|k| {
                if n_replicas > 1 {
                    temperature * ratio.powf(k as f64 / (n_replicas - 1) as f64)
                } else {
                    temperature
                }
            })
            .collect();
        Self {
            frequency: frequency.max(1),
            temperatures,
            system_ids: (0..n_replicas).collect(),
        }
    }

    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Temperature rank of every replica, indexed by replica.
    pub fn index(&self) -> Vec<usize> {
        let mut index = vec![0; self.system_ids.len()];
        for (rank, &replica) in self.system_ids.iter().enumerate() {
            index[replica] = rank;
        }
        index
    }

    pub fn temperature_of(&self, replica: usize) -> f64 {
        self.index()
            .get(replica)
            .map(|&rank| self.temperatures[rank])
            .unwrap_or(self.temperatures[0])
    }

    /// Offer one random adjacent pair of baths a swap. `energies` are indexed by replica.
    pub fn attempt_swap(&mut self, energies: &[f64], rng: &mut RandomStream) -> bool {
        let n = self.system_ids.len();
        let roll = rng.uniform();
        let accept_roll = rng.uniform();
        if n < 2 {
            return false;
        }
        let k = ((roll * (n - 1) as f64) as usize).min(n - 2);
        let a = self.system_ids[k];
        let b = self.system_ids[k + 1];
        let delta = (1.0 / self.temperatures[k] - 1.0 / self.temperatures[k + 1]) * (energies[a] - energies[b]);
        let swapped = accept_roll.ln() < delta;
        if swapped {
            self.system_ids.swap(k, k + 1);
        }
        debug!(rank = k, replica_a = a, replica_b = b, delta, swapped, "tempering swap");
        swapped
    }

    pub fn apply(&self, replicas: &mut [Replica]) {
        let index = self.index();
        for replica in replicas.iter_mut() {
            if let Some(&rank) = index.get(replica.index) {
                replica.temperature = self.temperatures[rank];
            }
        }
    }
}

/// Temperature update applied after every accepted move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnealingSchedule {
    /// Ramp linearly so the target is reached on the last step
    Linear { target: f64 },
    /// T ← target + (T − target) · schedule
    Geometric { target: f64, schedule: f64 },
}

impl AnnealingSchedule {
    pub fn next(&self, temperature: f64, step: usize, n_steps: usize) -> f64 {
        match *self {
            AnnealingSchedule::Linear { target } => {
                if step >= n_steps {
                    target
                } else {
                    temperature + (target - temperature) / (n_steps - step) as f64
                }
            }
            AnnealingSchedule::Geometric { target, schedule } => target + (temperature - target) * schedule,
        }
    }
}
