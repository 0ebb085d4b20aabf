//! Shared-memory replica group: one thread per replica.
//!
//! Members meet at a generation-counted barrier. Dropping a member marks the
//! group broken, so a participant that bails out with an error releases the
//! others instead of leaving them blocked.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::Communicator;
use crate::error::{PimcError, PimcResult};

#[derive(Debug, Default)]
struct Turnstile {
    arrived: usize,
    generation: u64,
    /// First member that left the group
    departed: Option<usize>,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    turnstile: Mutex<Turnstile>,
    released: Condvar,
    values: Mutex<Vec<f64>>,
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl Shared {
    fn turnstile(&self) -> MutexGuard<'_, Turnstile> {
        self.turnstile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) -> PimcResult<()> {
        let mut state = self.turnstile();
        if let Some(rank) = state.departed {
            return Err(PimcError::GroupAborted { rank });
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        let state = self
            .released
            .wait_while(state, |s| s.generation == generation && s.departed.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match (state.generation == generation, state.departed) {
            (true, Some(rank)) => Err(PimcError::GroupAborted { rank }),
            _ => Ok(()),
        }
    }

    fn leave(&self, rank: usize) {
        let mut state = self.turnstile();
        state.departed.get_or_insert(rank);
        self.released.notify_all();
    }
}

/// Factory for the members of a thread group of fixed size.
#[derive(Debug, Clone)]
pub struct ThreadGroup {
    shared: Arc<Shared>,
}

impl ThreadGroup {
    pub fn new(size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                size,
                turnstile: Mutex::new(Turnstile::default()),
                released: Condvar::new(),
                values: Mutex::new(vec![0.0; size]),
                buffers: Mutex::new(vec![Vec::new(); size]),
            }),
        }
    }

    /// One communicator per rank, to be moved into its thread.
    pub fn members(&self) -> Vec<ThreadComm> {
        (0..self.shared.size)
            .map(|rank| ThreadComm {
                shared: Arc::clone(&self.shared),
                rank,
            })
            .collect()
    }
}

/// One member of a `ThreadGroup`. Not `Clone`: dropping it leaves the group.
#[derive(Debug)]
pub struct ThreadComm {
    shared: Arc<Shared>,
    rank: usize,
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        self.shared.leave(self.rank);
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> PimcResult<()> {
        self.shared.wait()
    }

    fn all_gather(&self, value: f64) -> PimcResult<Vec<f64>> {
        self.shared
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[self.rank] = value;
        self.barrier()?;
        let values = self
            .shared
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // slots are reused by the next collective
        self.barrier()?;
        Ok(values)
    }

    fn gather(&self, buffer: &[u8]) -> PimcResult<Option<Vec<Vec<u8>>>> {
        self.shared
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[self.rank] = buffer.to_vec();
        self.barrier()?;
        let gathered = self.is_root().then(|| {
            self.shared
                .buffers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        });
        self.barrier()?;
        Ok(gathered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_gather_and_gather_order_by_rank() {
        let group = ThreadGroup::new(4);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = group
                .members()
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let values = comm.all_gather(comm.rank() as f64 * 1.5).unwrap();
                        let sum = comm.reduce_sum(1.0).unwrap();
                        let gathered = comm.gather(&[comm.rank() as u8; 2]).unwrap();
                        (comm.rank(), values, sum, gathered)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (rank, values, sum, gathered) in results {
            assert_eq!(values, vec![0.0, 1.5, 3.0, 4.5]);
            assert_eq!(sum, 4.0);
            if rank == 0 {
                let gathered = gathered.unwrap();
                assert_eq!(gathered, vec![vec![0, 0], vec![1, 1], vec![2, 2], vec![3, 3]]);
            } else {
                assert!(gathered.is_none());
            }
        }
    }

    #[test]
    fn test_departed_member_releases_waiters() {
        let group = ThreadGroup::new(3);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = group
                .members()
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        comm.barrier()?;
                        if comm.rank() == 2 {
                            // leaves between collectives
                            return Ok(());
                        }
                        comm.all_gather(1.0).map(|_| ())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results[2].is_ok());
        for result in &results[..2] {
            assert!(matches!(result, Err(PimcError::GroupAborted { rank: 2 })));
        }
    }

    #[test]
    fn test_completed_barrier_survives_later_departure() {
        let group = ThreadGroup::new(2);
        let results: Vec<PimcResult<()>> = std::thread::scope(|s| {
            let handles: Vec<_> = group
                .members()
                .into_iter()
                .map(|comm| s.spawn(move || comm.barrier()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(Result::is_ok));
    }
}
