//! Replica-group collectives.
//!
//! The engine is written against `Communicator` so the same loop runs either
//! with every replica in one participant (`LocalComm`) or with one participant
//! per replica (`ThreadComm`). Every collective must be entered by all members
//! of the group in the same order. A member that returns early (error or
//! panic) leaves the group, and every collective still pending or entered
//! afterwards fails instead of waiting for it.

mod local;
mod threads;

pub use local::LocalComm;
pub use threads::{ThreadComm, ThreadGroup};

use crate::error::PimcResult;

pub trait Communicator {
    /// Index of this participant, 0..size
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Fails with `GroupAborted` once any member has left the group.
    fn barrier(&self) -> PimcResult<()>;
    /// Every participant's value, ordered by rank.
    fn all_gather(&self, value: f64) -> PimcResult<Vec<f64>>;
    /// Sum over the group, returned to every participant.
    fn reduce_sum(&self, value: f64) -> PimcResult<f64> {
        Ok(self.all_gather(value)?.iter().sum())
    }
    /// Buffers ordered by rank; only the root receives them.
    fn gather(&self, buffer: &[u8]) -> PimcResult<Option<Vec<Vec<u8>>>>;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}
