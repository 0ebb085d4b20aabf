use super::Communicator;
use crate::error::PimcResult;

/// Single participant holding every replica. All collectives are identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalComm;

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> PimcResult<()> {
        Ok(())
    }

    fn all_gather(&self, value: f64) -> PimcResult<Vec<f64>> {
        Ok(vec![value])
    }

    fn gather(&self, buffer: &[u8]) -> PimcResult<Option<Vec<Vec<u8>>>> {
        Ok(Some(vec![buffer.to_vec()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_is_root_and_identity() {
        let comm = LocalComm;
        assert!(comm.is_root());
        assert!(comm.barrier().is_ok());
        assert_eq!(comm.reduce_sum(2.5).unwrap(), 2.5);
        assert_eq!(comm.gather(&[1, 2, 3]).unwrap(), Some(vec![vec![1, 2, 3]]));
    }
}
