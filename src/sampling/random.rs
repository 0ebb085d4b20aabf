//! The single random stream of a run.
//!
//! Every participant of a replica group seeds its own stream with the same
//! seed and consumes draws at the same call sites, so all of them see the
//! same sequence. Draws for quantities shared by the ring (centroid
//! translation and rotation, staging, orientation angles) are therefore
//! identical on every participant without any broadcast.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal, UnitSphere};

#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: StdRng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform on [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    pub fn uniforms<const N: usize>(&mut self) -> [f64; N] {
        std::array::from_fn(|_| self.uniform())
    }

    pub fn normal_vector(&mut self) -> Vector3<f64> {
        let x = self.normal();
        let y = self.normal();
        let z = self.normal();
        Vector3::new(x, y, z)
    }

    /// Uniformly distributed direction
    pub fn unit_vector(&mut self) -> Vector3<f64> {
        let [x, y, z]: [f64; 3] = UnitSphere.sample(&mut self.rng);
        Vector3::new(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomStream::new(7);
        let mut b = RandomStream::new(7);
        for _ in 0..10 {
            assert_eq!(a.uniform(), b.uniform());
            assert_eq!(a.normal(), b.normal());
        }
        assert_eq!(a.uniforms::<6>(), b.uniforms::<6>());
    }

    #[test]
    fn test_unit_vector_norm() {
        let mut rng = RandomStream::new(3);
        for _ in 0..100 {
            assert_relative_eq!(rng.unit_vector().norm(), 1.0, epsilon = 1e-12);
        }
    }
}
