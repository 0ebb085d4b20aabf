/// Running mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningAverage {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn std_error(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.std_dev() / (self.count as f64).sqrt()
        }
    }
}

/// Root-side running averages of the ensemble observables.
#[derive(Debug, Clone, Default)]
pub struct EnsembleAverages {
    pub energy: RunningAverage,
    pub coulombic_energy: RunningAverage,
    pub polarization_energy: RunningAverage,
    pub vdw_energy: RunningAverage,
    pub three_body_energy: RunningAverage,
    pub n_molecules: RunningAverage,
    pub density: RunningAverage,
    pub spin_ratio: RunningAverage,
    pub acceptance_rate: RunningAverage,
    pub boltzmann_factor: RunningAverage,
    /// Per sorbate: molecule count and mass percent
    pub sorbate_n_molecules: Vec<RunningAverage>,
    pub sorbate_percent_wt: Vec<RunningAverage>,
    /// Summed population histogram
    pub histogram: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_welford_matches_two_pass() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut avg = RunningAverage::default();
        xs.iter().for_each(|&x| avg.push(x));
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
        assert_relative_eq!(avg.mean(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(avg.std_dev(), var.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(avg.std_error(), var.sqrt() / 8f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_empty_and_single() {
        let mut avg = RunningAverage::default();
        assert_eq!(avg.std_error(), 0.0);
        avg.push(3.0);
        assert_eq!(avg.mean(), 3.0);
        assert_eq!(avg.std_dev(), 0.0);
    }
}
