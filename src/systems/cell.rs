use nalgebra::{Matrix3, Vector3};

use crate::error::{PimcError, PimcResult};

/// Periodic simulation cell. Columns of `basis` are the cell vectors (Angstrom).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub basis: Matrix3<f64>,
    pub reciprocal: Matrix3<f64>,
}

impl Cell {
    pub fn new(vectors: [Vector3<f64>; 3]) -> PimcResult<Self> {
        let basis = Matrix3::from_columns(&vectors);
        let reciprocal = basis.try_inverse().ok_or_else(|| {
            PimcError::InvalidSetting("cell basis vectors are linearly dependent".to_string())
        })?;
        Ok(Self { basis, reciprocal })
    }

    pub fn cubic(a: f64) -> PimcResult<Self> {
        Self::new([
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(0.0, a, 0.0),
            Vector3::new(0.0, 0.0, a),
        ])
    }

    /// Cell volume in Å³
    pub fn volume(&self) -> f64 {
        self.basis.determinant().abs()
    }

    pub fn to_fractional(&self, pos: &Vector3<f64>) -> Vector3<f64> {
        self.reciprocal * pos
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.basis * frac
    }

    pub fn minimum_image(&self, dr: &Vector3<f64>) -> Vector3<f64> {
        let frac = self.to_fractional(dr);
        let wrapped = frac.map(|x| x - x.round());
        self.basis * wrapped
    }

    /// Random translation from three uniform draws, `scale * (0.5 - roll)` along each cell vector.
    pub fn translation(&self, scale: f64, rolls: &[f64; 3]) -> Vector3<f64> {
        let frac = Vector3::new(
            scale * (0.5 - rolls[0]),
            scale * (0.5 - rolls[1]),
            scale * (0.5 - rolls[2]),
        );
        self.basis * frac
    }
}
