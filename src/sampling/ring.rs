//! Ring metrics of the targeted molecule.
//!
//! Both metrics sum squared distances between adjacent beads around the
//! closed ring and are returned in m² so they pair with λ² directly.

use nalgebra::Vector3;

use crate::constants::ANGSTROM2METER;
use crate::error::PimcResult;
use crate::replica::Replica;
use crate::systems::SorbateData;

/// Σ_i |r_i − r_{i+1 mod P}|² for positions in Å, result in m².
pub fn cyclic_sum_sq(points: &[Vector3<f64>]) -> f64 {
    let p = points.len();
    let sum: f64 = (0..p)
        .map(|i| (points[i] - points[(i + 1) % p]).norm_squared())
        .sum();
    sum * ANGSTROM2METER * ANGSTROM2METER
}

/// COM chain length of the target molecule over all replicas.
pub fn chain_length(replicas: &[Replica]) -> PimcResult<f64> {
    let coms = replicas
        .iter()
        .map(|r| r.target_molecule().map(|m| m.com))
        .collect::<PimcResult<Vec<_>>>()?;
    Ok(cyclic_sum_sq(&coms))
}

/// Distance between adjacent bond vectors of the target molecule. Zero when the
/// molecule type has no orientation handle.
pub fn orientation_distance(replicas: &[Replica], sorbate: Option<&SorbateData>) -> PimcResult<f64> {
    let Some((site, bond_length)) = sorbate.and_then(|s| s.orientation_handle()) else {
        return Ok(0.0);
    };
    let bonds = replicas
        .iter()
        .map(|r| {
            r.target_molecule()
                .map(|m| m.bond_direction(site).map(|d| d * bond_length).unwrap_or_else(Vector3::zeros))
        })
        .collect::<PimcResult<Vec<_>>>()?;
    Ok(cyclic_sum_sq(&bonds))
}
