use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Orientation metadata for a molecule type that needs rotational quantum corrections.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SorbateData {
    pub name: String,
    /// Reduced mass in AMU
    #[serde(default)]
    pub reduced_mass: Option<f64>,
    /// Bond length in Angstrom
    #[serde(default)]
    pub bond_length: Option<f64>,
    /// Index of the atom used as the orientation handle
    #[serde(default)]
    pub orientation_site: Option<usize>,
}

impl SorbateData {
    /// Handle site and bond length, when both are usable for orientation moves.
    pub fn orientation_handle(&self) -> Option<(usize, f64)> {
        match (self.orientation_site, self.bond_length) {
            (Some(site), Some(b)) if b > 0.0 => Some((site, b)),
            _ => None,
        }
    }
}

/// Sorbate metadata keyed by molecule-type name.
#[derive(Debug, Clone, Default)]
pub struct SorbateTable {
    entries: HashMap<String, SorbateData>,
}

impl SorbateTable {
    pub fn new(sorbates: &[SorbateData]) -> Self {
        let entries = sorbates
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, molecule_type: &str) -> Option<&SorbateData> {
        self.entries.get(molecule_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
