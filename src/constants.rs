//! Physical constants (SI) and unit conversions.
//!
//! Positions are in Angstrom, masses in AMU, temperatures in Kelvin and
//! energies in Kelvin (k_B = 1 in energy units).

/// Planck constant [J s]
pub const H: f64 = 6.626_070_15e-34;
/// Reduced Planck constant [J s]
pub const HBAR: f64 = 1.054_571_817e-34;
/// ħ² [J² s²]
pub const HBAR2: f64 = HBAR * HBAR;
/// Boltzmann constant [J/K]
pub const KB: f64 = 1.380_649e-23;
/// Atomic mass unit [kg]
pub const AMU2KG: f64 = 1.660_539_066_60e-27;
pub const ANGSTROM2METER: f64 = 1.0e-10;
pub const METER2ANGSTROM: f64 = 1.0e10;

/// Stand-in energy for configurations with a non-finite energy (bad contacts).
pub const MAXVALUE: f64 = 1.0e40;

/// Thermal de Broglie wavelength squared, λ² = h²/(2π m k_B T), in m².
///
/// `mass_kg` is in kilograms, `temperature` in Kelvin.
pub fn thermal_wavelength2(mass_kg: f64, temperature: f64) -> f64 {
    (H * H) / (2.0 * std::f64::consts::PI * mass_kg * KB * temperature)
}
