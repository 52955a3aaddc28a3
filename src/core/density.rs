//! Density/mass helpers for histograms on a non-uniform dose grid.
//! density: per Gy; mass: integral of density over the bin width dd.

/// Integrate a density over dd to produce total mass.
pub fn density_to_mass(density: &[f64], dd: &[f64]) -> f64 {
    density
        .iter()
        .zip(dd.iter())
        .map(|(f, dd)| f * dd)
        .sum()
}

/// Convert per-bin masses back into a density (per Gy).
pub fn mass_to_density(mass: &[f64], dd: &[f64]) -> Vec<f64> {
    mass.iter()
        .zip(dd.iter())
        .map(|(&m, &dd)| {
            debug_assert!(dd > 0.0, "dd must be positive");
            if dd > 0.0 { m / dd } else { 0.0 }
        })
        .collect()
}

/// First moment of point masses sitting at `d`.
pub fn first_moment(mass: &[f64], d: &[f64]) -> f64 {
    mass.iter().zip(d.iter()).map(|(m, d)| m * d).sum()
}

/// Second moment of point masses sitting at `d`.
pub fn second_moment(mass: &[f64], d: &[f64]) -> f64 {
    mass.iter().zip(d.iter()).map(|(m, d)| m * d * d).sum()
}

/// First and last index in `lo..=hi` holding a non-zero value.
pub fn occupied_range(v: &[f64], lo: usize, hi: usize) -> Option<(usize, usize)> {
    let hi = hi.min(v.len().checked_sub(1)?);
    if lo > hi {
        return None;
    }
    let first = (lo..=hi).find(|&i| v[i] != 0.0)?;
    let last = (first..=hi).rev().find(|&i| v[i] != 0.0)?;
    Some((first, last))
}
