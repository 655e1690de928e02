//! The chain RNG and the random variates proposals draw from.
//!
//! Every sampler takes `&mut R` with `R: Rng + ?Sized` so that proposals can
//! pass a `&mut dyn RngCore` straight through.

use rand::{Rng, SeedableRng};

use crate::{PhyloMcError, Result};

/// Random number generator owned by one chain.
pub type ChainRng = rand_pcg::Pcg64;

/// Create a deterministic chain RNG from a seed.
pub fn seeded_rng(seed: u64) -> ChainRng {
    ChainRng::seed_from_u64(seed)
}

/// Uniform draw in `[0, 1)`.
pub fn uniform01<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>()
}

/// Uniform draw in `[lo, hi)`. Returns `lo` when the interval is empty.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi <= lo {
        return lo;
    }
    lo + (hi - lo) * uniform01(rng)
}

/// Uniform index in `0..n`.
///
/// # Errors
///
/// Returns an error if `n == 0`.
pub fn uniform_index<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Result<usize> {
    if n == 0 {
        return Err(PhyloMcError::InvalidInput(
            "cannot draw an index from an empty range".into(),
        ));
    }
    Ok(rng.gen_range(0..n))
}

/// Standard normal draw (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - u keeps the log argument in (0, 1]
    let u1 = 1.0 - uniform01(rng);
    let u2 = uniform01(rng);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Gamma(shape, 1) draw using Marsaglia and Tsang's squeeze method.
///
/// Shapes below one are boosted with `U^(1/shape)`.
///
/// # Errors
///
/// Returns an error if `shape` is not positive and finite.
pub fn gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> Result<f64> {
    if !(shape > 0.0 && shape.is_finite()) {
        return Err(PhyloMcError::InvalidInput(format!(
            "gamma shape must be positive, got {shape}"
        )));
    }
    if shape < 1.0 {
        let g = gamma(rng, shape + 1.0)?;
        let u = 1.0 - uniform01(rng);
        return Ok(g * u.powf(1.0 / shape));
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = 1.0 + c * x;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u = 1.0 - uniform01(rng);
        if u < 1.0 - 0.0331 * x.powi(4) {
            return Ok(d * v);
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return Ok(d * v);
        }
    }
}

/// Beta(a, b) draw via two gamma variates.
///
/// # Errors
///
/// Returns an error if either shape is not positive.
pub fn beta<R: Rng + ?Sized>(rng: &mut R, a: f64, b: f64) -> Result<f64> {
    let x = gamma(rng, a)?;
    let y = gamma(rng, b)?;
    let total = x + y;
    if total <= 0.0 {
        return Err(PhyloMcError::Numerical(
            "beta draw underflowed to 0/0".into(),
        ));
    }
    Ok(x / total)
}

/// Dirichlet(alpha) draw via normalized gamma variates.
///
/// Components may underflow to zero for tiny shapes; callers that need a
/// strictly positive simplex must check.
///
/// # Errors
///
/// Returns an error if `alpha` is empty, any shape is not positive, or every
/// gamma draw underflows.
pub fn dirichlet<R: Rng + ?Sized>(rng: &mut R, alpha: &[f64]) -> Result<Vec<f64>> {
    if alpha.is_empty() {
        return Err(PhyloMcError::InvalidInput(
            "dirichlet needs at least one shape".into(),
        ));
    }
    let mut draws = Vec::with_capacity(alpha.len());
    for &a in alpha {
        draws.push(gamma(rng, a)?);
    }
    let total: f64 = draws.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err(PhyloMcError::Numerical(
            "dirichlet gamma draws summed to zero".into(),
        ));
    }
    for d in &mut draws {
        *d /= total;
    }
    Ok(draws)
}
