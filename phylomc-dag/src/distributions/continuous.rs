//! Scalar continuous distributions.
//!
//! Each takes its parameters from the owning node's parents, in the order
//! listed on the type. Parameters outside the domain (non-positive scale,
//! inverted bounds) give a log-density of negative infinity.

use std::f64::consts::PI;

use phylomc_core::special::{ln_beta, ln_gamma};
use phylomc_core::{random, PhyloMcError, Result};
use rand::RngCore;

use crate::distribution::{expect_params, Distribution};
use crate::value::Value;

/// `ln N(x | mean, sd)`.
pub fn normal_ln_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    if !(sd > 0.0) {
        return f64::NEG_INFINITY;
    }
    let z = (x - mean) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
}

/// `ln Exp(x | rate)`.
pub fn exponential_ln_pdf(x: f64, rate: f64) -> f64 {
    if !(rate > 0.0) || x < 0.0 {
        return f64::NEG_INFINITY;
    }
    rate.ln() - rate * x
}

/// `ln Gamma(x | shape, rate)`.
pub fn gamma_ln_pdf(x: f64, shape: f64, rate: f64) -> f64 {
    if !(shape > 0.0 && rate > 0.0) || x <= 0.0 {
        return f64::NEG_INFINITY;
    }
    shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
}

/// `ln Beta(x | a, b)`.
pub fn beta_ln_pdf(x: f64, a: f64, b: f64) -> f64 {
    if !(a > 0.0 && b > 0.0) || x <= 0.0 || x >= 1.0 {
        return f64::NEG_INFINITY;
    }
    (a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - ln_beta(a, b)
}

fn domain_error(name: &str, detail: &str) -> PhyloMcError {
    PhyloMcError::InvalidInput(format!("{}: {}", name, detail))
}

/// Normal(mean, sd) over a real.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normal;

impl Distribution for Normal {
    fn name(&self) -> &str {
        "Normal"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 2)?;
        Ok(normal_ln_pdf(
            value.as_real()?,
            params[0].as_real()?,
            params[1].as_real()?,
        ))
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 2)?;
        let (mean, sd) = (params[0].as_real()?, params[1].as_real()?);
        if !(sd > 0.0) {
            return Err(domain_error(self.name(), "sd must be positive"));
        }
        Ok(Value::Real(mean + sd * random::standard_normal(rng)))
    }
}

/// Exponential(rate) over a real, or iid over a vector of fixed length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential {
    dim: Option<usize>,
}

impl Exponential {
    /// Scalar exponential.
    pub fn new() -> Self {
        Self { dim: None }
    }

    /// `dim` iid exponentials held as a vector.
    pub fn iid(dim: usize) -> Self {
        Self { dim: Some(dim) }
    }
}

impl Distribution for Exponential {
    fn name(&self) -> &str {
        "Exponential"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 1)?;
        let rate = params[0].as_real()?;
        match self.dim {
            None => Ok(exponential_ln_pdf(value.as_real()?, rate)),
            Some(dim) => {
                let xs = value.as_vector()?;
                if xs.len() != dim {
                    return Err(PhyloMcError::Config(format!(
                        "Exponential expects {} components, got {}",
                        dim,
                        xs.len()
                    )));
                }
                Ok(xs.iter().map(|&x| exponential_ln_pdf(x, rate)).sum())
            }
        }
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        let rate = params[0].as_real()?;
        if !(rate > 0.0) {
            return Err(domain_error(self.name(), "rate must be positive"));
        }
        let mut draw = || -(1.0 - random::uniform01(&mut *rng)).ln() / rate;
        Ok(match self.dim {
            None => Value::Real(draw()),
            Some(dim) => Value::Vector((0..dim).map(|_| draw()).collect()),
        })
    }
}

/// Uniform(lower, upper) over a real.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Distribution for Uniform {
    fn name(&self) -> &str {
        "Uniform"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 2)?;
        let x = value.as_real()?;
        let (lo, hi) = (params[0].as_real()?, params[1].as_real()?);
        if !(hi > lo) || x < lo || x > hi {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(-(hi - lo).ln())
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 2)?;
        let (lo, hi) = (params[0].as_real()?, params[1].as_real()?);
        if !(hi > lo) {
            return Err(domain_error(self.name(), "upper bound must exceed lower bound"));
        }
        Ok(Value::Real(random::uniform(rng, lo, hi)))
    }
}

/// Gamma(shape, rate) over a positive real.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gamma;

impl Distribution for Gamma {
    fn name(&self) -> &str {
        "Gamma"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 2)?;
        Ok(gamma_ln_pdf(
            value.as_real()?,
            params[0].as_real()?,
            params[1].as_real()?,
        ))
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 2)?;
        let (shape, rate) = (params[0].as_real()?, params[1].as_real()?);
        if !(rate > 0.0) {
            return Err(domain_error(self.name(), "rate must be positive"));
        }
        Ok(Value::Real(random::gamma(rng, shape)? / rate))
    }
}

/// Beta(a, b) over a real in (0, 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct Beta;

impl Distribution for Beta {
    fn name(&self) -> &str {
        "Beta"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 2)?;
        Ok(beta_ln_pdf(
            value.as_real()?,
            params[0].as_real()?,
            params[1].as_real()?,
        ))
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 2)?;
        Ok(Value::Real(random::beta(
            rng,
            params[0].as_real()?,
            params[1].as_real()?,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylomc_core::random::seeded_rng;

    const TOL: f64 = 1e-10;

    #[test]
    fn normal_density_at_mean() {
        let expected = -0.5 * (2.0 * PI).ln();
        assert!((normal_ln_pdf(0.0, 0.0, 1.0) - expected).abs() < TOL);
        assert_eq!(normal_ln_pdf(0.0, 0.0, -1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn exponential_density() {
        assert!((exponential_ln_pdf(1.0, 2.0) - (2.0_f64.ln() - 2.0)).abs() < TOL);
        assert_eq!(exponential_ln_pdf(-1.0, 2.0), f64::NEG_INFINITY);
    }

    #[test]
    fn gamma_with_unit_shape_is_exponential() {
        assert!((gamma_ln_pdf(0.7, 1.0, 3.0) - exponential_ln_pdf(0.7, 3.0)).abs() < TOL);
    }

    #[test]
    fn beta_uniform_case() {
        assert!(beta_ln_pdf(0.3, 1.0, 1.0).abs() < TOL);
        assert_eq!(beta_ln_pdf(1.0, 2.0, 2.0), f64::NEG_INFINITY);
    }

    #[test]
    fn distribution_checks_param_count() {
        let x = Value::Real(0.0);
        assert!(matches!(
            Normal.ln_probability(&x, &[&x]),
            Err(PhyloMcError::Config(_))
        ));
    }

    #[test]
    fn distribution_reports_type_mismatch() {
        let vector = Value::Vector(vec![1.0]);
        let one = Value::Real(1.0);
        assert!(matches!(
            Normal.ln_probability(&vector, &[&one, &one]),
            Err(PhyloMcError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn exponential_iid_vector() {
        let rate = Value::Real(1.5);
        let mut rng = seeded_rng(4);
        let v = Exponential::iid(3).redraw(&[&rate], &mut rng).unwrap();
        assert_eq!(v.as_vector().unwrap().len(), 3);
        let lnp = Exponential::iid(3).ln_probability(&v, &[&rate]).unwrap();
        let expected: f64 = v
            .as_vector()
            .unwrap()
            .iter()
            .map(|&x| exponential_ln_pdf(x, 1.5))
            .sum();
        assert!((lnp - expected).abs() < TOL);
        assert!(Exponential::iid(2).ln_probability(&v, &[&rate]).is_err());
    }

    #[test]
    fn uniform_bounds() {
        let lo = Value::Real(1.0);
        let hi = Value::Real(3.0);
        let inside = Uniform.ln_probability(&Value::Real(2.0), &[&lo, &hi]).unwrap();
        assert!((inside + 2.0_f64.ln()).abs() < TOL);
        let outside = Uniform.ln_probability(&Value::Real(4.0), &[&lo, &hi]).unwrap();
        assert_eq!(outside, f64::NEG_INFINITY);
    }

    #[test]
    fn redraws_stay_in_support() {
        let mut rng = seeded_rng(17);
        let two = Value::Real(2.0);
        let three = Value::Real(3.0);
        for _ in 0..100 {
            let g = Gamma.redraw(&[&two, &three], &mut rng).unwrap();
            assert!(g.as_real().unwrap() > 0.0);
            let b = Beta.redraw(&[&two, &three], &mut rng).unwrap();
            let b = b.as_real().unwrap();
            assert!(b > 0.0 && b < 1.0);
        }
    }
}
