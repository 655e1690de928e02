//! Distributions over the probability simplex.

use phylomc_core::special::ln_gamma;
use phylomc_core::{random, PhyloMcError, Result};
use rand::RngCore;

use crate::distribution::{expect_params, Distribution};
use crate::value::Value;

/// Tolerance on `Σ x = 1` when checking a simplex.
const SIMPLEX_TOL: f64 = 1e-8;

/// `ln Dir(x | alpha)`.
///
/// Negative infinity for a non-positive shape or component. The lengths must
/// agree; the caller checks.
pub fn dirichlet_ln_pdf(x: &[f64], alpha: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), alpha.len());
    if alpha.iter().any(|&a| !(a > 0.0)) || x.iter().any(|&v| !(v > 0.0)) {
        return f64::NEG_INFINITY;
    }
    let alpha_sum: f64 = alpha.iter().sum();
    let mut ln_p = ln_gamma(alpha_sum);
    for (&a, &v) in alpha.iter().zip(x) {
        ln_p += (a - 1.0) * v.ln() - ln_gamma(a);
    }
    ln_p
}

/// Dirichlet(alpha) over a simplex; `alpha` is a vector parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dirichlet;

impl Distribution for Dirichlet {
    fn name(&self) -> &str {
        "Dirichlet"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 1)?;
        let x = value.as_simplex()?;
        let alpha = params[0].as_vector()?;
        if x.len() != alpha.len() {
            return Err(PhyloMcError::Config(format!(
                "Dirichlet: simplex has {} components but alpha has {}",
                x.len(),
                alpha.len()
            )));
        }
        if (x.iter().sum::<f64>() - 1.0).abs() > SIMPLEX_TOL {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(dirichlet_ln_pdf(x, alpha))
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        let alpha = params[0].as_vector()?;
        Ok(Value::Simplex(random::dirichlet(rng, alpha)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylomc_core::random::seeded_rng;

    const TOL: f64 = 1e-10;

    #[test]
    fn flat_dirichlet_density() {
        // Dir(1,1,1) is uniform on the 2-simplex with density Γ(3) = 2
        let lnp = dirichlet_ln_pdf(&[0.2, 0.3, 0.5], &[1.0, 1.0, 1.0]);
        assert!((lnp - 2.0_f64.ln()).abs() < TOL);
    }

    #[test]
    fn two_component_dirichlet_is_beta() {
        let lnp = dirichlet_ln_pdf(&[0.3, 0.7], &[2.0, 5.0]);
        let beta = crate::distributions::beta_ln_pdf(0.3, 2.0, 5.0);
        assert!((lnp - beta).abs() < TOL);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(dirichlet_ln_pdf(&[0.0, 1.0], &[1.0, 1.0]), f64::NEG_INFINITY);
        assert_eq!(dirichlet_ln_pdf(&[0.5, 0.5], &[0.0, 1.0]), f64::NEG_INFINITY);
    }

    #[test]
    fn length_mismatch_is_config_error() {
        let x = Value::Simplex(vec![0.5, 0.5]);
        let alpha = Value::Vector(vec![1.0, 1.0, 1.0]);
        assert!(matches!(
            Dirichlet.ln_probability(&x, &[&alpha]),
            Err(PhyloMcError::Config(_))
        ));
    }

    #[test]
    fn off_simplex_value_has_zero_density() {
        let x = Value::Simplex(vec![0.5, 0.6]);
        let alpha = Value::Vector(vec![1.0, 1.0]);
        assert_eq!(
            Dirichlet.ln_probability(&x, &[&alpha]).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn redraw_is_simplex() {
        let alpha = Value::Vector(vec![2.0, 3.0, 4.0]);
        let mut rng = seeded_rng(8);
        let v = Dirichlet.redraw(&[&alpha], &mut rng).unwrap();
        let x = v.as_simplex().unwrap();
        assert!((x.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(Dirichlet.ln_probability(&v, &[&alpha]).unwrap().is_finite());
    }
}
