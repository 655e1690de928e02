//! Reference deterministic functions.

use phylomc_core::{PhyloMcError, Result};

use crate::distribution::expect_params;
use crate::function::Function;
use crate::value::Value;

/// The real parents as one list, or the components of a single vector parent.
fn reals(params: &[&Value]) -> Result<Vec<f64>> {
    match params {
        [single] if !matches!(single, Value::Real(_) | Value::Integer(_)) => {
            Ok(single.as_vector()?.to_vec())
        }
        _ => params.iter().map(|p| p.as_real()).collect(),
    }
}

/// Sum of the real parents, or of a single vector parent's components.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Function for Sum {
    fn name(&self) -> &str {
        "Sum"
    }

    fn update(&self, params: &[&Value]) -> Result<Value> {
        Ok(Value::Real(reals(params)?.iter().sum()))
    }
}

/// Product of the real parents, or of a single vector parent's components.
#[derive(Debug, Clone, Copy, Default)]
pub struct Product;

impl Function for Product {
    fn name(&self) -> &str {
        "Product"
    }

    fn update(&self, params: &[&Value]) -> Result<Value> {
        Ok(Value::Real(reals(params)?.iter().product()))
    }
}

/// Elementwise `exp` of a real or a vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl Function for Exp {
    fn name(&self) -> &str {
        "Exp"
    }

    fn update(&self, params: &[&Value]) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        match params[0] {
            Value::Vector(v) | Value::Simplex(v) => {
                Ok(Value::Vector(v.iter().map(|x| x.exp()).collect()))
            }
            other => Ok(Value::Real(other.as_real()?.exp())),
        }
    }
}

/// Rescale a non-negative vector onto the simplex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalize;

impl Function for Normalize {
    fn name(&self) -> &str {
        "Normalize"
    }

    fn update(&self, params: &[&Value]) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        let v = params[0].as_vector()?;
        let total: f64 = v.iter().sum();
        if !(total > 0.0 && total.is_finite()) || v.iter().any(|&x| x < 0.0) {
            return Err(PhyloMcError::Numerical(format!(
                "cannot normalize vector with sum {}",
                total
            )));
        }
        Ok(Value::Simplex(v.iter().map(|x| x / total).collect()))
    }
}

/// Root age of a tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeHeight;

impl Function for TreeHeight {
    fn name(&self) -> &str {
        "TreeHeight"
    }

    fn update(&self, params: &[&Value]) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        Ok(Value::Real(params[0].as_tree()?.height()))
    }
}
