//! Values held by model-graph nodes.

use phylomc_core::{PhyloMcError, Result};
use phylomc_tree::TimeTree;

/// A current value plus the last committed ("stored") value.
///
/// `stored` only changes on [`keep`](Self::keep); between an edit and the
/// accept/reject decision `current` may diverge from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCell<T: Clone> {
    current: T,
    stored: T,
}

impl<T: Clone> ValueCell<T> {
    /// A cell whose current and stored values are both `value`.
    pub fn new(value: T) -> Self {
        Self {
            stored: value.clone(),
            current: value,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.current
    }

    pub fn stored(&self) -> &T {
        &self.stored
    }

    /// Replace the current value.
    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    /// Commit: `stored = current`.
    pub fn keep(&mut self) {
        self.stored.clone_from(&self.current);
    }

    /// Roll back: `current = stored`.
    pub fn restore(&mut self) {
        self.current.clone_from(&self.stored);
    }
}

/// The quantities a model graph can hold.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Real(f64),
    Integer(i64),
    Vector(Vec<f64>),
    /// Non-negative components summing to one.
    Simplex(Vec<f64>),
    Tree(TimeTree),
}

impl Value {
    /// Variant name, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Real(_) => "real",
            Value::Integer(_) => "integer",
            Value::Vector(_) => "vector",
            Value::Simplex(_) => "simplex",
            Value::Tree(_) => "tree",
        }
    }

    /// True if `other` is the same variant.
    pub fn same_kind(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    fn mismatch(&self, expected: &'static str) -> PhyloMcError {
        PhyloMcError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// A real number; integers are widened.
    pub fn as_real(&self) -> Result<f64> {
        match self {
            Value::Real(x) => Ok(*x),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(other.mismatch("real")),
        }
    }

    pub fn as_real_mut(&mut self) -> Result<&mut f64> {
        match self {
            Value::Real(x) => Ok(x),
            other => Err(other.mismatch("real")),
        }
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Vector components; a simplex is also a vector.
    pub fn as_vector(&self) -> Result<&[f64]> {
        match self {
            Value::Vector(v) | Value::Simplex(v) => Ok(v),
            other => Err(other.mismatch("vector")),
        }
    }

    pub fn as_vector_mut(&mut self) -> Result<&mut Vec<f64>> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(other.mismatch("vector")),
        }
    }

    pub fn as_simplex(&self) -> Result<&[f64]> {
        match self {
            Value::Simplex(v) => Ok(v),
            other => Err(other.mismatch("simplex")),
        }
    }

    pub fn as_simplex_mut(&mut self) -> Result<&mut Vec<f64>> {
        match self {
            Value::Simplex(v) => Ok(v),
            other => Err(other.mismatch("simplex")),
        }
    }

    pub fn as_tree(&self) -> Result<&TimeTree> {
        match self {
            Value::Tree(t) => Ok(t),
            other => Err(other.mismatch("tree")),
        }
    }

    pub fn as_tree_mut(&mut self) -> Result<&mut TimeTree> {
        match self {
            Value::Tree(t) => Ok(t),
            other => Err(other.mismatch("tree")),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<TimeTree> for Value {
    fn from(t: TimeTree) -> Self {
        Value::Tree(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_keep_and_restore() {
        let mut cell = ValueCell::new(vec![1.0, 2.0]);
        cell.current_mut()[0] = 5.0;
        assert_eq!(cell.stored(), &vec![1.0, 2.0]);
        cell.restore();
        assert_eq!(cell.current(), &vec![1.0, 2.0]);
        cell.set(vec![3.0]);
        cell.keep();
        assert_eq!(cell.stored(), &vec![3.0]);
    }

    #[test]
    fn accessors_report_mismatch() {
        let v = Value::Simplex(vec![0.5, 0.5]);
        assert_eq!(v.as_vector().unwrap(), &[0.5, 0.5]);
        assert!(v.as_simplex().is_ok());
        match v.as_real() {
            Err(PhyloMcError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "real");
                assert_eq!(found, "simplex");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
        assert!(Value::Vector(vec![1.0]).as_simplex().is_err());
    }

    #[test]
    fn integer_widens_to_real() {
        assert_eq!(Value::Integer(3).as_real().unwrap(), 3.0);
        assert!(Value::Real(3.0).as_integer().is_err());
    }

    #[test]
    fn same_kind_ignores_payload() {
        assert!(Value::Real(1.0).same_kind(&Value::Real(2.0)));
        assert!(!Value::Real(1.0).same_kind(&Value::Integer(1)));
    }
}
