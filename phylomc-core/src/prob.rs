//! Log-space probability types for numerically stable computation.
//!
//! [`LogProb`] represents a probability (or an unnormalized weight) by its
//! natural logarithm. The free functions work on slices of log weights, which
//! is how Gibbs-style proposals hold the posterior weight of each candidate.

use crate::{PhyloMcError, Result};

/// A probability stored as its natural logarithm: `ln(p)`.
///
/// Negative infinity represents impossibility (p = 0). Unnormalized weights
/// are allowed, so values above zero are not rejected.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct LogProb(pub f64);

impl LogProb {
    /// Create a [`LogProb`] from a raw probability in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `p` is not in `(0, 1]`.
    pub fn from_prob(p: f64) -> Result<Self> {
        if p <= 0.0 || p > 1.0 {
            return Err(PhyloMcError::InvalidInput(
                "LogProb::from_prob: p must be in (0, 1]".into(),
            ));
        }
        Ok(Self(p.ln()))
    }

    /// Convert back to a raw probability.
    pub fn to_prob(self) -> f64 {
        self.0.exp()
    }

    /// Log-sum-exp: compute `ln(exp(self) + exp(other))` without overflow.
    pub fn ln_add(self, other: Self) -> Self {
        if self.0 == f64::NEG_INFINITY {
            return other;
        }
        if other.0 == f64::NEG_INFINITY {
            return self;
        }
        let (max, min) = if self.0 >= other.0 {
            (self.0, other.0)
        } else {
            (other.0, self.0)
        };
        Self(max + (min - max).exp().ln_1p())
    }

    /// Multiply two probabilities in log-space (addition of log values).
    pub fn ln_mul(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Certain event: `ln(1) = 0`.
    pub const fn certain() -> Self {
        Self(0.0)
    }

    /// Impossible event: `ln(0) = -∞`.
    pub const fn impossible() -> Self {
        Self(f64::NEG_INFINITY)
    }

    /// True for `-∞`.
    pub fn is_impossible(self) -> bool {
        self.0 == f64::NEG_INFINITY
    }
}

/// `ln(Σ exp(wᵢ))` over a slice of log weights.
///
/// Returns `-∞` for an empty slice or when every weight is `-∞`.
pub fn ln_sum_exp(ln_weights: &[f64]) -> f64 {
    ln_weights
        .iter()
        .fold(LogProb::impossible(), |acc, &w| acc.ln_add(LogProb(w)))
        .0
}

/// Normalize log weights into probabilities that sum to one.
///
/// Returns `None` when the total weight is zero or not finite.
pub fn normalize_ln_weights(ln_weights: &[f64]) -> Option<Vec<f64>> {
    let total = ln_sum_exp(ln_weights);
    if !total.is_finite() {
        return None;
    }
    Some(ln_weights.iter().map(|&w| (w - total).exp()).collect())
}

/// Pick an index with probability proportional to `exp(ln_weights[i])`,
/// given a uniform draw `u` in `[0, 1)`.
pub fn sample_ln_weights(ln_weights: &[f64], u: f64) -> Option<usize> {
    let probs = normalize_ln_weights(ln_weights)?;
    let mut acc = 0.0;
    let mut last_positive = None;
    for (i, p) in probs.iter().enumerate() {
        if *p > 0.0 {
            last_positive = Some(i);
        }
        acc += p;
        if u < acc {
            return Some(i);
        }
    }
    // rounding left u just above the cumulative total
    last_positive
}
