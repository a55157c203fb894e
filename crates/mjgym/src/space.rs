//! Box-shaped action and observation spaces.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in `R^n`. Bounds may be infinite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bound per dimension.
    pub low: Vec<f64>,
    /// Upper bound per dimension.
    pub high: Vec<f64>,
}

impl BoxSpace {
    /// Box with the same bounds in every dimension.
    pub fn uniform(dim: usize, low: f64, high: f64) -> Self {
        Self {
            low: vec![low; dim],
            high: vec![high; dim],
        }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Whether `x` has the right length and lies inside the bounds.
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }

    /// Clamp `x` into the box.
    pub fn clip(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_clip() {
        let space = BoxSpace::uniform(2, -1.0, 1.0);
        assert_eq!(space.dim(), 2);
        assert!(space.contains(&[0.5, -1.0]));
        assert!(!space.contains(&[0.5]));
        assert!(!space.contains(&[1.5, 0.0]));
        assert_eq!(space.clip(&[1.5, -3.0]), vec![1.0, -1.0]);
    }

    #[test]
    fn test_unbounded() {
        let space = BoxSpace::uniform(3, f64::NEG_INFINITY, f64::INFINITY);
        assert!(space.contains(&[1e300, -1e300, 0.0]));
    }
}
