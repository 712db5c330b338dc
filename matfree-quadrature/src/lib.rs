//! Quadrature rules for tensor-product reference domains.
//!
//! The main purpose of this crate is to supply the one-dimensional rules from which `matfree`
//! builds its tensor-product bases. The rules have no dependency on `matfree` and may be used
//! on their own.
//!
//! All rules are defined on the reference interval `[-1, 1]` (or the tensor product of copies of
//! it). Multi-dimensional points are ordered lexicographically with the first coordinate running
//! fastest, which matches the quadrature point ordering of tensor bases in `matfree`.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A three-dimensional point.
pub type Point3 = Point<3>;

/// A D-dimensional rule, stored as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of the given function with the given quadrature rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .sum()
}

/// Splits a 1D rule into separate point and weight vectors.
pub fn unzip_1d(rule: Rule1d) -> (Vec<f64>, Vec<f64>) {
    let (weights, points) = rule;
    (points.into_iter().map(|[x]| x).collect(), weights)
}
