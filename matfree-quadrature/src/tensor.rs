//! 2D and 3D quadrature rules formed by tensor product formulations.
//!
//! For quadrilaterals and hexahedra, quadrature rules can be constructed as tensor products
//! of 1D rules. This module provides rules constructed in this fashion. The first coordinate
//! runs fastest in the resulting point ordering.

use crate::univariate::{gauss, gauss_lobatto};
use crate::{Rule, Rule1d};

/// Forms the tensor product of a 1D rule with itself on the quadrilateral.
pub fn quadrilateral_tensor(rule1d: &Rule1d) -> Rule<2> {
    let (weights1d, points1d) = rule1d;
    let n = weights1d.len();
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(points1d);

    for (&wy, &[y]) in rule1d_iter() {
        for (&wx, &[x]) in rule1d_iter() {
            weights2d.push(wx * wy);
            points2d.push([x, y]);
        }
    }

    (weights2d, points2d)
}

/// Forms the tensor product of a 1D rule with itself on the hexahedron.
pub fn hexahedron_tensor(rule1d: &Rule1d) -> Rule<3> {
    let (weights1d, points1d) = rule1d;
    let n = weights1d.len();
    let mut weights3d = Vec::with_capacity(n * n * n);
    let mut points3d = Vec::with_capacity(n * n * n);

    let rule1d_iter = || weights1d.iter().zip(points1d);

    for (&wz, &[z]) in rule1d_iter() {
        for (&wy, &[y]) in rule1d_iter() {
            for (&wx, &[x]) in rule1d_iter() {
                weights3d.push(wx * wy * wz);
                points3d.push([x, y, z]);
            }
        }
    }

    (weights3d, points3d)
}

/// A Gauss quadrature rule for the reference quadrilateral.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    quadrilateral_tensor(&gauss(num_points_per_dim))
}

/// A Gauss quadrature rule for the reference hexahedron.
///
/// The rule is constructed as a tensor product from 1D rules, with the provided number of
/// points per dimension.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    hexahedron_tensor(&gauss(num_points_per_dim))
}

/// A Gauss-Lobatto rule for the reference quadrilateral.
///
/// # Panics
///
/// Panics if fewer than two points per dimension are requested.
pub fn quadrilateral_gauss_lobatto(num_points_per_dim: usize) -> Rule<2> {
    quadrilateral_tensor(&gauss_lobatto(num_points_per_dim))
}

/// A Gauss-Lobatto rule for the reference hexahedron.
///
/// # Panics
///
/// Panics if fewer than two points per dimension are requested.
pub fn hexahedron_gauss_lobatto(num_points_per_dim: usize) -> Rule<3> {
    hexahedron_tensor(&gauss_lobatto(num_points_per_dim))
}
