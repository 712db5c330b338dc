//! 1D Lagrange interpolation matrices.
use crate::Scalar;
use nalgebra::DMatrix;

/// Values and derivatives of the Lagrange polynomials on `nodes`, evaluated at `points`.
///
/// Returns `(interp, grad)`, both of size `points.len() x nodes.len()`, with entry `(q, p)`
/// holding polynomial `p` evaluated at point `q`.
pub(crate) fn lagrange_matrices(nodes: &[Scalar], points: &[Scalar]) -> (DMatrix<Scalar>, DMatrix<Scalar>) {
    let num_nodes = nodes.len();
    let mut interp = DMatrix::zeros(points.len(), num_nodes);
    let mut grad = DMatrix::zeros(points.len(), num_nodes);

    for (q, &x) in points.iter().enumerate() {
        for p in 0..num_nodes {
            let factor = |m: usize| (x - nodes[m]) / (nodes[p] - nodes[m]);
            let others = || (0..num_nodes).filter(move |&m| m != p);

            interp[(q, p)] = others().map(factor).product();
            grad[(q, p)] = others()
                .map(|k| {
                    let rest: Scalar = others().filter(|&m| m != k).map(factor).product();
                    rest / (nodes[p] - nodes[k])
                })
                .sum();
        }
    }

    (interp, grad)
}
