use matfree::prelude::*;
use matfree::quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};
use matrixcompare::assert_scalar_eq;
use util::assert_approx_slice_eq;

/// Linear Lagrange basis on the reference triangle with a one-point centroid rule.
fn p1_triangle(ceed: &Ceed) -> Basis {
    let third = 1.0 / 3.0;
    ceed.basis_H1(
        ElemTopology::Triangle,
        1,
        3,
        1,
        &[third, third, third],
        &[-1.0, 1.0, 0.0, -1.0, 0.0, 1.0],
        &[third, third],
        &[0.5],
    )
    .unwrap()
}

/// The Q-vector of `basis` applied to the given E-vector of a single element.
fn interpolate(ceed: &Ceed, basis: &Basis, emode: EvalMode, u: &[f64]) -> Vec<f64> {
    let u = ceed.vector_from_slice(u);
    let v = ceed.vector(basis.element_qvector_size(emode).unwrap());
    basis
        .apply(1, TransposeMode::NoTranspose, emode, &u, &v)
        .unwrap();
    v.to_vec().unwrap()
}

#[test]
fn display() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(2, 1, 3, 4, QuadMode::Gauss)
        .unwrap();
    insta::assert_snapshot!(basis.to_string(), @"Basis tensor H1 on Quad with 1 components, 9 nodes and 16 quadrature points");
    insta::assert_snapshot!(p1_triangle(&ceed).to_string(), @"Basis H1 on Triangle with 1 components, 3 nodes and 1 quadrature points");
}

#[test]
fn tensor_quadrature_matches_tensor_rules() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(3, 1, 2, 3, QuadMode::Gauss)
        .unwrap();
    let (weights, points) = hexahedron_gauss(3);
    assert_approx_slice_eq!(basis.q_weights(), weights, abstol = 1e-14);

    let nq = basis.num_quadrature_points();
    assert_eq!(nq, points.len());
    for (q, point) in points.iter().enumerate() {
        for d in 0..3 {
            assert_scalar_eq!(basis.q_ref()[d * nq + q], point[d], comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn element_mass_matrix_is_recovered_from_interpolation_and_integration() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let weights = basis.q_weights().to_vec();

    let mut mass = [[0.0; 2]; 2];
    for (j, column) in [[1.0, 0.0], [0.0, 1.0]].iter().enumerate() {
        let uq: Vec<f64> = interpolate(&ceed, &basis, EvalMode::Interp, column)
            .iter()
            .zip(&weights)
            .map(|(u, w)| u * w)
            .collect();
        let uq = ceed.vector_from_slice(&uq);
        let v = ceed.vector(2);
        basis
            .apply(1, TransposeMode::Transpose, EvalMode::Interp, &uq, &v)
            .unwrap();
        for (i, value) in v.to_vec().unwrap().into_iter().enumerate() {
            mass[i][j] = value;
        }
    }

    // The reference interval has length 2
    let expected = [[2.0 / 3.0, 1.0 / 3.0], [1.0 / 3.0, 2.0 / 3.0]];
    for i in 0..2 {
        assert_approx_slice_eq!(mass[i], expected[i], abstol = 1e-14);
    }
}

#[test]
fn gradient_of_linear_function_is_constant() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(2, 1, 3, 3, QuadMode::Gauss)
        .unwrap();
    // Gauss-Lobatto nodes [-1, 0, 1], with x running fastest
    let nodes = [-1.0, 0.0, 1.0];
    let u: Vec<f64> = (0..9)
        .map(|i| 2.0 * nodes[i % 3] + 3.0 * nodes[i / 3])
        .collect();

    let du = interpolate(&ceed, &basis, EvalMode::Grad, &u);
    assert_approx_slice_eq!(&du[..9], [2.0; 9], abstol = 1e-13);
    assert_approx_slice_eq!(&du[9..], [3.0; 9], abstol = 1e-13);

    // Interpolation into the Gauss points reproduces the linear function
    let (_, points) = quadrilateral_gauss(3);
    let expected: Vec<f64> = points.iter().map(|[x, y]| 2.0 * x + 3.0 * y).collect();
    let uq = interpolate(&ceed, &basis, EvalMode::Interp, &u);
    assert_approx_slice_eq!(uq, expected, abstol = 1e-13);
}

#[test]
fn components_are_evaluated_independently() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(1, 2, 2, 3, QuadMode::GaussLobatto)
        .unwrap();
    // Component 0 is constant, component 1 is linear
    let uq = interpolate(&ceed, &basis, EvalMode::Interp, &[1.0, 1.0, -1.0, 1.0]);
    assert_approx_slice_eq!(uq, [1.0, 1.0, 1.0, -1.0, 0.0, 1.0], abstol = 1e-14);
}

#[test]
fn transpose_is_adjoint() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(3, 2, 3, 4, QuadMode::Gauss)
        .unwrap();
    let e_size = basis.element_evector_size();
    let q_size = basis.element_qvector_size(EvalMode::Grad).unwrap();
    let u: Vec<f64> = (0..e_size).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
    let w: Vec<f64> = (0..q_size).map(|i| ((i * 5) % 13) as f64 - 6.0).collect();

    let bu = interpolate(&ceed, &basis, EvalMode::Grad, &u);
    let w_vec = ceed.vector_from_slice(&w);
    let bt_w = ceed.vector(e_size);
    basis
        .apply(1, TransposeMode::Transpose, EvalMode::Grad, &w_vec, &bt_w)
        .unwrap();

    let lhs: f64 = bu.iter().zip(&w).map(|(a, b)| a * b).sum();
    let rhs: f64 = u.iter().zip(bt_w.to_vec().unwrap()).map(|(a, b)| a * b).sum();
    assert_scalar_eq!(lhs, rhs, comp = abs, tol = 1e-9);
}

#[test]
fn non_tensor_triangle() {
    let ceed = Ceed::default_init();
    let basis = p1_triangle(&ceed);
    assert!(!basis.is_tensor());
    assert_eq!(basis.dimension(), 2);

    let u = [1.0, 2.0, 3.0];
    assert_approx_slice_eq!(interpolate(&ceed, &basis, EvalMode::Interp, &u), [2.0], abstol = 1e-14);
    assert_approx_slice_eq!(interpolate(&ceed, &basis, EvalMode::Grad, &u), [1.0, 2.0], abstol = 1e-14);
}

#[test]
fn weights_are_repeated_per_element() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let none = ceed.vector(0);
    let w = ceed.vector(6);
    basis
        .apply(3, TransposeMode::NoTranspose, EvalMode::Weight, &none, &w)
        .unwrap();
    assert_approx_slice_eq!(w.to_vec().unwrap(), [1.0; 6], abstol = 1e-14);

    assert!(matches!(
        basis.apply(3, TransposeMode::Transpose, EvalMode::Weight, &w, &w),
        Err(Error::Shape(_))
    ));
}

#[test]
fn unsupported_modes_and_sizes_are_rejected() {
    let ceed = Ceed::default_init();
    let basis = ceed
        .basis_tensor_H1_Lagrange(2, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    assert!(matches!(basis.q_comp(EvalMode::Div), Err(Error::Shape(_))));
    assert!(matches!(basis.q_comp(EvalMode::Curl), Err(Error::Shape(_))));

    let u = ceed.vector(3);
    let v = ceed.vector(4);
    assert!(matches!(
        basis.apply(1, TransposeMode::NoTranspose, EvalMode::Interp, &u, &v),
        Err(Error::Shape(_))
    ));

    assert!(matches!(
        ceed.basis_tensor_H1_Lagrange(1, 1, 1, 2, QuadMode::Gauss),
        Err(Error::Shape(_))
    ));
    assert!(matches!(
        ceed.basis_tensor_H1_Lagrange(1, 1, 2, 1, QuadMode::GaussLobatto),
        Err(Error::Shape(_))
    ));
}

#[test]
fn hdiv_and_hcurl_quadrature_components() {
    let ceed = Ceed::default_init();
    let third = 1.0 / 3.0;
    // Lowest order Raviart-Thomas functions on the reference triangle at the centroid
    let hdiv = ceed
        .basis_Hdiv(
            ElemTopology::Triangle,
            1,
            3,
            1,
            &[third, third - 1.0, third, third, third, third - 1.0],
            &[2.0, 2.0, 2.0],
            &[third, third],
            &[0.5],
        )
        .unwrap();
    assert_eq!(hdiv.q_comp(EvalMode::Interp).unwrap(), 2);
    assert_eq!(hdiv.q_comp(EvalMode::Div).unwrap(), 1);
    assert!(matches!(hdiv.q_comp(EvalMode::Grad), Err(Error::Shape(_))));
    let div = interpolate(&ceed, &hdiv, EvalMode::Div, &[1.0, 1.0, 1.0]);
    assert_approx_slice_eq!(div, [6.0], abstol = 1e-14);

    let hcurl = ceed
        .basis_Hcurl(
            ElemTopology::Triangle,
            1,
            3,
            1,
            &[0.0; 6],
            &[2.0, 2.0, 2.0],
            &[third, third],
            &[0.5],
        )
        .unwrap();
    assert_eq!(hcurl.q_comp(EvalMode::Curl).unwrap(), 1);

    assert!(matches!(
        ceed.basis_Hdiv(ElemTopology::Line, 1, 2, 1, &[0.0; 2], &[0.0; 2], &[0.0], &[2.0]),
        Err(Error::Shape(_))
    ));
}

#[test]
fn projection_between_lagrange_bases_preserves_linear_functions() {
    let ceed = Ceed::default_init();
    let linear = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 3, QuadMode::Gauss)
        .unwrap();
    let quadratic = ceed
        .basis_tensor_H1_Lagrange(1, 1, 3, 3, QuadMode::Gauss)
        .unwrap();
    let projection = Basis::create_projection(&linear, &quadratic).unwrap();
    assert_eq!(projection.num_nodes(), 2);
    assert_eq!(projection.num_quadrature_points(), 3);

    let values = interpolate(&ceed, &projection, EvalMode::Interp, &[1.0, 3.0]);
    assert_approx_slice_eq!(values, [1.0, 2.0, 3.0], abstol = 1e-12);

    let mismatched = ceed
        .basis_tensor_H1_Lagrange(1, 1, 3, 4, QuadMode::Gauss)
        .unwrap();
    assert!(matches!(
        Basis::create_projection(&linear, &mismatched),
        Err(Error::Shape(_))
    ));
}
