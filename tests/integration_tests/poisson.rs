use crate::integration_tests::{grid_coordinates, grid_offsets};
use matfree::prelude::*;
use matrixcompare::assert_scalar_eq;

/// The Poisson operator on a trilinear hexahedral grid of the unit cube.
fn poisson_3d<'a>(ceed: &Ceed, num_xyz: [usize; 3]) -> (Operator<'a>, Vec<f64>) {
    let num_elem: usize = num_xyz.iter().product();
    let coords = grid_coordinates(3, num_xyz);
    let num_nodes = coords.len() / 3;
    let offsets = grid_offsets(3, num_xyz);
    let x = ceed.vector_from_slice(&coords);
    let r_x = ceed
        .elem_restriction(num_elem, 8, 3, num_nodes, 3 * num_nodes, &offsets)
        .unwrap();
    let b_x = ceed
        .basis_tensor_H1_Lagrange(3, 3, 2, 2, QuadMode::Gauss)
        .unwrap();
    let r_u = ceed
        .elem_restriction(num_elem, 8, 1, 1, num_nodes, &offsets)
        .unwrap();
    let b_u = ceed
        .basis_tensor_H1_Lagrange(3, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let r_q = ceed
        .strided_elem_restriction(num_elem, 8, 6, 48 * num_elem, Strides::Backend)
        .unwrap();

    let qdata = ceed.vector(48 * num_elem);
    let build = ceed.q_function_interior_by_name("Poisson3DBuild").unwrap();
    ceed.operator(&build, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("dx", &r_x, &b_x, VectorOpt::Active)
        .unwrap()
        .field("weights", ElemRestrictionOpt::None, &b_x, VectorOpt::None)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, VectorOpt::Active)
        .unwrap()
        .apply(&x, &qdata)
        .unwrap();

    let apply = ceed.q_function_interior_by_name("Poisson3DApply").unwrap();
    let op = ceed
        .operator(&apply, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("du", &r_u, &b_u, VectorOpt::Active)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, &qdata)
        .unwrap()
        .field("dv", &r_u, &b_u, VectorOpt::Active)
        .unwrap();
    (op, coords)
}

#[test]
fn energy_of_linear_function() {
    for resource in ["/cpu/self/ref/serial", "/cpu/self/par"] {
        let ceed = Ceed::init(resource);
        let (op, coords) = poisson_3d(&ceed, [3, 2, 2]);
        let n = coords.len() / 3;

        // u = x + 2y - z has constant gradient with squared norm 6
        let u: Vec<f64> = (0..n)
            .map(|i| coords[i] + 2.0 * coords[n + i] - coords[2 * n + i])
            .collect();
        let u_vec = ceed.vector_from_slice(&u);
        let ku = ceed.vector(n);
        op.apply(&u_vec, &ku).unwrap();
        let energy: f64 = u.iter().zip(ku.to_vec().unwrap()).map(|(a, b)| a * b).sum();
        assert_scalar_eq!(energy, 6.0, comp = abs, tol = 1e-12);

        // Constants are in the kernel
        let ones = ceed.vector_from_slice(&vec![1.0; n]);
        op.apply(&ones, &ku).unwrap();
        assert!(ku.norm(NormType::Max).unwrap() < 1e-13);
    }
}

#[test]
fn diagonal_of_single_trilinear_element() {
    let ceed = Ceed::default_init();
    let (op, _) = poisson_3d(&ceed, [1, 1, 1]);
    let diagonal = ceed.vector(8);
    op.linear_assemble_diagonal(&diagonal).unwrap();
    // Each diagonal entry of the trilinear stiffness matrix of the unit cube is 1/3
    for d in diagonal.to_vec().unwrap() {
        assert_scalar_eq!(d, 1.0 / 3.0, comp = abs, tol = 1e-14);
    }
}
