use crate::integration_tests::{grid_coordinates, grid_offsets};
use matfree::prelude::*;
use util::assert_approx_slice_eq;

#[test]
fn two_element_mass_matrix_on_unit_interval() {
    let ceed = Ceed::init("/cpu/self/ref/serial");
    let h = 0.5;
    let x = ceed.vector_from_slice(&[0.0, 0.5, 1.0]);
    let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2]).unwrap();
    let r_q = ceed
        .strided_elem_restriction(2, 2, 1, 4, Strides::Backend)
        .unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();

    let qdata = ceed.vector(4);
    let build = ceed.q_function_interior_by_name("Mass1DBuild").unwrap();
    ceed.operator(&build, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("dx", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, VectorOpt::Active)
        .unwrap()
        .apply(&x, &qdata)
        .unwrap();
    // Jacobian h / 2 times unit Gauss weights
    assert_approx_slice_eq!(qdata.to_vec().unwrap(), [h / 2.0; 4], abstol = 1e-15);

    let apply = ceed.q_function_interior_by_name("MassApply").unwrap();
    let op = ceed
        .operator(&apply, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("u", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, &qdata)
        .unwrap()
        .field("v", &r, &b, VectorOpt::Active)
        .unwrap();

    let u = ceed.vector_from_slice(&[1.0; 3]);
    let v = ceed.vector(3);
    op.apply(&u, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [h / 2.0, h, h / 2.0], abstol = 1e-15);

    let diagonal = ceed.vector(3);
    op.linear_assemble_diagonal(&diagonal).unwrap();
    assert_approx_slice_eq!(
        diagonal.to_vec().unwrap(),
        [h / 3.0, 2.0 * h / 3.0, h / 3.0],
        abstol = 1e-15
    );
}

/// Area of the image of the unit square under `(x, y) -> (x, (1 + x) y)`, which is represented
/// exactly by bilinear elements.
fn sheared_area(resource: &str, solution_nodes: usize) -> f64 {
    let ceed = Ceed::init(resource);
    let num_xyz = [3, 2, 1];
    let num_elem = 6;
    let mut coords = grid_coordinates(2, num_xyz);
    let num_nodes = coords.len() / 2;
    for i in 0..num_nodes {
        coords[num_nodes + i] *= 1.0 + coords[i];
    }
    let x = ceed.vector_from_slice(&coords);
    let r_x = ceed
        .elem_restriction(num_elem, 4, 2, num_nodes, 2 * num_nodes, &grid_offsets(2, num_xyz))
        .unwrap();
    let b_x = ceed
        .basis_tensor_H1_Lagrange(2, 2, 2, 3, QuadMode::Gauss)
        .unwrap();

    // Discontinuous solution space, the area is the sum over all basis functions
    let elem_size = solution_nodes * solution_nodes;
    let num_dofs = num_elem * elem_size;
    let offsets: Vec<usize> = (0..num_dofs).collect();
    let r_u = ceed
        .elem_restriction(num_elem, elem_size, 1, 1, num_dofs, &offsets)
        .unwrap();
    let b_u = ceed
        .basis_tensor_H1_Lagrange(2, 1, solution_nodes, 3, QuadMode::Gauss)
        .unwrap();
    let r_q = ceed
        .strided_elem_restriction(num_elem, 9, 1, 9 * num_elem, Strides::Backend)
        .unwrap();

    let qdata = ceed.vector(9 * num_elem);
    let build = ceed.q_function_interior_by_name("Mass2DBuild").unwrap();
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

    let apply = ceed.q_function_interior_by_name("MassApply").unwrap();
    let op = ceed
        .operator(&apply, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("u", &r_u, &b_u, VectorOpt::Active)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, &qdata)
        .unwrap()
        .field("v", &r_u, &b_u, VectorOpt::Active)
        .unwrap();
    let u = ceed.vector_from_slice(&vec![1.0; num_dofs]);
    let v = ceed.vector(num_dofs);
    op.apply(&u, &v).unwrap();
    let area = v.view().unwrap().iter().sum();
    area
}

#[test]
fn area_of_sheared_square() {
    for resource in ["/cpu/self/ref/serial", "/cpu/self/par", "/gpu/emulated"] {
        for solution_nodes in [2, 3] {
            let area = sheared_area(resource, solution_nodes);
            assert!((area - 1.5).abs() < 1e-13, "{}: area {}", resource, area);
        }
    }
}
