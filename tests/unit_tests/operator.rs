use crate::unit_tests::{chain_offsets, MassProblem1d, PoissonProblem2d};
use matfree::prelude::*;
use util::assert_approx_slice_eq;

fn poisson_1d<'a>(ceed: &Ceed, num_elem: usize) -> (ElemRestriction, Operator<'a>) {
    let num_nodes = num_elem + 1;
    let h = 1.0 / num_elem as f64;
    let x = ceed.vector_from_slice(&(0..num_nodes).map(|i| i as f64 * h).collect::<Vec<_>>());
    let r = ceed
        .elem_restriction(num_elem, 2, 1, 1, num_nodes, &chain_offsets(num_elem, 2))
        .unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let r_q = ceed
        .strided_elem_restriction(num_elem, 2, 1, 2 * num_elem, Strides::Backend)
        .unwrap();
    let qdata = ceed.vector(2 * num_elem);

    let build = ceed.q_function_interior_by_name("Poisson1DBuild").unwrap();
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

    let apply = ceed.q_function_interior_by_name("Poisson1DApply").unwrap();
    let op = ceed
        .operator(&apply, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("du", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("qdata", &r_q, BasisOpt::None, &qdata)
        .unwrap()
        .field("dv", &r, &b, VectorOpt::Active)
        .unwrap();
    (r, op)
}

#[test]
fn mass_operator_integrates_constants() {
    let ceed = Ceed::default_init();
    let problem = MassProblem1d::new(&ceed, 2, 2, 2).unwrap();
    let u = ceed.vector_from_slice(&[1.0; 3]);
    let v = ceed.vector(3);
    problem.op.apply(&u, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [0.25, 0.5, 0.25], abstol = 1e-14);

    // apply overwrites, apply_add accumulates
    problem.op.apply(&u, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [0.25, 0.5, 0.25], abstol = 1e-14);
    problem.op.apply_add(&u, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [0.5, 1.0, 0.5], abstol = 1e-14);
}

#[test]
fn stiffness_annihilates_constants_and_differentiates_linears() {
    let ceed = Ceed::default_init();
    let (r, op) = poisson_1d(&ceed, 4);
    let v = r.create_lvector();

    let ones = ceed.vector_from_slice(&[1.0; 5]);
    op.apply(&ones, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [0.0; 5], abstol = 1e-13);

    let x = ceed.vector_from_slice(&[0.0, 0.25, 0.5, 0.75, 1.0]);
    op.apply(&x, &v).unwrap();
    assert_approx_slice_eq!(v.to_vec().unwrap(), [-1.0, 0.0, 0.0, 0.0, 1.0], abstol = 1e-13);
}

#[test]
fn bilinear_stiffness_on_unit_square() {
    let ceed = Ceed::default_init();
    let problem = PoissonProblem2d::new(&ceed, 1, 1).unwrap();
    let u = ceed.vector_from_slice(&[1.0, 0.0, 0.0, 0.0]);
    let v = ceed.vector(4);
    problem.op.apply(&u, &v).unwrap();
    assert_approx_slice_eq!(
        v.to_vec().unwrap(),
        [2.0 / 3.0, -1.0 / 6.0, -1.0 / 6.0, -1.0 / 3.0],
        abstol = 1e-14
    );

    let diagonal = ceed.vector(4);
    problem.op.linear_assemble_diagonal(&diagonal).unwrap();
    assert_approx_slice_eq!(diagonal.to_vec().unwrap(), [2.0 / 3.0; 4], abstol = 1e-14);
}

#[test]
fn assembled_diagonal_matches_unit_vector_probes() {
    let ceed = Ceed::default_init();
    let problem = PoissonProblem2d::new(&ceed, 3, 2).unwrap();
    let n = problem.restriction.lvector_size();
    let diagonal = ceed.vector(n);
    problem.op.linear_assemble_diagonal(&diagonal).unwrap();
    let diagonal = diagonal.to_vec().unwrap();

    let e = ceed.vector(n);
    let column = ceed.vector(n);
    for i in 0..n {
        e.set_value(0.0).unwrap();
        e.view_mut().unwrap()[i] = 1.0;
        problem.op.apply(&e, &column).unwrap();
        let a_ii = column.view().unwrap()[i];
        assert!((a_ii - diagonal[i]).abs() < 1e-13, "entry {}: {} != {}", i, a_ii, diagonal[i]);
    }

    // Adding accumulates on top of the existing values
    let twice = ceed.vector_from_slice(&diagonal);
    problem.op.linear_assemble_add_diagonal(&twice).unwrap();
    let expected: Vec<f64> = diagonal.iter().map(|d| 2.0 * d).collect();
    assert_approx_slice_eq!(twice.to_vec().unwrap(), expected, abstol = 1e-13);
}

#[test]
fn sizes_are_inferred_from_fields() {
    let ceed = Ceed::default_init();
    let problem = MassProblem1d::new(&ceed, 5, 3, 4).unwrap();
    assert_eq!(problem.op.num_elements(), 5);
    assert_eq!(problem.op.num_quadrature_points(), 4);
    assert_eq!(problem.op.get_name(), Some("mass"));
    assert_eq!(problem.op.active_input_size(), Some(11));
    assert_eq!(problem.op.active_output_size(), Some(11));

    let names: Vec<_> = problem.op.inputs().map(|field| field.name()).collect();
    assert_eq!(names, vec!["u", "qdata"]);
    let qdata = problem.op.inputs().nth(1).unwrap();
    assert!(!qdata.is_active());
    assert!(qdata.basis().is_none());
    assert!(qdata.vector().is_some());
    assert!(problem.op.jacobian_q_function().is_none());

    let text = problem.op.to_string();
    assert!(text.starts_with("CeedOperator - mass"));
    assert!(text.contains("5 elements with 4 quadrature points each"));
    assert!(text.contains("Name: \"qdata\""));
    assert!(text.contains("Passive vector"));
}

#[test]
fn unknown_and_repeated_fields_are_rejected() {
    let ceed = Ceed::default_init();
    let qf = ceed.q_function_interior_by_name("MassApply").unwrap();
    let r = ceed.elem_restriction(1, 2, 1, 1, 2, &[0, 1]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let op = ceed
        .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap();

    let result = op.clone().field("w", &r, &b, VectorOpt::Active);
    // The clone above still shares the operator
    assert!(matches!(result, Err(Error::State(_))));

    assert!(matches!(
        ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
            .unwrap()
            .field("w", &r, &b, VectorOpt::Active),
        Err(Error::UnboundField(_))
    ));
    assert!(matches!(
        op.field("u", &r, &b, VectorOpt::Active)
            .unwrap()
            .field("u", &r, &b, VectorOpt::Active),
        Err(Error::State(_))
    ));
}

fn shape_error<T>(result: Result<T>) -> bool {
    matches!(result, Err(Error::Shape(_)))
}

#[test]
fn inconsistent_bindings_are_rejected() {
    let ceed = Ceed::default_init();
    let qf = ceed.q_function_interior_by_name("MassApply").unwrap();
    let new_op = || {
        ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
            .unwrap()
    };
    let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2]).unwrap();
    let r_one_elem = ceed.elem_restriction(1, 2, 1, 1, 2, &[0, 1]).unwrap();
    let r_two_comp = ceed.elem_restriction(2, 2, 2, 3, 6, &[0, 1, 1, 2]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let b_three_nodes = ceed
        .basis_tensor_H1_Lagrange(1, 1, 3, 2, QuadMode::Gauss)
        .unwrap();
    let r_q = ceed
        .strided_elem_restriction(2, 2, 1, 4, Strides::Backend)
        .unwrap();
    let r_q_three = ceed
        .strided_elem_restriction(2, 3, 1, 6, Strides::Backend)
        .unwrap();
    let short = ceed.vector(3);

    // Restriction and basis disagree on nodes or components
    assert!(shape_error(new_op().field("u", &r, &b_three_nodes, VectorOpt::Active)));
    assert!(shape_error(new_op().field("u", &r_two_comp, &b, VectorOpt::Active)));
    // A field that is not a weight needs a restriction and a vector
    assert!(shape_error(new_op().field("u", ElemRestrictionOpt::None, &b, VectorOpt::Active)));
    assert!(shape_error(new_op().field("u", &r, &b, VectorOpt::None)));
    // Interpolated fields need a basis, pass-through fields must not have one
    assert!(shape_error(new_op().field("u", &r, BasisOpt::None, VectorOpt::Active)));
    assert!(shape_error(new_op().field("qdata", &r_q, &b, VectorOpt::Active)));
    // Pass-through fields need one restriction entry per quadrature point
    assert!(shape_error(
        new_op()
            .field("u", &r, &b, VectorOpt::Active)
            .unwrap()
            .field("qdata", &r_q_three, BasisOpt::None, VectorOpt::Active)
    ));
    // Passive vectors must match their restriction
    assert!(shape_error(new_op().field("qdata", &r_q, BasisOpt::None, &short)));
    // All fields act on the same elements
    assert!(shape_error(
        new_op()
            .field("u", &r, &b, VectorOpt::Active)
            .unwrap()
            .field("v", &r_one_elem, &b, VectorOpt::Active)
    ));
}

#[test]
fn weight_fields_need_a_basis_and_nothing_else() {
    let ceed = Ceed::default_init();
    let qf = ceed.q_function_interior_by_name("Mass1DBuild").unwrap();
    let r = ceed.elem_restriction(1, 2, 1, 1, 2, &[0, 1]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let new_op = || {
        ceed.operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
            .unwrap()
    };
    let x = ceed.vector(2);
    assert!(matches!(
        new_op().field("weights", &r, &b, VectorOpt::None),
        Err(Error::Shape(_))
    ));
    assert!(matches!(
        new_op().field("weights", ElemRestrictionOpt::None, BasisOpt::None, VectorOpt::None),
        Err(Error::Shape(_))
    ));
    assert!(matches!(
        new_op().field("weights", ElemRestrictionOpt::None, &b, &x),
        Err(Error::Shape(_))
    ));
    assert!(new_op()
        .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)
        .is_ok());
}

#[test]
fn unbound_fields_are_reported() {
    let ceed = Ceed::default_init();
    let qf = ceed.q_function_interior_by_name("MassApply").unwrap();
    let r = ceed.elem_restriction(1, 2, 1, 1, 2, &[0, 1]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let op = ceed
        .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("u", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("v", &r, &b, VectorOpt::Active)
        .unwrap();

    let u = ceed.vector(2);
    let v = ceed.vector(2);
    assert_eq!(op.apply(&u, &v), Err(Error::UnboundField("qdata".to_string())));
    assert!(matches!(op.check(), Err(Error::UnboundField(_))));
}

#[test]
fn active_vectors_are_checked() {
    let ceed = Ceed::default_init();
    let problem = MassProblem1d::new(&ceed, 2, 2, 2).unwrap();
    let u = ceed.vector(3);
    let v = ceed.vector(3);
    let short = ceed.vector(2);

    assert!(matches!(problem.op.apply(&short, &v), Err(Error::Shape(_))));
    assert!(matches!(problem.op.apply(&u, &short), Err(Error::Shape(_))));
    assert!(matches!(problem.op.apply_opt(None, Some(&v)), Err(Error::Shape(_))));

    // The active output can not be written while it is viewed
    let _view = v.view().unwrap();
    assert!(matches!(problem.op.apply(&u, &v), Err(Error::State(_))));
}

#[test]
fn operators_without_active_input_are_applied_with_none() {
    let ceed = Ceed::default_init();
    // Integrates the constant one against the test functions
    let qf = ceed
        .q_function_interior(1, |_, q, [w, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
            v[..q].copy_from_slice(&w[..q]);
            0
        })
        .unwrap()
        .input("weights", 1, EvalMode::Weight)
        .unwrap()
        .output("v", 1, EvalMode::Interp)
        .unwrap();
    let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let op = ceed
        .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("weights", ElemRestrictionOpt::None, &b, VectorOpt::None)
        .unwrap()
        .field("v", &r, &b, VectorOpt::Active)
        .unwrap()
        .check()
        .unwrap();

    let v = ceed.vector(3);
    op.apply_opt(None, Some(&v)).unwrap();
    // Reference element measure 2, split between the nodes
    assert_approx_slice_eq!(v.to_vec().unwrap(), [1.0, 2.0, 1.0], abstol = 1e-14);
}

#[test]
fn qfunction_failure_aborts_apply() {
    let ceed = Ceed::default_init();
    let qf = ceed.q_function_interior_by_name("Scale").unwrap();
    let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2]).unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::Gauss)
        .unwrap();
    let op = ceed
        .operator(&qf, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("input", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("output", &r, &b, VectorOpt::Active)
        .unwrap();

    let u = ceed.vector_from_slice(&[1.0, 2.0, 3.0]);
    let v = ceed.vector(3);
    op.apply(&u, &v).unwrap();

    // Scale signals failure with status 1 when its context holds no scalar
    qf.set_context(QFunctionContext::new()).unwrap();
    assert_eq!(op.apply(&u, &v), Err(Error::UserCallback { code: 1 }));
}

#[test]
fn passive_outputs_are_written() {
    let ceed = Ceed::default_init();
    let r = ceed.elem_restriction(2, 2, 1, 1, 3, &[0, 1, 1, 2]).unwrap();
    let r_q = ceed
        .strided_elem_restriction(2, 2, 1, 4, Strides::Backend)
        .unwrap();
    let b = ceed
        .basis_tensor_H1_Lagrange(1, 1, 2, 2, QuadMode::GaussLobatto)
        .unwrap();
    let identity = ceed
        .q_function_interior(1, |_, q, [u, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
            v[..q].copy_from_slice(&u[..q]);
            0
        })
        .unwrap()
        .input("input", 1, EvalMode::Interp)
        .unwrap()
        .output("output", 1, EvalMode::None)
        .unwrap();

    // Values at the Gauss-Lobatto points, which coincide with the nodes
    let values = ceed.vector(4);
    let op = ceed
        .operator(&identity, QFunctionOpt::None, QFunctionOpt::None)
        .unwrap()
        .field("input", &r, &b, VectorOpt::Active)
        .unwrap()
        .field("output", &r_q, BasisOpt::None, &values)
        .unwrap();
    let u = ceed.vector_from_slice(&[1.0, 2.0, 3.0]);
    op.apply_opt(Some(&u), None).unwrap();
    assert_approx_slice_eq!(values.to_vec().unwrap(), [1.0, 2.0, 2.0, 3.0], abstol = 1e-14);
}
