//! Every backend must produce the results of the reference backend.
use crate::unit_tests::{MassProblem1d, PoissonProblem2d};
use matfree::prelude::*;
use util::{assert_approx_slice_eq, assert_panics};

fn reference() -> Ceed {
    Ceed::init("/cpu/self/ref/serial")
}

/// Small tasks and a dedicated pool, so that the parallel backend splits even small meshes.
fn small_tasks() -> CeedOptions {
    CeedOptions {
        num_threads: Some(3),
        min_elements_per_task: 1,
        ..CeedOptions::default()
    }
}

fn test_vector(n: usize) -> Vec<f64> {
    (0..n).map(|i| ((i * 17) % 23) as f64 / 23.0 - 0.5).collect()
}

fn mass_apply(ceed: &Ceed) -> Vec<f64> {
    let problem = MassProblem1d::new(ceed, 13, 4, 5).unwrap();
    let u = ceed.vector_from_slice(&test_vector(problem.num_nodes()));
    let v = ceed.vector(problem.num_nodes());
    problem.op.apply(&u, &v).unwrap();
    v.to_vec().unwrap()
}

fn mass_qdata(ceed: &Ceed) -> Vec<f64> {
    let problem = MassProblem1d::new(ceed, 7, 2, 3).unwrap();
    problem.qdata.to_vec().unwrap()
}

fn poisson_apply(ceed: &Ceed) -> Vec<f64> {
    let problem = PoissonProblem2d::new(ceed, 5, 4).unwrap();
    let n = problem.restriction.lvector_size();
    let u = ceed.vector_from_slice(&test_vector(n));
    let v = ceed.vector_from_slice(&vec![1.0; n]);
    problem.op.apply_add(&u, &v).unwrap();
    v.to_vec().unwrap()
}

fn poisson_diagonal(ceed: &Ceed) -> Vec<f64> {
    let problem = PoissonProblem2d::new(ceed, 4, 6).unwrap();
    let diagonal = ceed.vector(problem.restriction.lvector_size());
    problem.op.linear_assemble_diagonal(&diagonal).unwrap();
    diagonal.to_vec().unwrap()
}

fn averaged_restriction(ceed: &Ceed) -> Vec<f64> {
    let offsets = crate::unit_tests::grid_offsets(3, 3);
    let r = ceed.elem_restriction(9, 4, 1, 1, 16, &offsets).unwrap();
    let e = ceed.vector_from_slice(&test_vector(36));
    let l = r.create_lvector();
    r.apply_with_scatter_mode(TransposeMode::Transpose, ScatterMode::Average, &e, &l)
        .unwrap();
    l.to_vec().unwrap()
}

macro_rules! backend_tests {
    ($($name:ident => $resource:expr, $options:expr;)*) => {
        $(
            paste::paste! {
                #[test]
                fn [<$name _mass_apply>]() {
                    let ceed = Ceed::with_options($resource, $options).unwrap();
                    assert_approx_slice_eq!(mass_apply(&ceed), mass_apply(&reference()), abstol = 1e-14);
                }

                #[test]
                fn [<$name _mass_qdata>]() {
                    let ceed = Ceed::with_options($resource, $options).unwrap();
                    assert_approx_slice_eq!(mass_qdata(&ceed), mass_qdata(&reference()), abstol = 1e-14);
                }

                #[test]
                fn [<$name _poisson_apply>]() {
                    let ceed = Ceed::with_options($resource, $options).unwrap();
                    assert_approx_slice_eq!(poisson_apply(&ceed), poisson_apply(&reference()), abstol = 1e-13);
                }

                #[test]
                fn [<$name _poisson_diagonal>]() {
                    let ceed = Ceed::with_options($resource, $options).unwrap();
                    assert_approx_slice_eq!(poisson_diagonal(&ceed), poisson_diagonal(&reference()), abstol = 1e-13);
                }

                #[test]
                fn [<$name _averaged_restriction>]() {
                    let ceed = Ceed::with_options($resource, $options).unwrap();
                    assert_approx_slice_eq!(
                        averaged_restriction(&ceed),
                        averaged_restriction(&reference()),
                        abstol = 1e-14
                    );
                }
            }
        )*
    };
}

backend_tests! {
    serial => "/cpu/self/ref/serial", CeedOptions::default();
    parallel => "/cpu/self/par", CeedOptions::default();
    parallel_small_tasks => "/cpu/self/par", small_tasks();
    device => "/gpu/emulated", CeedOptions::default();
}

#[test]
fn unknown_resources_panic_on_init() {
    assert_panics!(Ceed::init("/fpga/xilinx"));
    assert!(Ceed::try_init("/fpga/xilinx").is_err());
}

#[test]
fn options_are_deserialized_with_defaults() {
    let options: CeedOptions = serde_json::from_str(r#"{ "min_elements_per_task": 4 }"#).unwrap();
    assert_eq!(
        options,
        CeedOptions {
            min_elements_per_task: 4,
            ..CeedOptions::default()
        }
    );

    let options: CeedOptions = serde_json::from_str(r#"{ "num_threads": 2, "check_finite": true }"#).unwrap();
    assert_eq!(options.num_threads, Some(2));
    assert!(options.check_finite);
    assert_eq!(options.min_elements_per_task, CeedOptions::default().min_elements_per_task);
}

#[test]
fn device_backend_keeps_results_on_device() {
    let ceed = Ceed::init("/gpu/emulated");
    let problem = MassProblem1d::new(&ceed, 2, 2, 2).unwrap();
    let u = ceed.vector_from_slice(&[1.0; 3]);
    let v = ceed.vector(3);
    problem.op.apply(&u, &v).unwrap();
    {
        let device = v.view_in(MemType::Device).unwrap();
        assert_approx_slice_eq!(device, [0.25, 0.5, 0.25], abstol = 1e-14);
    }
    assert_approx_slice_eq!(v.to_vec().unwrap(), [0.25, 0.5, 0.25], abstol = 1e-14);
}
