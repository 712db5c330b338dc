//! Computes the length, area or volume of a mapped Cartesian mesh by applying the mass operator
//! to a constant function.
use clap::Parser;
use eyre::{eyre, WrapErr};
use matfree::prelude::*;
use matfree::quadrature::univariate::gauss_lobatto;
use std::f64::consts::PI;

#[derive(Debug, Parser)]
#[command(
    name = "volume",
    about = "Uses the mass operator to compute the length, area or volume of a mapped region"
)]
struct Opt {
    /// Backend resource
    #[arg(short, long, default_value = "/cpu/self")]
    ceed: String,
    /// Mesh dimension
    #[arg(short, long, default_value_t = 3)]
    dim: usize,
    /// Polynomial degree of the mesh coordinates
    #[arg(short, long, default_value_t = 4)]
    mesh_degree: usize,
    /// Polynomial degree of the solution
    #[arg(short = 'p', long, default_value_t = 4)]
    solution_degree: usize,
    /// Number of quadrature points in 1D
    #[arg(short = 'q', long, default_value_t = 6)]
    num_qpts: usize,
    /// Approximate number of unknowns
    #[arg(short = 's', long)]
    problem_size: Option<usize>,
    /// Check the computed volume and print nothing on success
    #[arg(short, long)]
    test: bool,
    /// Use QFunctions from the gallery instead of closures
    #[arg(short, long)]
    gallery: bool,
}

/// Number of elements in each direction, such that the mesh has about `problem_size` unknowns.
fn cartesian_mesh_size(dim: usize, degree: usize, problem_size: usize) -> [usize; 3] {
    let num_elem = (problem_size / degree.pow(dim as u32)).max(1);
    // Largest s with 2^s <= num_elem, distributed over the dimensions
    let s = num_elem.ilog2() as usize;
    let mut num_xyz = [1; 3];
    for (d, n) in num_xyz.iter_mut().take(dim).enumerate() {
        let extra = usize::from(d < s % dim);
        *n = 1 << (s / dim + extra);
    }
    num_xyz
}

/// Lexicographic Cartesian mesh with `degree + 1` nodes per element in each direction.
struct CartesianMesh {
    dim: usize,
    num_xyz: [usize; 3],
    p: usize,
}

impl CartesianMesh {
    fn num_elem(&self) -> usize {
        self.num_xyz.iter().take(self.dim).product()
    }

    fn nodes_per_dim(&self) -> [usize; 3] {
        let mut nodes = [1; 3];
        for d in 0..self.dim {
            nodes[d] = self.num_xyz[d] * (self.p - 1) + 1;
        }
        nodes
    }

    fn num_nodes(&self) -> usize {
        self.nodes_per_dim().iter().product()
    }

    fn offsets(&self) -> Vec<usize> {
        let nodes = self.nodes_per_dim();
        let elem_size = self.p.pow(self.dim as u32);
        let mut offsets = Vec::with_capacity(self.num_elem() * elem_size);
        for e in 0..self.num_elem() {
            let mut e_xyz = [0; 3];
            let mut rest = e;
            for d in 0..self.dim {
                e_xyz[d] = rest % self.num_xyz[d];
                rest /= self.num_xyz[d];
            }
            for local in 0..elem_size {
                let (mut global, mut stride, mut rest) = (0, 1, local);
                for d in 0..self.dim {
                    global += (e_xyz[d] * (self.p - 1) + rest % self.p) * stride;
                    stride *= nodes[d];
                    rest /= self.p;
                }
                offsets.push(global);
            }
        }
        offsets
    }

    fn restriction(&self, ceed: &Ceed, num_comp: usize) -> matfree::Result<ElemRestriction> {
        let num_nodes = self.num_nodes();
        ceed.elem_restriction(
            self.num_elem(),
            self.p.pow(self.dim as u32),
            num_comp,
            num_nodes,
            num_comp * num_nodes,
            &self.offsets(),
        )
    }

    /// Coordinates of the nodes in `[0, 1]^dim`, with Gauss-Lobatto spacing within elements.
    fn coordinates(&self) -> Vec<f64> {
        let (_, points) = gauss_lobatto(self.p);
        let nodes = self.nodes_per_dim();
        let num_nodes = self.num_nodes();
        let mut coords = vec![0.0; self.dim * num_nodes];
        for node in 0..num_nodes {
            let mut rest = node;
            for d in 0..self.dim {
                let i = rest % nodes[d];
                rest /= nodes[d];
                let (e, j) = (i / (self.p - 1), i % (self.p - 1));
                let local = (points[j][0] + 1.0) / 2.0;
                coords[d * num_nodes + node] = (e as f64 + local) / self.num_xyz[d] as f64;
            }
        }
        coords
    }
}

/// Maps the unit mesh to a curved region and returns the exact volume of the region.
fn transform_coordinates(dim: usize, coords: &mut [f64]) -> f64 {
    if dim == 1 {
        // Varies the density of the nodes while keeping the end points
        for x in coords.iter_mut() {
            *x = 0.5 + ((2.0 / 3.0) * PI * (*x - 0.5)).sin() / 3.0f64.sqrt();
        }
        return 1.0;
    }
    // (x, y) in [0, 1]^2 maps to the quarter annulus with radii 1 and 2
    let num_nodes = coords.len() / dim;
    for i in 0..num_nodes {
        let r = 1.0 + coords[i];
        let phi = PI / 2.0 * coords[num_nodes + i];
        coords[i] = r * phi.cos();
        coords[num_nodes + i] = r * phi.sin();
    }
    3.0 / 4.0 * PI
}

/// Determinant of the Jacobian at point `i` of `q`, with `dx_c / dX_d` at `dx[i + q (c + dim d)]`.
fn jacobian_determinant(dim: usize, dx: &[f64], i: usize, q: usize) -> f64 {
    let j = |c: usize, d: usize| dx[i + q * (c + dim * d)];
    match dim {
        1 => j(0, 0),
        2 => j(0, 0) * j(1, 1) - j(0, 1) * j(1, 0),
        _ => {
            j(0, 0) * (j(1, 1) * j(2, 2) - j(1, 2) * j(2, 1)) - j(0, 1) * (j(1, 0) * j(2, 2) - j(1, 2) * j(2, 0))
                + j(0, 2) * (j(1, 0) * j(2, 1) - j(1, 1) * j(2, 0))
        }
    }
}

fn mass_qfunctions(ceed: &Ceed, dim: usize, gallery: bool) -> matfree::Result<(QFunction, QFunction)> {
    if gallery {
        let build = ceed.q_function_interior_by_name(&format!("Mass{}DBuild", dim))?;
        let apply = ceed.q_function_interior_by_name("MassApply")?;
        return Ok((build, apply));
    }

    let build = ceed
        .q_function_interior(
            1,
            move |_, q, [dx, weights, ..]: QFunctionInputs, [qdata, ..]: QFunctionOutputs| {
                for i in 0..q {
                    qdata[i] = jacobian_determinant(dim, dx, i, q) * weights[i];
                }
                0
            },
        )?
        .input("dx", dim * dim, EvalMode::Grad)?
        .input("weights", 1, EvalMode::Weight)?
        .output("qdata", 1, EvalMode::None)?;
    let apply = ceed
        .q_function_interior(1, |_, q, [u, qdata, ..]: QFunctionInputs, [v, ..]: QFunctionOutputs| {
            for i in 0..q {
                v[i] = qdata[i] * u[i];
            }
            0
        })?
        .input("u", 1, EvalMode::Interp)?
        .input("qdata", 1, EvalMode::None)?
        .output("v", 1, EvalMode::Interp)?;
    Ok((build, apply))
}

fn main() -> eyre::Result<()> {
    let opt = Opt::parse();
    let Opt { dim, test, .. } = opt;
    if !(1..=3).contains(&dim) {
        return Err(eyre!("dimension must be 1, 2 or 3, got {}", dim));
    }
    if opt.mesh_degree < 1 || opt.solution_degree < 1 || opt.num_qpts < 1 {
        return Err(eyre!("degrees and number of quadrature points must be positive"));
    }
    let problem_size = opt
        .problem_size
        .unwrap_or(if test { 8 * 16 } else { 256 * 1024 });

    let ceed = Ceed::try_init(&opt.ceed).wrap_err_with(|| format!("failed to initialize {}", opt.ceed))?;
    let num_xyz = cartesian_mesh_size(dim, opt.solution_degree, problem_size);
    let mesh = CartesianMesh {
        dim,
        num_xyz,
        p: opt.mesh_degree + 1,
    };
    let solution = CartesianMesh {
        dim,
        num_xyz,
        p: opt.solution_degree + 1,
    };
    if !test {
        println!("Backend                     : {}", ceed.resource());
        println!("Mesh size                   : {:?}", &num_xyz[..dim]);
        println!("Number of mesh nodes        : {}", mesh.num_nodes());
        println!("Number of solution nodes    : {}", solution.num_nodes());
    }

    let num_elem = mesh.num_elem();
    let elem_qpts = opt.num_qpts.pow(dim as u32);
    let r_x = mesh.restriction(&ceed, dim)?;
    let r_u = solution.restriction(&ceed, 1)?;
    let r_q = ceed.strided_elem_restriction(num_elem, elem_qpts, 1, num_elem * elem_qpts, Strides::Backend)?;
    let b_x = ceed.basis_tensor_H1_Lagrange(dim, dim, mesh.p, opt.num_qpts, QuadMode::Gauss)?;
    let b_u = ceed.basis_tensor_H1_Lagrange(dim, 1, solution.p, opt.num_qpts, QuadMode::Gauss)?;

    let mut coords = mesh.coordinates();
    let exact_volume = transform_coordinates(dim, &mut coords);
    let x = ceed.vector_from_slice(&coords);

    let (qf_build, qf_apply) = mass_qfunctions(&ceed, dim, opt.gallery)?;
    let qdata = ceed.vector(num_elem * elem_qpts);
    ceed.operator(&qf_build, QFunctionOpt::None, QFunctionOpt::None)?
        .field("dx", &r_x, &b_x, VectorOpt::Active)?
        .field("weights", ElemRestrictionOpt::None, &b_x, VectorOpt::None)?
        .field("qdata", &r_q, BasisOpt::None, VectorOpt::Active)?
        .apply(&x, &qdata)
        .wrap_err("failed to compute quadrature data")?;

    let op_mass = ceed
        .operator(&qf_apply, QFunctionOpt::None, QFunctionOpt::None)?
        .name("mass")?
        .field("u", &r_u, &b_u, VectorOpt::Active)?
        .field("qdata", &r_q, BasisOpt::None, &qdata)?
        .field("v", &r_u, &b_u, VectorOpt::Active)?;

    let u = ceed.vector_from_slice(&vec![1.0; solution.num_nodes()]);
    let v = ceed.vector(solution.num_nodes());
    op_mass.apply(&u, &v).wrap_err("failed to apply the mass operator")?;
    let volume: f64 = v.view()?.iter().sum();
    let error = (volume - exact_volume).abs();

    if test {
        let tolerance = match dim {
            1 => 1e-14,
            2 => 1e-7,
            _ => 1e-5,
        };
        if error > tolerance {
            return Err(eyre!("volume error {} exceeds tolerance {}", error, tolerance));
        }
    } else {
        println!("Exact volume                : {}", exact_volume);
        println!("Computed volume             : {}", volume);
        println!("Volume error                : {}", error);
    }
    Ok(())
}
